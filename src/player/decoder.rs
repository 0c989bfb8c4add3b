use crate::core::{AudioOutputFormat, PlayerError, Result};
use ffmpeg_next as ffmpeg;
use ffmpeg_next::{codec, format, software, util};
use image::RgbImage;
use log::{debug, warn};

/// 解码器收包结果
pub enum Received<F> {
    /// 解出一帧
    Frame(F),
    /// 需要更多数据包（EAGAIN）
    NeedInput,
    /// 解码器已完全排空
    Drained,
}

fn is_eagain(e: &ffmpeg::Error) -> bool {
    matches!(e, ffmpeg::Error::Other { errno } if *errno == ffmpeg::error::EAGAIN)
}

/// 视频解码器（软件解码，输出 RGB24）
pub struct VideoDecoder {
    decoder: codec::decoder::Video,
    scaler: Option<software::scaling::Context>,
    scaler_key: Option<(util::format::Pixel, u32, u32)>,
}

impl VideoDecoder {
    /// 从视频流创建解码器（查找解码器 + 分配上下文 + 打开）
    pub fn from_stream(stream: format::stream::Stream) -> Result<Self> {
        let context = codec::context::Context::from_parameters(stream.parameters())?;
        let decoder = context.decoder().video()?;

        debug!(
            "视频解码器: {}x{}, 格式: {:?}",
            decoder.width(),
            decoder.height(),
            decoder.format()
        );

        Ok(Self {
            decoder,
            scaler: None,
            scaler_key: None,
        })
    }

    pub fn width(&self) -> u32 {
        self.decoder.width()
    }

    pub fn height(&self) -> u32 {
        self.decoder.height()
    }

    /// 送入数据包；解码器拒绝的坏包只记录日志
    pub fn send_packet(&mut self, packet: &ffmpeg::Packet) -> Result<()> {
        match self.decoder.send_packet(packet) {
            Ok(()) => Ok(()),
            Err(e) if is_eagain(&e) => Ok(()),
            Err(ffmpeg::Error::Eof) => {
                debug!("视频解码器已收到 EOF，忽略本次包");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// 取出一帧已解码画面
    pub fn receive_frame(&mut self) -> Result<Received<util::frame::Video>> {
        let mut decoded = util::frame::Video::empty();
        match self.decoder.receive_frame(&mut decoded) {
            Ok(()) => Ok(Received::Frame(decoded)),
            Err(e) if is_eagain(&e) => Ok(Received::NeedInput),
            Err(ffmpeg::Error::Eof) => Ok(Received::Drained),
            Err(e) => Err(e.into()),
        }
    }

    /// 通知解码器输入结束，之后可以取出缓冲中的延迟帧
    pub fn send_eof(&mut self) -> Result<()> {
        match self.decoder.send_eof() {
            Ok(()) | Err(ffmpeg::Error::Eof) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// 清空内部缓冲（Seek 后调用），同时复位 EOF 状态
    pub fn flush(&mut self) {
        self.decoder.flush();
    }

    /// 画面的显示时间戳：优先 best-effort 时间戳，其次原始 PTS
    pub fn frame_pts(frame: &util::frame::Video) -> Option<i64> {
        frame.timestamp().or_else(|| frame.pts())
    }

    /// 转换为 RGB24 图像（按源格式/尺寸缓存 scaler）
    pub fn to_rgb_image(&mut self, frame: &util::frame::Video) -> Result<RgbImage> {
        let width = frame.width();
        let height = frame.height();
        let key = (frame.format(), width, height);

        if self.scaler_key != Some(key) {
            debug!("初始化 scaler: {:?} {}x{} → RGB24", key.0, width, height);
            self.scaler = Some(software::scaling::Context::get(
                frame.format(),
                width,
                height,
                util::format::Pixel::RGB24,
                width,
                height,
                software::scaling::Flags::BILINEAR,
            )?);
            self.scaler_key = Some(key);
        }

        let scaler = self
            .scaler
            .as_mut()
            .ok_or_else(|| PlayerError::DecodeError("scaler 未初始化".to_string()))?;

        let mut rgb_frame = util::frame::Video::empty();
        scaler.run(frame, &mut rgb_frame)?;

        // 去掉行尾填充，复制到连续内存
        let row_size = width as usize * 3;
        let stride = rgb_frame.stride(0);
        let data = rgb_frame.data(0);
        let mut pixels = Vec::with_capacity(row_size * height as usize);
        for y in 0..height as usize {
            let start = y * stride;
            let row = data
                .get(start..start + row_size)
                .ok_or_else(|| PlayerError::DecodeError(format!("RGB 行 {} 越界", y)))?;
            pixels.extend_from_slice(row);
        }

        RgbImage::from_raw(width, height, pixels)
            .ok_or_else(|| PlayerError::DecodeError("RGB 缓冲区大小不匹配".to_string()))
    }
}

/// 音频解码器 - 解码并重采样到固定输出格式（S16 交错）
pub struct AudioDecoder {
    decoder: codec::decoder::Audio,
    resampler: software::resampling::Context,
    source_key: (util::format::Sample, util::channel_layout::ChannelLayout, u32),
    output: AudioOutputFormat,
}

impl AudioDecoder {
    /// 从音频流创建解码器和重采样器
    ///
    /// 输入布局/采样率/格式取自解码器，输出固定为 `output`。
    pub fn from_stream(stream: format::stream::Stream, output: AudioOutputFormat) -> Result<Self> {
        let context = codec::context::Context::from_parameters(stream.parameters())?;
        let decoder = context.decoder().audio()?;

        let source_key = (
            decoder.format(),
            Self::layout_or_default(decoder.channel_layout(), decoder.channels()),
            decoder.rate(),
        );
        if source_key.2 == 0 {
            return Err(PlayerError::AudioError("音频采样率未知".to_string()));
        }

        debug!(
            "音频解码器: {} Hz, {} 声道, 格式: {:?} → {} Hz, {} 声道, S16",
            decoder.rate(),
            decoder.channels(),
            decoder.format(),
            output.sample_rate,
            output.channels
        );

        let resampler = Self::build_resampler(source_key, output)?;

        Ok(Self {
            decoder,
            resampler,
            source_key,
            output,
        })
    }

    pub fn output_format(&self) -> AudioOutputFormat {
        self.output
    }

    pub fn source_rate(&self) -> u32 {
        self.source_key.2
    }

    pub fn source_channels(&self) -> u16 {
        self.source_key.1.channels() as u16
    }

    fn layout_or_default(
        layout: util::channel_layout::ChannelLayout,
        channels: u16,
    ) -> util::channel_layout::ChannelLayout {
        if layout.is_empty() {
            util::channel_layout::ChannelLayout::default(channels.max(1) as i32)
        } else {
            layout
        }
    }

    fn build_resampler(
        source: (util::format::Sample, util::channel_layout::ChannelLayout, u32),
        output: AudioOutputFormat,
    ) -> Result<software::resampling::Context> {
        let resampler = software::resampling::Context::get(
            source.0,
            source.1,
            source.2,
            util::format::Sample::I16(util::format::sample::Type::Packed),
            util::channel_layout::ChannelLayout::default(output.channels as i32),
            output.sample_rate,
        )?;
        Ok(resampler)
    }

    /// 解码一个数据包，重采样后的 PCM 追加到 `out`
    ///
    /// 坏包只记录日志，不影响已经追加的数据。
    pub fn decode_into(&mut self, packet: &ffmpeg::Packet, out: &mut Vec<u8>) -> Result<()> {
        match self.decoder.send_packet(packet) {
            Ok(()) => {}
            Err(e) if is_eagain(&e) => {}
            Err(ffmpeg::Error::Eof) => return Ok(()),
            Err(e) => return Err(e.into()),
        }

        loop {
            let mut decoded = util::frame::Audio::empty();
            match self.decoder.receive_frame(&mut decoded) {
                Ok(()) => self.resample_into(&mut decoded, out)?,
                Err(e) if is_eagain(&e) => break,
                Err(ffmpeg::Error::Eof) => break,
                Err(e) => return Err(e.into()),
            }
        }

        Ok(())
    }

    /// 清空解码器缓冲（Seek 后调用）
    pub fn flush(&mut self) {
        self.decoder.flush();
    }

    fn resample_into(&mut self, frame: &mut util::frame::Audio, out: &mut Vec<u8>) -> Result<()> {
        if frame.samples() == 0 {
            return Ok(());
        }

        // 容器没有声道掩码（如 Matroska PCM）时帧上的布局为空，
        // swr 会把它当成输入变化而拒绝转换，这里补成与重采样器一致的默认布局
        let layout = Self::layout_or_default(frame.channel_layout(), frame.channels());
        if frame.channel_layout().is_empty() {
            frame.set_channel_layout(layout);
        }

        // 流中途格式变化时重建重采样器
        let key = (frame.format(), layout, frame.rate());
        if key != self.source_key && key.2 > 0 {
            warn!(
                "音频输入格式变化: {:?}/{}Hz → {:?}/{}Hz，重建重采样器",
                self.source_key.0, self.source_key.2, key.0, key.2
            );
            self.resampler = Self::build_resampler(key, self.output)?;
            self.source_key = key;
        }

        // 输出容量 = (重采样器积压 + 本帧样本) 按采样率换算，向上取整
        let pending = self
            .resampler
            .delay()
            .map(|d| d.input.max(0) as u64)
            .unwrap_or(0);
        let source_rate = self.source_key.2.max(1) as u64;
        let capacity = ((pending + frame.samples() as u64) * self.output.sample_rate as u64)
            .div_ceil(source_rate) as usize
            + 32;

        let mut resampled = util::frame::Audio::new(
            util::format::Sample::I16(util::format::sample::Type::Packed),
            capacity,
            util::channel_layout::ChannelLayout::default(self.output.channels as i32),
        );
        resampled.set_rate(self.output.sample_rate);
        self.resampler.run(frame, &mut resampled)?;

        let bytes = resampled.samples() * self.output.bytes_per_sample_frame();
        let data = resampled
            .data(0)
            .get(..bytes)
            .ok_or_else(|| PlayerError::AudioError("重采样输出越界".to_string()))?;
        out.extend_from_slice(data);

        Ok(())
    }
}
