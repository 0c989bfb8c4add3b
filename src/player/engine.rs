use crate::core::{
    AudioParams, EngineConfig, FrameData, MediaInfo, PlayerError, Result, TimeBase,
    UNKNOWN_DURATION,
};
use crate::player::decoder::{AudioDecoder, Received, VideoDecoder};
use crate::player::demuxer::Demuxer;
use ffmpeg_next as ffmpeg;
use log::{debug, error, info, warn};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// 协作式取消标志
///
/// 唯一跨线程共享的引擎状态。置位后保持有效，直到下一次 `open` 复位。
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    fn reset(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// 一次 open 对应的会话：容器 + 解码器 + 像素转换 + 重采样
struct Session {
    demuxer: Demuxer,
    video: VideoDecoder,
    audio: Option<AudioDecoder>,
    time_base: TimeBase,
    frame_rate: f64,
    duration_us: i64,
    /// 容器已读完，视频解码器已收到 EOF
    input_exhausted: bool,
    last_pts: Option<i64>,
}

impl Session {
    fn open(path: &Path, config: &EngineConfig) -> Result<Self> {
        let demuxer = Demuxer::open(path)?;

        let video_stream = demuxer.video_stream().ok_or(PlayerError::NoVideoStream)?;
        let video = VideoDecoder::from_stream(video_stream)?;

        // 音频失败只降级为纯视频
        let audio = match demuxer.audio_stream() {
            Some(stream) => match AudioDecoder::from_stream(stream, config.audio_output) {
                Ok(decoder) => Some(decoder),
                Err(e) => {
                    warn!("⚠️  音频初始化失败，仅播放视频: {}", e);
                    None
                }
            },
            None => {
                debug!("没有音频流，仅播放视频");
                None
            }
        };

        Ok(Self {
            time_base: demuxer.time_base(),
            frame_rate: demuxer.frame_rate(),
            duration_us: demuxer.duration_us(),
            demuxer,
            video,
            audio,
            input_exhausted: false,
            last_pts: None,
        })
    }

    /// 读包直到解出下一帧视频，途中解出的音频追加到 `audio`
    ///
    /// 每次读包前检查一次取消标志。
    fn next_video_frame(
        &mut self,
        cancel: &CancelToken,
        packets_read: &mut u64,
        audio: &mut Vec<u8>,
    ) -> Result<Option<ffmpeg::util::frame::Video>> {
        let video_index = self.demuxer.video_stream_index();
        let audio_index = self.demuxer.audio_stream_index();

        loop {
            if cancel.is_cancelled() {
                debug!("解码已取消");
                return Ok(None);
            }

            // 先取解码器里已缓冲的帧
            match self.video.receive_frame()? {
                Received::Frame(frame) => return Ok(Some(frame)),
                Received::Drained => return Ok(None),
                Received::NeedInput if self.input_exhausted => return Ok(None),
                Received::NeedInput => {}
            }

            let packet = match self.demuxer.read_packet() {
                Ok(Some(packet)) => packet,
                Ok(None) => {
                    debug!("到达文件末尾，排空视频解码器");
                    self.video.send_eof()?;
                    self.input_exhausted = true;
                    continue;
                }
                Err(e) => {
                    warn!("读取数据包失败，按文件末尾处理: {}", e);
                    self.video.send_eof()?;
                    self.input_exhausted = true;
                    continue;
                }
            };
            *packets_read += 1;

            let index = packet.stream();
            if index == video_index {
                if let Err(e) = self.video.send_packet(&packet) {
                    warn!("跳过无法解码的视频包: {}", e);
                }
            } else if Some(index) == audio_index {
                if let Some(decoder) = self.audio.as_mut() {
                    if let Err(e) = decoder.decode_into(&packet, audio) {
                        warn!("跳过无法解码的音频包: {}", e);
                    }
                }
            }
        }
    }

    fn build_frame(
        &mut self,
        frame: &ffmpeg::util::frame::Video,
        audio: Vec<u8>,
    ) -> Result<FrameData> {
        // 没有时间戳的帧沿用上一帧的位置
        let pts = VideoDecoder::frame_pts(frame)
            .or(self.last_pts)
            .unwrap_or(0);
        let image = self.video.to_rgb_image(frame)?;
        self.last_pts = Some(pts);
        Ok(FrameData { image, audio, pts })
    }

    fn decode_next(
        &mut self,
        cancel: &CancelToken,
        packets_read: &mut u64,
    ) -> Result<Option<FrameData>> {
        let mut audio = Vec::new();
        match self.next_video_frame(cancel, packets_read, &mut audio)? {
            Some(frame) => self.build_frame(&frame, audio).map(Some),
            None => Ok(None),
        }
    }

    fn seek_and_decode(
        &mut self,
        target_us: i64,
        cancel: &CancelToken,
        packets_read: &mut u64,
    ) -> Result<Option<FrameData>> {
        self.demuxer.seek(target_us)?;
        self.video.flush();
        if let Some(decoder) = self.audio.as_mut() {
            decoder.flush();
        }
        self.input_exhausted = false;

        let mut audio = Vec::new();
        let mut discarded = 0usize;
        loop {
            let Some(frame) = self.next_video_frame(cancel, packets_read, &mut audio)? else {
                debug!("Seek 到 {}us 未找到目标帧（丢弃 {} 帧）", target_us, discarded);
                return Ok(None);
            };

            let pts = VideoDecoder::frame_pts(&frame);
            // 时间基未知时不过滤
            let before_target = pts
                .and_then(|p| self.time_base.pts_to_us(p))
                .map(|us| us < target_us)
                .unwrap_or(false);

            if before_target {
                discarded += 1;
                // 预滚帧期间的音频属于目标之前
                audio.clear();
                continue;
            }

            debug!("Seek 到 {}us 完成，丢弃 {} 帧预滚", target_us, discarded);
            return self.build_frame(&frame, audio).map(Some);
        }
    }
}

/// 解封装/解码引擎
///
/// 只能由一个线程使用；跨线程只共享 [`CancelToken`]。所有失败在边界处
/// 折叠为 `bool` / `Option`，原因写日志。
///
/// 取消延迟：标志在每次读包前检查，最坏情况再多读一个包并解码（含重采样）一次。
pub struct DecodeEngine {
    config: EngineConfig,
    session: Option<Session>,
    cancel: CancelToken,
    packets_read: u64,
}

impl DecodeEngine {
    pub fn new(config: EngineConfig) -> Self {
        Self::with_cancel_token(config, CancelToken::new())
    }

    /// 使用外部持有的取消标志创建引擎
    pub fn with_cancel_token(config: EngineConfig, cancel: CancelToken) -> Self {
        if let Err(e) = ffmpeg::init() {
            error!("FFmpeg 初始化失败: {}", e);
        }
        ffmpeg::util::log::set_level(ffmpeg::util::log::Level::Error);

        Self {
            config,
            session: None,
            cancel,
            packets_read: 0,
        }
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn is_open(&self) -> bool {
        self.session.is_some()
    }

    /// 打开文件；先释放旧会话，并复位取消标志
    pub fn open(&mut self, path: impl AsRef<Path>) -> bool {
        let path = path.as_ref();
        self.close();
        self.cancel.reset();
        self.packets_read = 0;

        match Session::open(path, &self.config) {
            Ok(session) => {
                info!(
                    "✅ 打开成功: {} ({:.3} fps, 时长 {}us, 音频: {})",
                    session.demuxer.description(),
                    session.frame_rate,
                    session.duration_us,
                    session.audio.is_some()
                );
                self.session = Some(session);
                true
            }
            Err(e) => {
                error!("❌ 打开失败 {}: {}", path.display(), e);
                false
            }
        }
    }

    /// 释放当前会话
    pub fn close(&mut self) {
        if self.session.take().is_some() {
            debug!("已关闭当前会话");
        }
    }

    /// 解码下一帧视频（附带途中解出的音频）
    ///
    /// 文件结束、取消或未打开时返回 None。
    pub fn decode_next_frame(&mut self) -> Option<FrameData> {
        let session = self.session.as_mut()?;
        match session.decode_next(&self.cancel, &mut self.packets_read) {
            Ok(frame) => frame,
            Err(e) => {
                error!("解码失败: {}", e);
                None
            }
        }
    }

    /// 向后 Seek 到关键帧，再向前解码到第一帧 `pts >= target_us`
    pub fn seek_and_decode(&mut self, target_us: i64) -> Option<FrameData> {
        let session = self.session.as_mut()?;
        match session.seek_and_decode(target_us, &self.cancel, &mut self.packets_read) {
            Ok(frame) => frame,
            Err(e) => {
                error!("Seek 到 {}us 失败: {}", target_us, e);
                None
            }
        }
    }

    /// 容器时长（微秒），未知或未打开时为 `UNKNOWN_DURATION`
    pub fn duration_us(&self) -> i64 {
        self.session
            .as_ref()
            .map(|s| s.duration_us)
            .unwrap_or(UNKNOWN_DURATION)
    }

    pub fn time_base(&self) -> TimeBase {
        self.session
            .as_ref()
            .map(|s| s.time_base)
            .unwrap_or(TimeBase::UNKNOWN)
    }

    /// 平均帧率，不可用时为 0
    ///
    /// 0 表示没有固定节奏：单帧步进中的“上一帧”不可用，播放线程改用
    /// `WorkerConfig::fallback_frame_interval`（默认 40ms）作为节拍。
    pub fn frame_rate(&self) -> f64 {
        self.session.as_ref().map(|s| s.frame_rate).unwrap_or(0.0)
    }

    /// 输出音频参数；纯视频或未打开时 `valid == false`
    pub fn audio_params(&self) -> AudioParams {
        match self.session.as_ref().and_then(|s| s.audio.as_ref()) {
            Some(decoder) => decoder.output_format().params(),
            None => AudioParams::none(),
        }
    }

    /// 自上次 open 以来读取的数据包数
    pub fn packets_read(&self) -> u64 {
        self.packets_read
    }

    pub fn media_info(&self) -> Option<MediaInfo> {
        let session = self.session.as_ref()?;
        Some(MediaInfo {
            duration_us: session.duration_us,
            width: session.video.width(),
            height: session.video.height(),
            frame_rate: session.frame_rate,
            video_codec: session.demuxer.video_codec_name(),
            audio_codec: session.demuxer.audio_codec_name(),
            source_sample_rate: session.audio.as_ref().map(|a| a.source_rate()).unwrap_or(0),
            source_channels: session
                .audio
                .as_ref()
                .map(|a| a.source_channels())
                .unwrap_or(0),
        })
    }
}
