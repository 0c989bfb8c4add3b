use crate::core::{PlayerError, Result, TimeBase, UNKNOWN_DURATION};
use ffmpeg_next as ffmpeg;
use ffmpeg_next::{format, media};
use log::{debug, info, warn};
use std::path::Path;

/// 解封装器 - 负责读取容器并分离音视频流
///
/// 视频流必须存在；音频流可选，查找时以视频流为关联流。
pub struct Demuxer {
    input_ctx: format::context::Input,
    video_stream_index: usize,
    audio_stream_index: Option<usize>,
    source_path: String,
}

impl Demuxer {
    /// 打开容器并探测流信息
    pub fn open(path: &Path) -> Result<Self> {
        info!("正在打开文件: {}", path.display());

        // format::input 内部完成 avformat_open_input + avformat_find_stream_info
        let input_ctx = format::input(&path)
            .map_err(|e| PlayerError::OpenError(format!("{}: {}", path.display(), e)))?;

        let video_stream_index = input_ctx
            .streams()
            .best(media::Type::Video)
            .map(|s| s.index())
            .ok_or(PlayerError::NoVideoStream)?;

        let audio_stream_index = Self::find_related_audio(&input_ctx, video_stream_index);

        debug!("视频流索引: {}", video_stream_index);
        debug!("音频流索引: {:?}", audio_stream_index);

        Ok(Self {
            input_ctx,
            video_stream_index,
            audio_stream_index,
            source_path: path.display().to_string(),
        })
    }

    /// 以视频流为关联流查找最佳音频流（与视频流同一节目优先）
    fn find_related_audio(input_ctx: &format::context::Input, video_index: usize) -> Option<usize> {
        let index = unsafe {
            ffmpeg::ffi::av_find_best_stream(
                input_ctx.as_ptr() as *mut ffmpeg::ffi::AVFormatContext,
                ffmpeg::ffi::AVMediaType::AVMEDIA_TYPE_AUDIO,
                -1,
                video_index as i32,
                std::ptr::null_mut(),
                0,
            )
        };
        if index < 0 || index as usize == video_index {
            None
        } else {
            Some(index as usize)
        }
    }

    /// 获取视频流索引
    pub fn video_stream_index(&self) -> usize {
        self.video_stream_index
    }

    /// 获取音频流索引
    pub fn audio_stream_index(&self) -> Option<usize> {
        self.audio_stream_index
    }

    /// 获取视频流
    pub fn video_stream(&self) -> Option<format::stream::Stream> {
        self.input_ctx.stream(self.video_stream_index)
    }

    /// 获取音频流
    pub fn audio_stream(&self) -> Option<format::stream::Stream> {
        self.audio_stream_index
            .and_then(|idx| self.input_ctx.stream(idx))
    }

    /// 视频流时间基
    pub fn time_base(&self) -> TimeBase {
        self.video_stream()
            .map(|s| TimeBase::from(s.time_base()))
            .unwrap_or(TimeBase::UNKNOWN)
    }

    /// 视频流平均帧率，不可用时为 0
    pub fn frame_rate(&self) -> f64 {
        self.video_stream()
            .map(|s| {
                let fps = s.avg_frame_rate();
                if fps.denominator() == 0 || fps.numerator() <= 0 {
                    0.0
                } else {
                    fps.numerator() as f64 / fps.denominator() as f64
                }
            })
            .unwrap_or(0.0)
    }

    /// 容器时长（微秒），未知时为 `UNKNOWN_DURATION`
    pub fn duration_us(&self) -> i64 {
        let duration = self.input_ctx.duration();
        if duration > 0 {
            duration
        } else {
            UNKNOWN_DURATION
        }
    }

    /// 视频编解码器名称
    pub fn video_codec_name(&self) -> String {
        self.video_stream()
            .map(|s| s.parameters().id().name().to_string())
            .unwrap_or_default()
    }

    /// 音频编解码器名称，没有音频时为 "none"
    pub fn audio_codec_name(&self) -> String {
        self.audio_stream()
            .map(|s| s.parameters().id().name().to_string())
            .unwrap_or_else(|| "none".to_string())
    }

    /// 按容器顺序读取下一个数据包（包括不关心的流）
    ///
    /// - Ok(Some(packet)): 成功读取
    /// - Ok(None): 到达文件末尾
    /// - Err(e): 读取错误
    pub fn read_packet(&mut self) -> Result<Option<ffmpeg::Packet>> {
        let mut packet = ffmpeg::Packet::empty();
        match packet.read(&mut self.input_ctx) {
            Ok(()) => Ok(Some(packet)),
            Err(ffmpeg::Error::Eof) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// 向后 Seek 到目标时间（微秒）之前最近的关键帧
    ///
    /// 向后 seek 失败时（例如目标早于第一个关键帧）退回到任意方向的最近位置，
    /// 调用方按 PTS 过滤预滚帧。
    pub fn seek(&mut self, timestamp_us: i64) -> Result<()> {
        let target = timestamp_us.max(0);
        // RangeTo 的上界即 max_ts，落在目标之前（含）的关键帧
        match self.input_ctx.seek(target, ..target) {
            Ok(()) => Ok(()),
            Err(e) => {
                warn!(
                    "向后 Seek 到 {}us 失败: {}，改为就近 Seek",
                    target, e
                );
                self.input_ctx.seek(target, ..)?;
                Ok(())
            }
        }
    }

    /// 获取源路径描述
    pub fn description(&self) -> String {
        format!("FFmpeg Demuxer: {}", self.source_path)
    }
}
