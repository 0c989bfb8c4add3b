use image::RgbImage;
use serde::{Deserialize, Serialize};

/// 时长未知时的哨兵值（微秒）
pub const UNKNOWN_DURATION: i64 = 0;

const MICROS_PER_SECOND: i128 = 1_000_000;

/// 视频流时间基（PTS 单位 = num / den 秒）
///
/// `den == 0` 表示没有时间信息，所有换算都返回 `None`，不会除零。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeBase {
    pub num: i32,
    pub den: i32,
}

impl TimeBase {
    /// 打开失败或没有视频流时使用
    pub const UNKNOWN: TimeBase = TimeBase { num: 0, den: 0 };

    pub const fn new(num: i32, den: i32) -> Self {
        Self { num, den }
    }

    pub fn is_known(&self) -> bool {
        self.den != 0
    }

    /// PTS → 微秒（向零截断）
    pub fn pts_to_us(&self, pts: i64) -> Option<i64> {
        if self.den == 0 {
            return None;
        }
        let us = pts as i128 * MICROS_PER_SECOND * self.num as i128 / self.den as i128;
        i64::try_from(us).ok()
    }

}

impl Default for TimeBase {
    fn default() -> Self {
        Self::UNKNOWN
    }
}

impl From<ffmpeg_next::Rational> for TimeBase {
    fn from(r: ffmpeg_next::Rational) -> Self {
        Self::new(r.numerator(), r.denominator())
    }
}

/// 输出音频参数（打开成功且有可用音频时 `valid == true`）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AudioParams {
    pub valid: bool,
    pub sample_rate: u32,
    pub channels: u16,
}

impl AudioParams {
    pub const fn none() -> Self {
        Self {
            valid: false,
            sample_rate: 0,
            channels: 0,
        }
    }

    /// 每秒 PCM 字节数（S16）
    pub fn bytes_per_second(&self) -> usize {
        self.sample_rate as usize * self.channels as usize * 2
    }
}

/// 一次解码 / seek 的结果：一帧画面 + 同一次调用中交错解出的音频
///
/// 创建后只读，交给消费者后即被消费。
#[derive(Debug, Clone)]
pub struct FrameData {
    /// RGB24 画面
    pub image: RgbImage,
    /// 重采样后的 PCM（44.1kHz / 立体声 / S16 交错），可能为空
    pub audio: Vec<u8>,
    /// 视频流时间基下的显示时间戳
    pub pts: i64,
}

impl FrameData {
    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn has_audio(&self) -> bool {
        !self.audio.is_empty()
    }

    /// 显示时间（微秒），时间基未知时为 None
    pub fn time_us(&self, time_base: TimeBase) -> Option<i64> {
        time_base.pts_to_us(self.pts)
    }
}

/// 播放状态机
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlaybackState {
    #[default]
    Idle,
    Open,
    Playing,
    Paused,
}

impl PlaybackState {
    pub fn has_stream(&self) -> bool {
        !matches!(self, PlaybackState::Idle)
    }

    /// 单帧步进只在“已打开且未播放”时有效
    pub fn can_step(&self) -> bool {
        matches!(self, PlaybackState::Open | PlaybackState::Paused)
    }
}

/// 打开结果，每次 open 恰好发布一次
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OpenResult {
    pub success: bool,
    pub audio: AudioParams,
    pub frame_rate: f64,
    pub duration_us: i64,
    pub time_base: TimeBase,
}

impl OpenResult {
    pub fn failed() -> Self {
        Self {
            success: false,
            audio: AudioParams::none(),
            frame_rate: 0.0,
            duration_us: UNKNOWN_DURATION,
            time_base: TimeBase::UNKNOWN,
        }
    }
}

/// 工作线程发给控制端的事件
#[derive(Debug, Clone)]
pub enum PlayerEvent {
    FileOpened(OpenResult),
    FrameReady(FrameData),
    Finished,
}

/// 媒体信息（打开时探测，只读）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaInfo {
    pub duration_us: i64,
    pub width: u32,
    pub height: u32,
    pub frame_rate: f64,
    pub video_codec: String,
    pub audio_codec: String,
    pub source_sample_rate: u32,
    pub source_channels: u16,
}

impl Default for MediaInfo {
    fn default() -> Self {
        Self {
            duration_us: UNKNOWN_DURATION,
            width: 0,
            height: 0,
            frame_rate: 0.0,
            video_codec: String::new(),
            audio_codec: "none".to_string(),
            source_sample_rate: 0,
            source_channels: 0,
        }
    }
}

/// 名义帧时长（微秒），帧率为 0 时为 None
pub fn frame_duration_us(frame_rate: f64) -> Option<f64> {
    if frame_rate > 0.0 && frame_rate.is_finite() {
        Some(1_000_000.0 / frame_rate)
    } else {
        None
    }
}

/// 进度条位置（0..=1000）映射到目标时间（微秒）
pub fn timeline_target_us(duration_us: i64, position_permille: u32) -> i64 {
    if duration_us <= 0 {
        return 0;
    }
    let position = position_permille.min(1000) as f64 / 1000.0;
    (duration_us as f64 * position) as i64
}

/// 格式化时间标签：不足一小时为 `MM:SS.mmm`，否则 `HH:MM:SS.mmm`
pub fn format_timestamp_us(us: i64) -> String {
    let us = us.max(0);
    let total_ms = us / 1000;
    let ms = total_ms % 1000;
    let total_secs = total_ms / 1000;
    let secs = total_secs % 60;
    let mins = (total_secs / 60) % 60;
    let hours = total_secs / 3600;
    if hours > 0 {
        format!("{:02}:{:02}:{:02}.{:03}", hours, mins, secs, ms)
    } else {
        format!("{:02}:{:02}.{:03}", mins, secs, ms)
    }
}
