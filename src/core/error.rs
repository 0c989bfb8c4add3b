use thiserror::Error;

/// 引擎内部错误
///
/// 只在引擎内部用 `?` 传播；跨越引擎边界时统一折叠为 `bool` / `Option`，
/// 具体原因只写日志。
#[derive(Error, Debug)]
pub enum PlayerError {
    #[error("FFmpeg 错误: {0}")]
    FFmpegError(#[from] ffmpeg_next::Error),

    #[error("IO 错误: {0}")]
    IoError(#[from] std::io::Error),

    #[error("图像错误: {0}")]
    ImageError(#[from] image::ImageError),

    #[error("无法打开文件: {0}")]
    OpenError(String),

    #[error("无法找到视频流")]
    NoVideoStream,

    #[error("解码错误: {0}")]
    DecodeError(String),

    #[error("音频输出错误: {0}")]
    AudioError(String),

    #[error("工作线程错误: {0}")]
    WorkerError(String),
}

pub type Result<T> = std::result::Result<T, PlayerError>;
