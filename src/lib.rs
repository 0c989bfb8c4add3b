// 视频逐帧截图工具的解码/播放引擎

pub mod core;
pub mod player;
pub mod capture;

pub use crate::core::{
    AudioParams, EngineConfig, FrameData, OpenResult, PlaybackState, PlayerError, PlayerEvent,
    TimeBase, WorkerConfig, UNKNOWN_DURATION,
};
pub use crate::player::{AudioSink, DecodeEngine, PlaybackWorker};
