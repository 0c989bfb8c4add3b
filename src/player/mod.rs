// 解码与播放模块

pub mod demuxer;
pub mod decoder;
pub mod engine;
pub mod audio_output;
pub mod worker;

pub use demuxer::Demuxer;
pub use decoder::{AudioDecoder, VideoDecoder};
pub use engine::{CancelToken, DecodeEngine};
pub use audio_output::{AudioSink, BufferedSink};
#[cfg(feature = "cpal-output")]
pub use audio_output::CpalAudioOutput;
pub use worker::{coalesce_frames, prev_frame_target_us, PlaybackWorker};
