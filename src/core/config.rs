use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::types::AudioParams;

/// 重采样目标格式（样本格式固定为 S16 交错）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioOutputFormat {
    pub sample_rate: u32,
    pub channels: u16,
}

impl AudioOutputFormat {
    /// 44.1kHz / 立体声 / 16 位，音频接收端无需按文件重新配置
    pub const CAPTURE_DEFAULT: AudioOutputFormat = AudioOutputFormat {
        sample_rate: 44_100,
        channels: 2,
    };

    pub fn params(&self) -> AudioParams {
        AudioParams {
            valid: true,
            sample_rate: self.sample_rate,
            channels: self.channels,
        }
    }

    /// 每个采样帧（所有声道）的字节数
    pub fn bytes_per_sample_frame(&self) -> usize {
        self.channels as usize * 2
    }
}

impl Default for AudioOutputFormat {
    fn default() -> Self {
        Self::CAPTURE_DEFAULT
    }
}

/// 解码引擎配置
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineConfig {
    pub audio_output: AudioOutputFormat,
}

/// 播放工作线程配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    pub engine: EngineConfig,
    /// 容器没有平均帧率（`frame_rate() == 0`）时播放使用的节拍间隔
    pub fallback_frame_interval: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            engine: EngineConfig::default(),
            fallback_frame_interval: Duration::from_millis(40),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_output_format() {
        let fmt = AudioOutputFormat::default();
        assert_eq!(fmt.sample_rate, 44_100);
        assert_eq!(fmt.channels, 2);
        assert_eq!(fmt.bytes_per_sample_frame(), 4);
        let params = fmt.params();
        assert!(params.valid);
        assert_eq!(params.bytes_per_second(), 176_400);
    }

    #[test]
    fn test_config_round_trips_through_json() {
        let config = WorkerConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        let back: WorkerConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back.fallback_frame_interval, Duration::from_millis(40));
        assert_eq!(back.engine.audio_output, AudioOutputFormat::CAPTURE_DEFAULT);
    }
}
