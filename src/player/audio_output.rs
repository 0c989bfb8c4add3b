use parking_lot::Mutex;
use std::sync::Arc;

/// 音频接收端 - 接收固定格式的 PCM（44.1kHz / 立体声 / S16 交错）
///
/// 在播放线程中调用，实现方不能无限期阻塞。
pub trait AudioSink: Send {
    fn write(&mut self, pcm: &[u8]);
}

/// 内存缓冲接收端，克隆后共享同一块缓冲区
#[derive(Debug, Clone, Default)]
pub struct BufferedSink {
    buffer: Arc<Mutex<Vec<u8>>>,
}

impl BufferedSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// 已写入的字节数
    pub fn len(&self) -> usize {
        self.buffer.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.lock().is_empty()
    }

    /// 取出并清空已缓冲的 PCM
    pub fn take(&self) -> Vec<u8> {
        std::mem::take(&mut *self.buffer.lock())
    }
}

impl AudioSink for BufferedSink {
    fn write(&mut self, pcm: &[u8]) {
        self.buffer.lock().extend_from_slice(pcm);
    }
}

#[cfg(feature = "cpal-output")]
pub use self::device::CpalAudioOutput;

#[cfg(feature = "cpal-output")]
mod device {
    use super::AudioSink;
    use crate::core::{AudioOutputFormat, PlayerError, Result};
    use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
    use cpal::{Stream, StreamConfig, SupportedStreamConfigRange};
    use crossbeam::queue::SegQueue;
    use log::{debug, error, info, warn};
    use std::sync::Arc;

    /// 系统音频设备输出 - 使用 cpal 播放
    pub struct CpalAudioOutput {
        stream: Stream,
        buffer: Arc<SegQueue<i16>>,
    }

    // cpal::Stream 不是 Send；它只被持有直到 drop，回调线程只访问 SegQueue
    unsafe impl Send for CpalAudioOutput {}

    impl CpalAudioOutput {
        /// 打开默认输出设备并开始播放
        pub fn new(format: AudioOutputFormat) -> Result<Self> {
            info!(
                "初始化音频输出: {} Hz, {} 声道",
                format.sample_rate, format.channels
            );

            let host = cpal::default_host();
            let device = host
                .default_output_device()
                .ok_or_else(|| PlayerError::AudioError("无法找到音频输出设备".to_string()))?;

            debug!("使用音频设备: {}", device.name().unwrap_or_default());

            let config = StreamConfig {
                channels: format.channels,
                sample_rate: cpal::SampleRate(format.sample_rate),
                buffer_size: cpal::BufferSize::Default,
            };

            let supported = device
                .supported_output_configs()
                .map_err(|e| PlayerError::AudioError(format!("无法获取支持的音频配置: {}", e)))?
                .any(|range| Self::is_config_compatible(&config, &range));
            if !supported {
                // 输出格式固定，不做回退；交给设备自己转换
                warn!(
                    "⚠️  音频设备未声明支持 {} Hz, {} 声道，仍尝试打开",
                    format.sample_rate, format.channels
                );
            }

            let buffer = Arc::new(SegQueue::new());
            let queue = buffer.clone();

            let stream = device
                .build_output_stream(
                    &config,
                    move |data: &mut [i16], _: &cpal::OutputCallbackInfo| {
                        for sample in data.iter_mut() {
                            *sample = queue.pop().unwrap_or(0);
                        }
                    },
                    move |err| {
                        error!("音频流错误: {}", err);
                    },
                    None,
                )
                .map_err(|e| PlayerError::AudioError(format!("创建音频流失败: {}", e)))?;

            stream
                .play()
                .map_err(|e| PlayerError::AudioError(format!("启动音频流失败: {}", e)))?;

            info!("音频输出已启动");
            Ok(Self { stream, buffer })
        }

        fn is_config_compatible(config: &StreamConfig, supported: &SupportedStreamConfigRange) -> bool {
            config.sample_rate.0 >= supported.min_sample_rate().0
                && config.sample_rate.0 <= supported.max_sample_rate().0
                && config.channels == supported.channels()
        }
    }

    impl AudioSink for CpalAudioOutput {
        fn write(&mut self, pcm: &[u8]) {
            for bytes in pcm.chunks_exact(2) {
                self.buffer.push(i16::from_ne_bytes([bytes[0], bytes[1]]));
            }
        }
    }

    impl Drop for CpalAudioOutput {
        fn drop(&mut self) {
            if let Err(e) = self.stream.pause() {
                debug!("暂停音频流失败: {}", e);
            }
            info!("音频输出已停止");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buffered_sink_shares_buffer() {
        let sink = BufferedSink::new();
        let mut writer: Box<dyn AudioSink> = Box::new(sink.clone());
        writer.write(&[1, 2, 3, 4]);
        writer.write(&[5, 6]);

        assert_eq!(sink.len(), 6);
        assert_eq!(sink.take(), vec![1, 2, 3, 4, 5, 6]);
        assert!(sink.is_empty());
    }
}
