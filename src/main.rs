use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use log::{info, warn};
use serde::Serialize;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use frame_capture::capture::save_frame_png;
use frame_capture::core::{format_timestamp_us, MediaInfo, OpenResult};
use frame_capture::player::{AudioSink, BufferedSink};
use frame_capture::{DecodeEngine, EngineConfig, PlaybackWorker, PlayerEvent, WorkerConfig};

/// 视频逐帧截图工具（无界面）
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// 输出调试日志
    #[arg(short, long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// 打开文件并以 JSON 输出流信息
    Probe {
        file: PathBuf,
    },
    /// Seek 到指定时间并把该帧保存为 PNG
    Capture {
        file: PathBuf,
        /// 目标时间（秒）
        #[arg(long, default_value_t = 0.0)]
        at: f64,
        /// 输出目录
        #[arg(short, long, default_value = ".")]
        out: PathBuf,
        /// 文件名前缀，默认取源文件名
        #[arg(long)]
        name: Option<String>,
    },
    /// 在后台线程按帧率播放，记录每一帧
    Play {
        file: PathBuf,
        /// 播放的帧数上限
        #[arg(long, default_value_t = 100)]
        frames: usize,
        /// 通过系统音频设备播放声音
        #[cfg(feature = "cpal-output")]
        #[arg(long)]
        speaker: bool,
    },
}

#[derive(Serialize)]
struct ProbeReport {
    open: OpenResult,
    info: MediaInfo,
}

fn main() -> Result<()> {
    let args = Args::parse();

    // 初始化日志（RUST_LOG 优先）
    let default_level = if args.debug { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .init();

    info!("🎬 frame_capture 启动");

    match args.command {
        Command::Probe { file } => probe(file),
        Command::Capture { file, at, out, name } => capture(file, at, out, name),
        #[cfg(feature = "cpal-output")]
        Command::Play { file, frames, speaker } => play(file, frames, speaker),
        #[cfg(not(feature = "cpal-output"))]
        Command::Play { file, frames } => play(file, frames, false),
    }
}

fn probe(file: PathBuf) -> Result<()> {
    let mut engine = DecodeEngine::new(EngineConfig::default());
    if !engine.open(&file) {
        bail!("无法打开 {}", file.display());
    }

    let report = ProbeReport {
        open: OpenResult {
            success: true,
            audio: engine.audio_params(),
            frame_rate: engine.frame_rate(),
            duration_us: engine.duration_us(),
            time_base: engine.time_base(),
        },
        info: engine.media_info().unwrap_or_default(),
    };
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

fn capture(file: PathBuf, at: f64, out: PathBuf, name: Option<String>) -> Result<()> {
    if !at.is_finite() || at < 0.0 {
        bail!("无效的时间: {}", at);
    }

    let mut engine = DecodeEngine::new(EngineConfig::default());
    if !engine.open(&file) {
        bail!("无法打开 {}", file.display());
    }

    let target_us = (at * 1_000_000.0) as i64;
    let frame = engine
        .seek_and_decode(target_us)
        .with_context(|| format!("{} 处没有可解码的画面", format_timestamp_us(target_us)))?;

    let base = name.unwrap_or_else(|| {
        let stem = file
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| "frame".to_string());
        format!("{}_{}", stem, format_timestamp_us(target_us).replace([':', '.'], "_"))
    });

    let path = save_frame_png(&frame, &out, &base)?;
    let shown_at = frame
        .time_us(engine.time_base())
        .map(format_timestamp_us)
        .unwrap_or_else(|| "--:--.---".to_string());
    println!("{} ({})", path.display(), shown_at);
    Ok(())
}

fn play(file: PathBuf, frames: usize, speaker: bool) -> Result<()> {
    let buffered = BufferedSink::new();
    let sink: Box<dyn AudioSink> = if speaker {
        open_speaker()?
    } else {
        Box::new(buffered.clone())
    };

    let worker = PlaybackWorker::spawn(WorkerConfig::default(), Some(sink))?;
    worker.open(&file);

    let opened = match worker.recv_timeout(Duration::from_secs(10)) {
        Some(PlayerEvent::FileOpened(result)) => result,
        _ => bail!("打开 {} 超时", file.display()),
    };
    if !opened.success {
        bail!("无法打开 {}", file.display());
    }
    info!(
        "帧率 {:.3}, 时长 {}, 音频 {:?}",
        opened.frame_rate,
        format_timestamp_us(opened.duration_us),
        opened.audio
    );

    worker.play_pause(true);
    let started = Instant::now();
    let mut shown = 0usize;
    while shown < frames {
        match worker.recv_timeout(Duration::from_secs(2)) {
            Some(PlayerEvent::FrameReady(frame)) => {
                shown += 1;
                let at = frame
                    .time_us(opened.time_base)
                    .map(format_timestamp_us)
                    .unwrap_or_default();
                info!(
                    "帧 #{:<5} {} {}x{} 音频 {} 字节",
                    shown,
                    at,
                    frame.width(),
                    frame.height(),
                    frame.audio.len()
                );
            }
            Some(_) => {}
            None => {
                // 播放到末尾后线程自动暂停，不再产出画面
                warn!("等待画面超时，停止");
                break;
            }
        }
    }

    worker.stop();
    let audio_secs = match opened.audio.bytes_per_second() {
        0 => 0.0,
        rate => buffered.len() as f64 / rate as f64,
    };
    info!(
        "共 {} 帧，用时 {:.2}s，音频 {} 字节（{:.2}s）",
        shown,
        started.elapsed().as_secs_f64(),
        buffered.len(),
        audio_secs
    );
    Ok(())
}

#[cfg(feature = "cpal-output")]
fn open_speaker() -> Result<Box<dyn AudioSink>> {
    let output = frame_capture::player::CpalAudioOutput::new(
        frame_capture::core::AudioOutputFormat::CAPTURE_DEFAULT,
    )?;
    Ok(Box::new(output))
}

#[cfg(not(feature = "cpal-output"))]
fn open_speaker() -> Result<Box<dyn AudioSink>> {
    bail!("未启用 cpal-output 功能，无法使用音频设备")
}
