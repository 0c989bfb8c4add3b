#![allow(dead_code)]

use ffmpeg_next as ffmpeg;
use ffmpeg_next::{codec, encoder, format, util, Rational};
use std::path::{Path, PathBuf};
use tempfile::TempDir;

pub const WIDTH: u32 = 320;
pub const HEIGHT: u32 = 240;
pub const FPS: i32 = 30;
pub const SAMPLE_RATE: i32 = 44_100;
pub const FRAME_US: i64 = 1_000_000 / FPS as i64;

const AUDIO_CHUNK: usize = 1024;
const GOP: u32 = 12;

/// 临时生成的媒体文件，随目录一起删除
pub struct Fixture {
    _dir: TempDir,
    pub path: PathBuf,
}

pub fn init() {
    let _ = env_logger::builder().is_test(true).try_init();
    ffmpeg::init().unwrap();
    ffmpeg::util::log::set_level(ffmpeg::util::log::Level::Error);
}

/// 320x240 mpeg4 @30fps + pcm_s16le 44.1kHz 立体声（Matroska）
pub fn video_with_audio(seconds: u32) -> Fixture {
    build("av.mkv", seconds, true, true, GOP)
}

/// 只有视频流的 Matroska
pub fn video_only(seconds: u32) -> Fixture {
    build("video.mkv", seconds, true, false, GOP)
}

/// 只有开头一个关键帧的视频，seek 到末尾需要从头解码
pub fn single_keyframe_video(seconds: u32) -> Fixture {
    build("long-gop.mkv", seconds, true, false, seconds * FPS as u32)
}

/// 只有音频流的 WAV
pub fn audio_only(seconds: u32) -> Fixture {
    build("audio.wav", seconds, false, true, GOP)
}

fn build(name: &str, seconds: u32, with_video: bool, with_audio: bool, gop: u32) -> Fixture {
    init();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join(name);
    write_media(&path, seconds, with_video, with_audio, gop);
    Fixture { _dir: dir, path }
}

struct VideoTrack {
    encoder: encoder::video::Encoder,
    stream_index: usize,
    time_base: Rational,
}

struct AudioTrack {
    encoder: encoder::audio::Encoder,
    stream_index: usize,
    time_base: Rational,
    next_sample: i64,
}

fn write_media(path: &Path, seconds: u32, with_video: bool, with_audio: bool, gop: u32) {
    let mut octx = format::output(&path).unwrap();
    let global_header = octx
        .format()
        .flags()
        .contains(format::Flags::GLOBAL_HEADER);

    let mut video = with_video.then(|| add_video(&mut octx, global_header, gop));
    let mut audio = with_audio.then(|| add_audio(&mut octx, global_header));

    octx.write_header().unwrap();

    let total_frames = seconds as i64 * FPS as i64;
    let total_samples = seconds as i64 * SAMPLE_RATE as i64;

    if let Some(track) = video.as_mut() {
        for index in 0..total_frames {
            let frame = pattern_frame(index);
            track.encoder.send_frame(&frame).unwrap();
            drain_video(track, &mut octx);

            // 音频按视频进度交错写入
            if let Some(audio) = audio.as_mut() {
                let until = (index + 1) * SAMPLE_RATE as i64 / FPS as i64;
                write_audio_until(audio, &mut octx, until.min(total_samples));
            }
        }
        track.encoder.send_eof().unwrap();
        drain_video(track, &mut octx);
    }

    if let Some(track) = audio.as_mut() {
        write_audio_until(track, &mut octx, total_samples);
        track.encoder.send_eof().unwrap();
        drain_audio(track, &mut octx);
    }

    octx.write_trailer().unwrap();
}

fn add_video(octx: &mut format::context::Output, global_header: bool, gop: u32) -> VideoTrack {
    let codec = encoder::find(codec::Id::MPEG4).expect("mpeg4 encoder");
    let mut ost = octx.add_stream(codec).unwrap();
    let stream_index = ost.index();

    let mut enc = codec::context::Context::new_with_codec(codec)
        .encoder()
        .video()
        .unwrap();
    enc.set_width(WIDTH);
    enc.set_height(HEIGHT);
    enc.set_format(util::format::Pixel::YUV420P);
    enc.set_time_base(Rational::new(1, FPS));
    enc.set_frame_rate(Some(Rational::new(FPS, 1)));
    enc.set_gop(gop);
    enc.set_bit_rate(800_000);
    if global_header {
        enc.set_flags(codec::Flags::GLOBAL_HEADER);
    }

    let encoder = enc.open_as(codec).unwrap();
    ost.set_parameters(&encoder);
    ost.set_time_base(Rational::new(1, FPS));
    ost.set_avg_frame_rate(Rational::new(FPS, 1));

    VideoTrack {
        encoder,
        stream_index,
        time_base: Rational::new(1, FPS),
    }
}

fn add_audio(octx: &mut format::context::Output, global_header: bool) -> AudioTrack {
    let codec = encoder::find(codec::Id::PCM_S16LE).expect("pcm_s16le encoder");
    let mut ost = octx.add_stream(codec).unwrap();
    let stream_index = ost.index();

    let mut enc = codec::context::Context::new_with_codec(codec)
        .encoder()
        .audio()
        .unwrap();
    enc.set_rate(SAMPLE_RATE);
    enc.set_channel_layout(util::channel_layout::ChannelLayout::STEREO);
    enc.set_format(util::format::Sample::I16(util::format::sample::Type::Packed));
    enc.set_time_base(Rational::new(1, SAMPLE_RATE));
    if global_header {
        enc.set_flags(codec::Flags::GLOBAL_HEADER);
    }

    let encoder = enc.open_as(codec).unwrap();
    ost.set_parameters(&encoder);
    ost.set_time_base(Rational::new(1, SAMPLE_RATE));

    AudioTrack {
        encoder,
        stream_index,
        time_base: Rational::new(1, SAMPLE_RATE),
        next_sample: 0,
    }
}

/// 每帧位置不同的渐变画面，保证编码器产出真实的帧间差异
fn pattern_frame(index: i64) -> util::frame::Video {
    let mut frame = util::frame::Video::new(util::format::Pixel::YUV420P, WIDTH, HEIGHT);
    let shift = (index * 4) as usize;

    let stride = frame.stride(0);
    let luma = frame.data_mut(0);
    for y in 0..HEIGHT as usize {
        let row = &mut luma[y * stride..y * stride + WIDTH as usize];
        for (x, px) in row.iter_mut().enumerate() {
            *px = ((x + y + shift) % 256) as u8;
        }
    }
    for plane in 1..3 {
        let stride = frame.stride(plane);
        let value = (128 + (index % 32) as usize * plane) as u8;
        let chroma = frame.data_mut(plane);
        for y in 0..(HEIGHT / 2) as usize {
            chroma[y * stride..y * stride + (WIDTH / 2) as usize].fill(value);
        }
    }

    frame.set_pts(Some(index));
    frame
}

fn write_audio_until(track: &mut AudioTrack, octx: &mut format::context::Output, until: i64) {
    while track.next_sample < until {
        let samples = ((until - track.next_sample) as usize).min(AUDIO_CHUNK);
        let mut frame = util::frame::Audio::new(
            util::format::Sample::I16(util::format::sample::Type::Packed),
            samples,
            util::channel_layout::ChannelLayout::STEREO,
        );
        frame.set_rate(SAMPLE_RATE as u32);
        frame.set_pts(Some(track.next_sample));

        // 440Hz 正弦
        let data = frame.data_mut(0);
        for i in 0..samples {
            let t = (track.next_sample + i as i64) as f64 / SAMPLE_RATE as f64;
            let value = ((t * 440.0 * std::f64::consts::TAU).sin() * 8000.0) as i16;
            let bytes = value.to_le_bytes();
            let offset = i * 4;
            data[offset..offset + 2].copy_from_slice(&bytes);
            data[offset + 2..offset + 4].copy_from_slice(&bytes);
        }

        track.encoder.send_frame(&frame).unwrap();
        track.next_sample += samples as i64;
        drain_audio(track, octx);
    }
}

fn drain_video(track: &mut VideoTrack, octx: &mut format::context::Output) {
    let out_tb = octx.stream(track.stream_index).unwrap().time_base();
    let mut packet = ffmpeg::Packet::empty();
    while track.encoder.receive_packet(&mut packet).is_ok() {
        packet.set_stream(track.stream_index);
        packet.rescale_ts(track.time_base, out_tb);
        packet.write_interleaved(octx).unwrap();
    }
}

fn drain_audio(track: &mut AudioTrack, octx: &mut format::context::Output) {
    let out_tb = octx.stream(track.stream_index).unwrap().time_base();
    let mut packet = ffmpeg::Packet::empty();
    while track.encoder.receive_packet(&mut packet).is_ok() {
        packet.set_stream(track.stream_index);
        packet.rescale_ts(track.time_base, out_tb);
        packet.write_interleaved(octx).unwrap();
    }
}
