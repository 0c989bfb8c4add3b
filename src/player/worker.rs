use crate::core::{
    frame_duration_us, FrameClock, FrameData, OpenResult, PlaybackState, PlayerError,
    PlayerEvent, Result, WorkerConfig,
};
use crate::player::audio_output::AudioSink;
use crate::player::engine::{CancelToken, DecodeEngine};
use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use log::{debug, error, info, warn};
use parking_lot::RwLock;
use std::path::{Path, PathBuf};
use std::process;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

fn log_ctx() -> String {
    format!("[pid:{} tid:{:?}]", process::id(), thread::current().id())
}

/// 播放线程命令
enum Command {
    Open(PathBuf),
    Seek(i64), // us
    PlayPause(bool),
    NextFrame,
    PrevFrame,
    Stop,
}

/// 播放工作线程 - 独占解码引擎，按到达顺序逐条执行命令
///
/// 控制端的方法都是异步的：只入队命令，结果通过事件通道返回。
pub struct PlaybackWorker {
    command_tx: Sender<Command>,
    event_rx: Receiver<PlayerEvent>,
    state: Arc<RwLock<PlaybackState>>,
    cancel: CancelToken,
    stop_requested: AtomicBool,
    thread_handle: Option<JoinHandle<()>>,
}

impl PlaybackWorker {
    /// 启动播放线程；`sink` 接收每帧附带的 PCM
    pub fn spawn(config: WorkerConfig, sink: Option<Box<dyn AudioSink>>) -> Result<Self> {
        let (command_tx, command_rx) = unbounded::<Command>();
        let (event_tx, event_rx) = unbounded::<PlayerEvent>();
        let state = Arc::new(RwLock::new(PlaybackState::Idle));
        let cancel = CancelToken::new();

        let thread_state = state.clone();
        let thread_cancel = cancel.clone();
        let thread_handle = thread::Builder::new()
            .name("playback-worker".to_string())
            .spawn(move || {
                // 引擎在工作线程内创建，FFmpeg 上下文不离开该线程
                let engine = DecodeEngine::with_cancel_token(config.engine.clone(), thread_cancel);
                let mut worker = WorkerLoop {
                    engine,
                    clock: FrameClock::new(),
                    fallback_interval: config.fallback_frame_interval,
                    state: thread_state,
                    event_tx,
                    sink,
                    cursor: None,
                };
                worker.run(command_rx);
            })
            .map_err(|e| PlayerError::WorkerError(format!("无法启动播放线程: {}", e)))?;

        Ok(Self {
            command_tx,
            event_rx,
            state,
            cancel,
            stop_requested: AtomicBool::new(false),
            thread_handle: Some(thread_handle),
        })
    }

    fn send(&self, command: Command) {
        if self.command_tx.send(command).is_err() {
            warn!("{} 播放线程已退出，忽略命令", log_ctx());
        }
    }

    pub fn open(&self, path: impl AsRef<Path>) {
        self.send(Command::Open(path.as_ref().to_path_buf()));
    }

    pub fn seek(&self, timestamp_us: i64) {
        self.send(Command::Seek(timestamp_us));
    }

    pub fn play_pause(&self, play: bool) {
        self.send(Command::PlayPause(play));
    }

    pub fn next_frame(&self) {
        self.send(Command::NextFrame);
    }

    pub fn prev_frame(&self) {
        self.send(Command::PrevFrame);
    }

    /// 终止播放线程：先置取消标志打断正在进行的解码，再入队 Stop
    ///
    /// 只有第一次调用会入队 Stop，之后的调用什么都不做。
    pub fn stop(&self) {
        self.request_stop();
    }

    /// 本次调用是否真正发出了 Stop
    fn request_stop(&self) -> bool {
        if self.stop_requested.swap(true, Ordering::SeqCst) {
            return false;
        }
        self.cancel.cancel();
        self.send(Command::Stop);
        true
    }

    /// 最近一次由播放线程发布的状态
    pub fn state(&self) -> PlaybackState {
        *self.state.read()
    }

    pub fn try_recv(&self) -> Option<PlayerEvent> {
        self.event_rx.try_recv().ok()
    }

    pub fn recv_timeout(&self, timeout: Duration) -> Option<PlayerEvent> {
        self.event_rx.recv_timeout(timeout).ok()
    }

    /// 取出当前所有待处理事件，多个画面只保留最新的一帧
    pub fn drain_coalesced(&self) -> Vec<PlayerEvent> {
        coalesce_frames(self.event_rx.try_iter().collect())
    }
}

impl Drop for PlaybackWorker {
    fn drop(&mut self) {
        // 线程已退出时命令通道已断开，不再入队
        let running = self
            .thread_handle
            .as_ref()
            .is_some_and(|handle| !handle.is_finished());
        if running {
            self.stop();
        }
        if let Some(handle) = self.thread_handle.take() {
            if handle.join().is_err() {
                error!("{} 播放线程异常退出", log_ctx());
            }
        }
    }
}

/// 合并事件：只保留最后一个 FrameReady，其余事件保持原顺序
pub fn coalesce_frames(events: Vec<PlayerEvent>) -> Vec<PlayerEvent> {
    let last_frame = events
        .iter()
        .rposition(|e| matches!(e, PlayerEvent::FrameReady(_)));

    events
        .into_iter()
        .enumerate()
        .filter(|(i, e)| !matches!(e, PlayerEvent::FrameReady(_)) || Some(*i) == last_frame)
        .map(|(_, e)| e)
        .collect()
}

/// “上一帧”的目标时间：当前位置回退 1.5 帧，落在上一帧区间内，不早于 0
///
/// 当前位置或帧率未知时没有目标。
pub fn prev_frame_target_us(current_us: Option<i64>, frame_rate: f64) -> Option<i64> {
    let current_us = current_us?;
    let frame_us = frame_duration_us(frame_rate)?;
    Some((current_us as f64 - 1.5 * frame_us).max(0.0) as i64)
}

/// 播放线程内部状态
struct WorkerLoop {
    engine: DecodeEngine,
    clock: FrameClock,
    fallback_interval: Duration,
    state: Arc<RwLock<PlaybackState>>,
    event_tx: Sender<PlayerEvent>,
    sink: Option<Box<dyn AudioSink>>,
    /// 最近一次成功解码的视频 PTS
    cursor: Option<i64>,
}

impl WorkerLoop {
    fn run(&mut self, command_rx: Receiver<Command>) {
        info!("{} 🎬 播放线程启动", log_ctx());

        loop {
            // 播放中按节拍等待，否则阻塞等命令
            let command = match self.clock.time_until_tick(Instant::now()) {
                None => match command_rx.recv() {
                    Ok(command) => Some(command),
                    Err(_) => break,
                },
                Some(wait) => match command_rx.recv_timeout(wait) {
                    Ok(command) => Some(command),
                    Err(RecvTimeoutError::Timeout) => None,
                    Err(RecvTimeoutError::Disconnected) => break,
                },
            };

            match command {
                Some(Command::Open(path)) => self.handle_open(&path),
                Some(Command::Seek(timestamp_us)) => self.handle_seek(timestamp_us),
                Some(Command::PlayPause(play)) => self.handle_play_pause(play),
                Some(Command::NextFrame) => self.handle_next_frame(),
                Some(Command::PrevFrame) => self.handle_prev_frame(),
                Some(Command::Stop) => {
                    self.handle_stop();
                    break;
                }
                None => self.on_tick(),
            }
        }

        info!("{} 播放线程退出", log_ctx());
    }

    fn state(&self) -> PlaybackState {
        *self.state.read()
    }

    fn set_state(&self, state: PlaybackState) {
        let mut current = self.state.write();
        if *current != state {
            debug!("{} 状态: {:?} → {:?}", log_ctx(), *current, state);
            *current = state;
        }
    }

    fn emit(&self, event: PlayerEvent) {
        if self.event_tx.send(event).is_err() {
            debug!("{} 事件接收端已关闭", log_ctx());
        }
    }

    /// 先写音频再发布画面
    fn publish(&mut self, frame: FrameData) {
        self.cursor = Some(frame.pts);
        if frame.has_audio() {
            if let Some(sink) = self.sink.as_mut() {
                sink.write(&frame.audio);
            }
        }
        self.emit(PlayerEvent::FrameReady(frame));
    }

    fn handle_open(&mut self, path: &Path) {
        info!("{} 📂 打开: {}", log_ctx(), path.display());
        self.clock.stop();
        self.cursor = None;

        if !self.engine.open(path) {
            self.set_state(PlaybackState::Idle);
            self.emit(PlayerEvent::FileOpened(OpenResult::failed()));
            return;
        }

        self.set_state(PlaybackState::Open);
        self.emit(PlayerEvent::FileOpened(OpenResult {
            success: true,
            audio: self.engine.audio_params(),
            frame_rate: self.engine.frame_rate(),
            duration_us: self.engine.duration_us(),
            time_base: self.engine.time_base(),
        }));

        // 首帧
        match self.engine.seek_and_decode(0) {
            Some(frame) => self.publish(frame),
            None => warn!("{} ⚠️  无法解码首帧", log_ctx()),
        }
    }

    fn handle_seek(&mut self, timestamp_us: i64) {
        if !self.state().has_stream() {
            debug!("{} 未打开文件，忽略 Seek", log_ctx());
            return;
        }

        debug!("{} ⏩ Seek 到 {}us", log_ctx(), timestamp_us);
        if let Some(frame) = self.engine.seek_and_decode(timestamp_us) {
            self.publish(frame);
        }
    }

    fn handle_play_pause(&mut self, play: bool) {
        match (self.state(), play) {
            (PlaybackState::Open | PlaybackState::Paused, true) => {
                let interval =
                    FrameClock::interval_for(self.engine.frame_rate(), self.fallback_interval);
                info!("{} ▶️  播放，节拍间隔 {:?}", log_ctx(), interval);
                self.clock.start(interval, Instant::now());
                self.set_state(PlaybackState::Playing);
            }
            (PlaybackState::Playing, false) => {
                info!("{} ⏸️  暂停", log_ctx());
                self.clock.stop();
                self.set_state(PlaybackState::Paused);
            }
            (state, play) => {
                debug!("{} 状态 {:?} 下忽略 play={}", log_ctx(), state, play);
            }
        }
    }

    fn handle_next_frame(&mut self) {
        if !self.state().can_step() {
            debug!("{} 状态 {:?} 下忽略下一帧", log_ctx(), self.state());
            return;
        }

        match self.engine.decode_next_frame() {
            Some(frame) => self.publish(frame),
            None => debug!("{} 已是最后一帧", log_ctx()),
        }
    }

    fn handle_prev_frame(&mut self) {
        if !self.state().can_step() {
            debug!("{} 状态 {:?} 下忽略上一帧", log_ctx(), self.state());
            return;
        }

        // 时间基或帧率未知时无法计算目标
        let current_us = self
            .cursor
            .and_then(|pts| self.engine.time_base().pts_to_us(pts));
        let Some(target_us) = prev_frame_target_us(current_us, self.engine.frame_rate()) else {
            debug!("{} 缺少时间信息，忽略上一帧", log_ctx());
            return;
        };

        debug!("{} ⏪ 上一帧: {:?}us → {}us", log_ctx(), current_us, target_us);
        if let Some(frame) = self.engine.seek_and_decode(target_us) {
            self.publish(frame);
        }
    }

    fn handle_stop(&mut self) {
        info!("{} ⏹️  停止", log_ctx());
        self.clock.stop();
        self.engine.close();
        self.cursor = None;
        self.set_state(PlaybackState::Idle);
        self.emit(PlayerEvent::Finished);
    }

    fn on_tick(&mut self) {
        if self.state() != PlaybackState::Playing {
            self.clock.stop();
            return;
        }
        self.clock.on_tick(Instant::now());

        match self.engine.decode_next_frame() {
            Some(frame) => self.publish(frame),
            // 被 stop 打断时由 Stop 命令收尾
            None if self.engine.is_cancelled() => self.clock.stop(),
            None => {
                info!("{} 🏁 播放结束", log_ctx());
                self.clock.stop();
                self.set_state(PlaybackState::Paused);
            }
        }
    }
}
