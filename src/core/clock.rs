use std::time::{Duration, Instant};

/// 播放节拍时钟 - 按帧间隔重复触发
///
/// 只由工作线程持有和驱动，不跨线程共享。停止状态下没有下一次节拍。
#[derive(Debug, Default)]
pub struct FrameClock {
    interval: Option<Duration>,
    next_tick: Option<Instant>,
}

impl FrameClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// 帧率对应的节拍间隔（`1000 / frame_rate` 毫秒）
    ///
    /// 帧率为 0（容器没有平均帧率）时没有固定节奏，播放改用 `fallback` 间隔。
    pub fn interval_for(frame_rate: f64, fallback: Duration) -> Duration {
        if frame_rate > 0.0 && frame_rate.is_finite() {
            Duration::from_secs_f64(1.0 / frame_rate)
        } else {
            fallback
        }
    }

    /// 开始计时，第一次节拍在一个间隔之后
    pub fn start(&mut self, interval: Duration, now: Instant) {
        self.interval = Some(interval);
        self.next_tick = Some(now + interval);
    }

    /// 停止计时
    pub fn stop(&mut self) {
        self.interval = None;
        self.next_tick = None;
    }

    pub fn is_running(&self) -> bool {
        self.next_tick.is_some()
    }

    /// 距离下一次节拍的时间；已到期返回 0，停止时返回 None
    pub fn time_until_tick(&self, now: Instant) -> Option<Duration> {
        self.next_tick
            .map(|deadline| deadline.saturating_duration_since(now))
    }

    /// 消费一次节拍并安排下一次
    ///
    /// 落后超过一个间隔时（解码太慢）从当前时刻重新对齐，不会连续补发节拍。
    pub fn on_tick(&mut self, now: Instant) {
        let (Some(interval), Some(deadline)) = (self.interval, self.next_tick) else {
            return;
        };
        let next = deadline + interval;
        self.next_tick = Some(if next <= now { now + interval } else { next });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FALLBACK: Duration = Duration::from_millis(40);

    #[test]
    fn test_interval_for_frame_rate() {
        let d = FrameClock::interval_for(30.0, FALLBACK);
        assert_eq!(d.as_micros(), 33_333);
        assert_eq!(FrameClock::interval_for(0.0, FALLBACK), FALLBACK);
        assert_eq!(FrameClock::interval_for(f64::INFINITY, FALLBACK), FALLBACK);
    }

    #[test]
    fn test_stopped_clock_never_ticks() {
        let clock = FrameClock::new();
        let now = Instant::now();
        assert!(!clock.is_running());
        assert_eq!(clock.time_until_tick(now), None);
    }

    #[test]
    fn test_ticks_repeat_at_interval() {
        let mut clock = FrameClock::new();
        let t0 = Instant::now();
        let interval = Duration::from_millis(10);
        clock.start(interval, t0);

        assert_eq!(clock.time_until_tick(t0), Some(interval));

        let t1 = t0 + interval;
        assert_eq!(clock.time_until_tick(t1), Some(Duration::ZERO));
        clock.on_tick(t1);
        assert_eq!(clock.time_until_tick(t1), Some(interval));
    }

    #[test]
    fn test_late_tick_resyncs_instead_of_bursting() {
        let mut clock = FrameClock::new();
        let t0 = Instant::now();
        let interval = Duration::from_millis(10);
        clock.start(interval, t0);

        // 解码耗时 55ms，错过了多个节拍
        let late = t0 + Duration::from_millis(55);
        clock.on_tick(late);
        assert_eq!(clock.time_until_tick(late), Some(interval));
    }

    #[test]
    fn test_stop_clears_schedule() {
        let mut clock = FrameClock::new();
        let t0 = Instant::now();
        clock.start(Duration::from_millis(5), t0);
        clock.stop();
        assert!(!clock.is_running());
        assert_eq!(clock.time_until_tick(t0), None);
        clock.on_tick(t0);
        assert!(!clock.is_running());
    }
}
