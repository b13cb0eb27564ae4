use core::time::Duration;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// Length of one throughput window.
pub const THROUGHPUT_WINDOW: Duration = Duration::from_secs(1);

/// Frames-per-second over consecutive one-second windows.
#[derive(Debug, Clone)]
pub struct ThroughputMeter {
    window_start: Option<Instant>,
    frames: u32,
    fps: f64,
}

impl ThroughputMeter {
    pub fn new() -> Self {
        Self {
            window_start: None,
            frames: 0,
            fps: 0.0,
        }
    }

    /// Count one processed frame. Returns the new rate when `now` closes
    /// the current window.
    pub fn record(&mut self, now: Instant) -> Option<f64> {
        let start = *self.window_start.get_or_insert(now);
        self.frames += 1;
        let elapsed = now.saturating_duration_since(start);
        if elapsed < THROUGHPUT_WINDOW {
            return None;
        }
        self.fps = f64::from(self.frames) / elapsed.as_secs_f64();
        self.frames = 0;
        self.window_start = Some(now);
        Some(self.fps)
    }

    /// Rate measured over the last complete window, 0 before the first one.
    pub fn fps(&self) -> f64 {
        self.fps
    }

    /// Like [`fps`](Self::fps), but 0 once a whole window has passed at
    /// `now` without any frame arriving to close the current one.
    pub fn fps_at(&self, now: Instant) -> f64 {
        match self.window_start {
            Some(start) if now.saturating_duration_since(start) < 2 * THROUGHPUT_WINDOW => {
                self.fps
            }
            _ => 0.0,
        }
    }
}

impl Default for ThroughputMeter {
    fn default() -> Self {
        Self::new()
    }
}

/// A snapshot of pipeline counters.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PipelineStats {
    /// Frames delivered by the source, including those arriving while stopped.
    pub received: u64,
    /// Frames converted and filtered successfully.
    pub processed: u64,
    /// Processed frames that never reached the display.
    pub dropped: u64,
    /// Frames skipped because of an error.
    pub failed: u64,
    /// Frames handed back to the source.
    pub released: u64,
    /// Frames the display accepted.
    pub published: u64,
    /// Rate over the last complete one-second window, 0 when no frame has
    /// arrived for a full window.
    pub frames_per_second: f64,
}

#[derive(Debug, Default)]
pub(crate) struct Counters {
    pub(crate) received: AtomicU64,
    pub(crate) processed: AtomicU64,
    pub(crate) dropped: AtomicU64,
    pub(crate) failed: AtomicU64,
    pub(crate) released: AtomicU64,
    pub(crate) published: AtomicU64,
}

impl Counters {
    pub(crate) fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self, frames_per_second: f64) -> PipelineStats {
        let load = |c: &AtomicU64| c.load(Ordering::Relaxed);
        PipelineStats {
            received: load(&self.received),
            processed: load(&self.processed),
            dropped: load(&self.dropped),
            failed: load(&self.failed),
            released: load(&self.released),
            published: load(&self.published),
            frames_per_second,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reports_after_a_full_window() {
        let mut meter = ThroughputMeter::new();
        let t0 = Instant::now();
        for i in 0..30 {
            assert_eq!(meter.record(t0 + Duration::from_millis(i * 30)), None);
        }
        assert_eq!(meter.fps(), 0.0);
        let fps = meter.record(t0 + Duration::from_secs(1)).unwrap();
        assert!((fps - 31.0).abs() < 1e-9, "{fps}");
        assert_eq!(meter.fps(), fps);
    }

    #[test]
    fn windows_restart_after_reporting() {
        let mut meter = ThroughputMeter::new();
        let t0 = Instant::now();
        meter.record(t0);
        meter.record(t0 + Duration::from_secs(1)).unwrap();
        assert_eq!(meter.record(t0 + Duration::from_millis(1500)), None);
        let fps = meter.record(t0 + Duration::from_secs(3)).unwrap();
        assert!((fps - 1.0).abs() < 1e-9, "{fps}");
    }

    #[test]
    fn rate_decays_when_frames_stop() {
        let mut meter = ThroughputMeter::new();
        let t0 = Instant::now();
        assert_eq!(meter.fps_at(t0), 0.0);
        for i in 0..=30 {
            meter.record(t0 + Duration::from_millis(i * 1000 / 30));
        }
        let t1 = t0 + Duration::from_secs(1);
        assert!((meter.fps_at(t1 + Duration::from_millis(500)) - 31.0).abs() < 1e-9);
        assert_eq!(meter.fps_at(t1 + Duration::from_secs(2)), 0.0);
        assert!(meter.fps() > 0.0);
    }

    #[test]
    fn counters_snapshot() {
        let counters = Counters::default();
        Counters::bump(&counters.received);
        Counters::bump(&counters.received);
        Counters::bump(&counters.released);
        let stats = counters.snapshot(12.5);
        assert_eq!(stats.received, 2);
        assert_eq!(stats.released, 1);
        assert_eq!(stats.frames_per_second, 12.5);
    }
}
