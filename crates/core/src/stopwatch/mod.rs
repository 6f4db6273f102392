//! Elapsed-time stopwatch for a practice session.

use std::{
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Instant,
};

/// Millisecond time source for the stopwatch.
pub trait TimeSource: Send + Sync {
    fn now_ms(&self) -> f64;
}

/// Monotonic system time, measured from construction.
#[derive(Debug, Clone)]
pub struct MonotonicTime {
    origin: Instant,
}

impl Default for MonotonicTime {
    fn default() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl TimeSource for MonotonicTime {
    fn now_ms(&self) -> f64 {
        self.origin.elapsed().as_secs_f64() * 1000.0
    }
}

/// Time source moved by hand; clones share the same reading.
#[derive(Debug, Clone, Default)]
pub struct ManualTime {
    bits: Arc<AtomicU64>,
}

impl ManualTime {
    pub fn set(&self, ms: f64) {
        self.bits.store(ms.to_bits(), Ordering::Release);
    }

    pub fn advance(&self, ms: f64) {
        self.set(self.now_ms() + ms);
    }
}

impl TimeSource for ManualTime {
    fn now_ms(&self) -> f64 {
        f64::from_bits(self.bits.load(Ordering::Acquire))
    }
}

/// Stopwatch accumulating running time across start/stop cycles.
///
/// `displayed` is the presentation value; it only moves when the repaint
/// loop calls [`SessionTimer::on_frame`], or when the timer stops or resets.
#[derive(Debug)]
pub struct SessionTimer<S = MonotonicTime> {
    source: S,
    accumulated_ms: f64,
    segment_start: Option<f64>,
    displayed_ms: f64,
    repainting: bool,
}

impl SessionTimer<MonotonicTime> {
    pub fn new() -> Self {
        Self::with_source(MonotonicTime::default())
    }
}

impl Default for SessionTimer<MonotonicTime> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: TimeSource> SessionTimer<S> {
    pub fn with_source(source: S) -> Self {
        Self {
            source,
            accumulated_ms: 0.0,
            segment_start: None,
            displayed_ms: 0.0,
            repainting: false,
        }
    }

    /// Opens a run segment. Does nothing while already running.
    pub fn start(&mut self) {
        if self.segment_start.is_some() {
            return;
        }
        self.segment_start = Some(self.source.now_ms());
        self.repainting = true;
    }

    /// Folds the current segment into the total. Does nothing while stopped.
    pub fn stop(&mut self) {
        let Some(start) = self.segment_start.take() else {
            return;
        };
        self.accumulated_ms += (self.source.now_ms() - start).max(0.0);
        self.displayed_ms = self.accumulated_ms;
        self.repainting = false;
    }

    /// Zeroes the stopwatch whether or not it is running.
    pub fn reset(&mut self) {
        self.segment_start = None;
        self.accumulated_ms = 0.0;
        self.displayed_ms = 0.0;
        self.repainting = false;
    }

    pub fn is_running(&self) -> bool {
        self.segment_start.is_some()
    }

    /// Exact elapsed time right now, independent of repaints.
    pub fn elapsed_ms(&self) -> f64 {
        let running = self
            .segment_start
            .map(|start| (self.source.now_ms() - start).max(0.0))
            .unwrap_or(0.0);
        self.accumulated_ms + running
    }

    /// Per-frame repaint hook. Returns whether the display changed, i.e.
    /// whether the update loop is still active.
    pub fn on_frame(&mut self) -> bool {
        if !self.repainting {
            return false;
        }
        self.displayed_ms = self.elapsed_ms();
        true
    }

    pub fn displayed_ms(&self) -> f64 {
        self.displayed_ms
    }

    /// Display string in `mm:ss.cc` form.
    pub fn formatted_time(&self) -> String {
        format_elapsed(self.displayed_ms)
    }
}

/// Formats milliseconds as `mm:ss.cc`. Minutes keep counting past 59.
pub fn format_elapsed(ms: f64) -> String {
    let ms = if ms.is_finite() { ms.max(0.0) as u64 } else { 0 };
    let total_seconds = ms / 1000;
    let minutes = total_seconds / 60;
    let seconds = total_seconds % 60;
    let centiseconds = (ms % 1000) / 10;
    format!("{minutes:02}:{seconds:02}.{centiseconds:02}")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn timer() -> (ManualTime, SessionTimer<ManualTime>) {
        let time = ManualTime::default();
        (time.clone(), SessionTimer::with_source(time))
    }

    #[test]
    fn formats_minutes_seconds_and_centiseconds() {
        assert_eq!(format_elapsed(0.0), "00:00.00");
        assert_eq!(format_elapsed(1_234.0), "00:01.23");
        assert_eq!(format_elapsed(61_009.0), "01:01.00");
        assert_eq!(format_elapsed(59_999.9), "00:59.99");
        assert_eq!(format_elapsed(6_000_000.0), "100:00.00");
        assert_eq!(format_elapsed(-5.0), "00:00.00");
    }

    #[test]
    fn accumulates_across_segments() {
        let (time, mut timer) = timer();
        timer.start();
        time.advance(1_500.0);
        timer.stop();

        time.advance(10_000.0);
        timer.start();
        time.advance(500.0);
        assert!((timer.elapsed_ms() - 2_000.0).abs() < 1e-9);
        timer.stop();
        assert_eq!(timer.formatted_time(), "00:02.00");
    }

    #[test]
    fn repeated_start_and_stop_are_idempotent() {
        let (time, mut timer) = timer();
        timer.start();
        time.advance(1_000.0);
        timer.start();
        time.advance(500.0);
        timer.stop();
        time.advance(700.0);
        timer.stop();

        assert!(!timer.is_running());
        assert!((timer.elapsed_ms() - 1_500.0).abs() < 1e-9);
    }

    #[test]
    fn repaint_updates_display_only_while_running() {
        let (time, mut timer) = timer();
        assert!(!timer.on_frame());

        timer.start();
        time.advance(250.0);
        assert_eq!(timer.formatted_time(), "00:00.00");
        assert!(timer.on_frame());
        assert_eq!(timer.formatted_time(), "00:00.25");

        timer.stop();
        time.advance(1_000.0);
        assert!(!timer.on_frame());
        assert_eq!(timer.formatted_time(), "00:00.25");
    }

    #[test]
    fn reset_always_clears() {
        let (time, mut timer) = timer();
        timer.start();
        time.advance(3_000.0);
        timer.on_frame();
        timer.reset();

        assert_eq!(timer.formatted_time(), "00:00.00");
        assert!(!timer.is_running());
        assert!(!timer.on_frame());
        assert_eq!(timer.elapsed_ms(), 0.0);
    }
}
