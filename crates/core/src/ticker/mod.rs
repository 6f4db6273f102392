//! Coarse tick sources that drive the look-ahead loop.
//!
//! A tick carries no payload and no timing guarantee. The scheduler tolerates
//! missed or late ticks by catching up, so tick sources only need to fire
//! often enough that the look-ahead window never runs dry.

use std::{
    sync::{
        mpsc::{self, RecvTimeoutError},
        Arc, Mutex, PoisonError,
    },
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};

use crate::Result;

pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_millis(25);

/// Callback run on every tick.
pub type TickFn = Box<dyn FnMut() + Send + 'static>;

pub trait TickSource: Send {
    /// Begins firing `on_tick`. Starting a running source restarts it with
    /// the new callback.
    fn start(&mut self, on_tick: TickFn) -> Result<()>;

    /// Stops firing. Idempotent; once it returns no further tick runs.
    fn stop(&mut self);

    fn is_running(&self) -> bool;
}

struct Running {
    stop: mpsc::Sender<()>,
    handle: JoinHandle<()>,
}

/// Fires from a dedicated thread, independent of whatever the caller's
/// thread is busy with.
pub struct IntervalTicker {
    interval: Duration,
    running: Option<Running>,
}

impl IntervalTicker {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval: interval.max(Duration::from_millis(1)),
            running: None,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }
}

impl Default for IntervalTicker {
    fn default() -> Self {
        Self::new(DEFAULT_TICK_INTERVAL)
    }
}

impl TickSource for IntervalTicker {
    fn start(&mut self, mut on_tick: TickFn) -> Result<()> {
        self.stop();

        let interval = self.interval;
        let (stop, stopped) = mpsc::channel::<()>();
        let handle = thread::Builder::new()
            .name("rhythmflow-tick".into())
            .spawn(move || {
                let mut next = Instant::now() + interval;
                loop {
                    let wait = next.saturating_duration_since(Instant::now());
                    match stopped.recv_timeout(wait) {
                        Err(RecvTimeoutError::Timeout) => {}
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    }

                    on_tick();

                    next += interval;
                    let now = Instant::now();
                    if next < now {
                        // Starved; resume the cadence from here.
                        next = now + interval;
                    }
                }
            })?;

        tracing::debug!(interval_ms = interval.as_millis() as u64, "tick source started");
        self.running = Some(Running { stop, handle });
        Ok(())
    }

    fn stop(&mut self) {
        let Some(running) = self.running.take() else {
            return;
        };

        let _ = running.stop.send(());
        if running.handle.thread().id() == thread::current().id() {
            return;
        }
        if running.handle.join().is_err() {
            tracing::warn!("tick thread panicked");
        }
        tracing::debug!("tick source stopped");
    }

    fn is_running(&self) -> bool {
        self.running.is_some()
    }
}

impl Drop for IntervalTicker {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for IntervalTicker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IntervalTicker")
            .field("interval", &self.interval)
            .field("running", &self.is_running())
            .finish()
    }
}

/// Tick source fired explicitly through a [`ManualTickHandle`].
///
/// Lets offline previews advance an engine clock and tick in lockstep.
#[derive(Default)]
pub struct ManualTicker {
    slot: Arc<Mutex<Option<TickFn>>>,
}

impl ManualTicker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn handle(&self) -> ManualTickHandle {
        ManualTickHandle {
            slot: Arc::clone(&self.slot),
        }
    }
}

impl TickSource for ManualTicker {
    fn start(&mut self, on_tick: TickFn) -> Result<()> {
        *self.slot.lock().unwrap_or_else(PoisonError::into_inner) = Some(on_tick);
        Ok(())
    }

    fn stop(&mut self) {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner).take();
    }

    fn is_running(&self) -> bool {
        self.slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }
}

#[derive(Clone)]
pub struct ManualTickHandle {
    slot: Arc<Mutex<Option<TickFn>>>,
}

impl ManualTickHandle {
    /// Runs one tick. Returns `false` when the source is stopped.
    pub fn fire(&self) -> bool {
        let mut slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
        match slot.as_mut() {
            Some(on_tick) => {
                on_tick();
                true
            }
            None => false,
        }
    }
}
