//! Audio clocks and sound-rendering engines.
//!
//! Every scheduling decision is expressed in [`AudioClock`] seconds. The clock
//! of a rendering engine only moves when frames are actually rendered, so it
//! tracks what is heard rather than wall-clock time.

use std::{
    sync::{
        atomic::{AtomicU64, AtomicU8, Ordering},
        Arc,
    },
    time::Instant,
};

use crate::{ClickVoice, MetronomeError, Result};

#[cfg(feature = "cpal")]
mod device;
mod offline;
mod software;

#[cfg(feature = "cpal")]
pub use device::DeviceEngine;
pub use offline::OfflineEngine;
pub use software::SoftwareEngine;

/// Monotonic time reference in seconds.
pub trait AudioClock: Send + Sync {
    fn now(&self) -> f64;
}

/// Lifecycle of a rendering engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    /// Created but not producing output; the clock does not advance.
    Suspended,
    Running,
    Closed,
}

/// A sound-rendering engine that owns an audio clock.
pub trait AudioEngine: AudioClock {
    fn state(&self) -> EngineState;

    /// Starts (or restarts) output. May fail when the host withholds audio.
    fn resume(&self) -> Result<()>;

    /// Queues a voice for rendering at its start time. Never blocks.
    fn schedule(&self, voice: ClickVoice) -> Result<()>;

    /// Releases the engine. Further calls to `schedule` fail.
    fn close(&self) -> Result<()>;
}

/// Lazily invoked constructor for the engine owned by the playback controller.
pub type EngineFactory = Box<dyn Fn() -> Result<Arc<dyn AudioEngine>> + Send + Sync>;

/// Audio clock derived from the number of frames rendered so far.
#[derive(Debug, Clone)]
pub struct FrameClock {
    frames: Arc<AtomicU64>,
    sample_rate: u32,
}

impl FrameClock {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            frames: Arc::new(AtomicU64::new(0)),
            sample_rate: sample_rate.max(1),
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn frames(&self) -> u64 {
        self.frames.load(Ordering::Acquire)
    }

    /// Called by the renderer once a block has been produced.
    pub fn advance(&self, frames: u64) {
        self.frames.fetch_add(frames, Ordering::AcqRel);
    }

    /// Frame index corresponding to `seconds` on this clock.
    pub fn frame_at(&self, seconds: f64) -> u64 {
        (seconds.max(0.0) * self.sample_rate as f64).round() as u64
    }
}

impl AudioClock for FrameClock {
    fn now(&self) -> f64 {
        self.frames() as f64 / self.sample_rate as f64
    }
}

/// Engine state shared between the control side and a render thread.
#[derive(Debug)]
pub(crate) struct StateCell(AtomicU8);

impl StateCell {
    pub(crate) fn new(state: EngineState) -> Self {
        Self(AtomicU8::new(Self::encode(state)))
    }

    pub(crate) fn load(&self) -> EngineState {
        match self.0.load(Ordering::Acquire) {
            0 => EngineState::Suspended,
            1 => EngineState::Running,
            _ => EngineState::Closed,
        }
    }

    pub(crate) fn store(&self, state: EngineState) {
        self.0.store(Self::encode(state), Ordering::Release);
    }

    /// Moves to `state` unless the engine is already closed.
    pub(crate) fn transition(&self, state: EngineState) -> Result<()> {
        let closed = Self::encode(EngineState::Closed);
        self.0
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                (current != closed).then_some(Self::encode(state))
            })
            .map(|_| ())
            .map_err(|_| MetronomeError::EngineClosed)
    }

    fn encode(state: EngineState) -> u8 {
        match state {
            EngineState::Suspended => 0,
            EngineState::Running => 1,
            EngineState::Closed => 2,
        }
    }
}

/// Stand-in used when no rendering engine can be created.
///
/// Time comes from the monotonic system clock and every voice is rejected,
/// which keeps beat notifications flowing without audible output.
#[derive(Debug)]
pub struct SilentEngine {
    origin: Instant,
    reason: String,
}

impl SilentEngine {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            origin: Instant::now(),
            reason: reason.into(),
        }
    }
}

impl AudioClock for SilentEngine {
    fn now(&self) -> f64 {
        self.origin.elapsed().as_secs_f64()
    }
}

impl AudioEngine for SilentEngine {
    fn state(&self) -> EngineState {
        EngineState::Running
    }

    fn resume(&self) -> Result<()> {
        Ok(())
    }

    fn schedule(&self, _voice: ClickVoice) -> Result<()> {
        Err(MetronomeError::EngineUnavailable(self.reason.clone()))
    }

    fn close(&self) -> Result<()> {
        Ok(())
    }
}
