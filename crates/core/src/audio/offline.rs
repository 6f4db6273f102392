use std::sync::{Mutex, MutexGuard};

use crate::{
    AudioClock, AudioEngine, ClickVoice, EngineState, FrameClock, MetronomeError, Result,
    VoiceMixer,
};

use super::StateCell;

/// Engine whose clock only moves when the caller advances it.
///
/// Used for deterministic previews of a beat timeline and by tests. Every
/// accepted voice is kept in a log and rendered as the clock advances.
#[derive(Debug)]
pub struct OfflineEngine {
    clock: FrameClock,
    state: StateCell,
    mixer: Mutex<VoiceMixer>,
    scheduled: Mutex<Vec<ClickVoice>>,
    resume_allowed: bool,
}

impl OfflineEngine {
    /// Creates a suspended engine at `sample_rate`.
    pub fn new(sample_rate: u32) -> Self {
        Self {
            clock: FrameClock::new(sample_rate),
            state: StateCell::new(EngineState::Suspended),
            mixer: Mutex::new(VoiceMixer::new(sample_rate)),
            scheduled: Mutex::new(Vec::new()),
            resume_allowed: true,
        }
    }

    /// Creates an engine that refuses to resume, like a host waiting for a
    /// user gesture.
    pub fn locked(sample_rate: u32) -> Self {
        Self {
            resume_allowed: false,
            ..Self::new(sample_rate)
        }
    }

    pub fn clock(&self) -> &FrameClock {
        &self.clock
    }

    /// Renders up to `seconds` on the audio clock and returns the samples.
    ///
    /// Nothing happens while the engine is not running, and the clock never
    /// moves backwards.
    pub fn advance_to(&self, seconds: f64) -> Result<Vec<f32>> {
        if self.state.load() != EngineState::Running {
            return Ok(Vec::new());
        }

        let start = self.clock.frames();
        let target = self.clock.frame_at(seconds);
        if target <= start {
            return Ok(Vec::new());
        }

        let mut block = vec![0.0; (target - start) as usize];
        self.lock_mixer()?.render(start, &mut block);
        self.clock.advance(target - start);
        Ok(block)
    }

    /// Renders `seconds` more audio.
    pub fn advance(&self, seconds: f64) -> Result<Vec<f32>> {
        self.advance_to(self.now() + seconds)
    }

    /// Every voice accepted so far, in scheduling order.
    pub fn scheduled(&self) -> Vec<ClickVoice> {
        self.scheduled
            .lock()
            .map(|log| log.clone())
            .unwrap_or_else(|poisoned| poisoned.into_inner().clone())
    }

    fn lock_mixer(&self) -> Result<MutexGuard<'_, VoiceMixer>> {
        self.mixer
            .lock()
            .map_err(|_| MetronomeError::msg("offline mixer has been poisoned"))
    }
}

impl AudioClock for OfflineEngine {
    fn now(&self) -> f64 {
        self.clock.now()
    }
}

impl AudioEngine for OfflineEngine {
    fn state(&self) -> EngineState {
        self.state.load()
    }

    fn resume(&self) -> Result<()> {
        if !self.resume_allowed {
            return Err(MetronomeError::EngineSuspended);
        }
        self.state.transition(EngineState::Running)
    }

    fn schedule(&self, voice: ClickVoice) -> Result<()> {
        if self.state.load() == EngineState::Closed {
            return Err(MetronomeError::EngineClosed);
        }

        self.lock_mixer()?.add(voice);
        self.scheduled
            .lock()
            .map_err(|_| MetronomeError::msg("voice log has been poisoned"))?
            .push(voice);
        Ok(())
    }

    fn close(&self) -> Result<()> {
        self.state.store(EngineState::Closed);
        Ok(())
    }
}
