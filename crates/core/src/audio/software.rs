use std::{
    sync::{Arc, Mutex},
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};

use rtrb::{Consumer, Producer, RingBuffer};

use crate::{
    AudioClock, AudioConfig, AudioEngine, ClickVoice, EngineState, FrameClock, MetronomeError,
    Result, VoiceMixer,
};

use super::StateCell;

/// Headless renderer paced by the system clock.
///
/// A dedicated thread renders `block_size` frames at a time and advances the
/// frame clock at the configured sample rate. Voices reach it through a
/// lock-free ring buffer. Useful when no output device is wanted or available
/// and as the reference for the device-backed engine.
pub struct SoftwareEngine {
    clock: FrameClock,
    state: Arc<StateCell>,
    voices: Mutex<Producer<ClickVoice>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl SoftwareEngine {
    /// Spawns the render thread. The engine starts suspended.
    pub fn spawn(config: &AudioConfig) -> Result<Self> {
        let clock = FrameClock::new(config.sample_rate);
        let state = Arc::new(StateCell::new(EngineState::Suspended));
        let (producer, consumer) = RingBuffer::<ClickVoice>::new(config.voice_queue_capacity);

        let worker = {
            let clock = clock.clone();
            let state = Arc::clone(&state);
            let block_size = config.block_size.max(1);
            thread::Builder::new()
                .name("rhythmflow-render".into())
                .spawn(move || render_loop(clock, state, consumer, block_size))?
        };

        tracing::debug!(
            sample_rate = config.sample_rate,
            block_size = config.block_size,
            "software engine spawned"
        );

        Ok(Self {
            clock,
            state,
            voices: Mutex::new(producer),
            worker: Mutex::new(Some(worker)),
        })
    }

    pub fn clock(&self) -> &FrameClock {
        &self.clock
    }

    fn wake_worker(&self) {
        if let Ok(worker) = self.worker.lock() {
            if let Some(handle) = worker.as_ref() {
                handle.thread().unpark();
            }
        }
    }
}

fn render_loop(
    clock: FrameClock,
    state: Arc<StateCell>,
    mut voices: Consumer<ClickVoice>,
    block_size: usize,
) {
    let mut mixer = VoiceMixer::new(clock.sample_rate());
    let mut block = vec![0.0_f32; block_size];
    let block_duration = Duration::from_secs_f64(block_size as f64 / clock.sample_rate() as f64);
    let mut deadline = Instant::now();

    loop {
        match state.load() {
            EngineState::Closed => break,
            EngineState::Suspended => {
                thread::park_timeout(block_duration);
                deadline = Instant::now();
                continue;
            }
            EngineState::Running => {}
        }

        while let Ok(voice) = voices.pop() {
            mixer.add(voice);
        }
        mixer.render(clock.frames(), &mut block);
        clock.advance(block_size as u64);

        deadline += block_duration;
        let now = Instant::now();
        if deadline > now {
            thread::sleep(deadline - now);
        } else {
            // Fell behind; keep the clock honest instead of bursting.
            deadline = now;
        }
    }

    tracing::debug!(frames = clock.frames(), "render thread finished");
}

impl AudioClock for SoftwareEngine {
    fn now(&self) -> f64 {
        self.clock.now()
    }
}

impl AudioEngine for SoftwareEngine {
    fn state(&self) -> EngineState {
        self.state.load()
    }

    fn resume(&self) -> Result<()> {
        self.state.transition(EngineState::Running)?;
        self.wake_worker();
        Ok(())
    }

    fn schedule(&self, voice: ClickVoice) -> Result<()> {
        if self.state.load() == EngineState::Closed {
            return Err(MetronomeError::EngineClosed);
        }

        self.voices
            .lock()
            .map_err(|_| MetronomeError::msg("voice queue has been poisoned"))?
            .push(voice)
            .map_err(|_| MetronomeError::QueueFull)
    }

    fn close(&self) -> Result<()> {
        self.state.store(EngineState::Closed);
        let handle = self
            .worker
            .lock()
            .map_err(|_| MetronomeError::msg("render worker has been poisoned"))?
            .take();

        if let Some(handle) = handle {
            handle.thread().unpark();
            handle
                .join()
                .map_err(|_| MetronomeError::msg("render thread panicked"))?;
        }
        Ok(())
    }
}

impl Drop for SoftwareEngine {
    fn drop(&mut self) {
        if let Err(err) = self.close() {
            tracing::warn!(%err, "failed to close software engine");
        }
    }
}

impl std::fmt::Debug for SoftwareEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SoftwareEngine")
            .field("clock", &self.clock)
            .field("state", &self.state.load())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Instrument;

    fn config() -> AudioConfig {
        AudioConfig {
            sample_rate: 8_000,
            block_size: 80,
            voice_queue_capacity: 2,
        }
    }

    #[test]
    fn clock_advances_only_while_running() {
        let engine = SoftwareEngine::spawn(&config()).unwrap();
        thread::sleep(Duration::from_millis(30));
        assert_eq!(engine.now(), 0.0);

        engine.resume().unwrap();
        thread::sleep(Duration::from_millis(60));
        assert!(engine.now() > 0.0);

        engine.close().unwrap();
        let frozen = engine.now();
        thread::sleep(Duration::from_millis(20));
        assert_eq!(engine.now(), frozen);
    }

    #[test]
    fn full_queue_is_reported() {
        let engine = SoftwareEngine::spawn(&config()).unwrap();
        let voice = ClickVoice::for_beat(Instrument::Digital, 10.0, true);

        engine.schedule(voice).unwrap();
        engine.schedule(voice).unwrap();
        assert!(matches!(engine.schedule(voice), Err(MetronomeError::QueueFull)));
    }

    #[test]
    fn closed_engine_rejects_voices() {
        let engine = SoftwareEngine::spawn(&config()).unwrap();
        engine.close().unwrap();
        engine.close().unwrap();

        let voice = ClickVoice::for_beat(Instrument::Drum, 0.0, true);
        assert!(matches!(engine.schedule(voice), Err(MetronomeError::EngineClosed)));
        assert_eq!(engine.state(), EngineState::Closed);
    }
}
