use std::{
    sync::{mpsc, Arc, Mutex},
    thread::{self, JoinHandle},
};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use rtrb::{Consumer, Producer, RingBuffer};

use crate::{
    synth::RENDER_CHUNK_FRAMES, AudioClock, AudioConfig, AudioEngine, ClickVoice, EngineState,
    FrameClock, MetronomeError, Result, VoiceMixer,
};

use super::StateCell;

enum StreamCommand {
    Play,
    Pause,
    Close,
}

/// Engine rendering clicks to the default output device through `cpal`.
///
/// `cpal::Stream` is not `Send` on every platform, so the stream is built and
/// owned by a dedicated thread that obeys [`StreamCommand`]s. The frame clock
/// advances inside the output callback, in step with the hardware.
pub struct DeviceEngine {
    clock: FrameClock,
    state: Arc<StateCell>,
    voices: Mutex<Producer<ClickVoice>>,
    commands: Mutex<mpsc::Sender<StreamCommand>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl DeviceEngine {
    /// Opens the default output device. The stream starts paused.
    pub fn open(config: &AudioConfig) -> Result<Self> {
        let (producer, consumer) = RingBuffer::<ClickVoice>::new(config.voice_queue_capacity);
        let (command_tx, command_rx) = mpsc::channel();
        let (ready_tx, ready_rx) = mpsc::channel::<Result<FrameClock>>();

        let worker = thread::Builder::new()
            .name("rhythmflow-device".into())
            .spawn(move || {
                let (stream, clock) = match build_stream(consumer) {
                    Ok(built) => built,
                    Err(err) => {
                        let _ = ready_tx.send(Err(err));
                        return;
                    }
                };
                let _ = ready_tx.send(Ok(clock));

                while let Ok(command) = command_rx.recv() {
                    let outcome = match command {
                        StreamCommand::Play => stream.play().map_err(|err| err.to_string()),
                        StreamCommand::Pause => stream.pause().map_err(|err| err.to_string()),
                        StreamCommand::Close => break,
                    };
                    if let Err(err) = outcome {
                        tracing::warn!(%err, "output stream command failed");
                    }
                }
            })?;

        let clock = ready_rx
            .recv()
            .map_err(|_| MetronomeError::EngineUnavailable("device thread exited".into()))??;

        tracing::info!(sample_rate = clock.sample_rate(), "output device opened");

        Ok(Self {
            clock,
            state: Arc::new(StateCell::new(EngineState::Suspended)),
            voices: Mutex::new(producer),
            commands: Mutex::new(command_tx),
            worker: Mutex::new(Some(worker)),
        })
    }

    fn send(&self, command: StreamCommand) -> Result<()> {
        self.commands
            .lock()
            .map_err(|_| MetronomeError::msg("device command channel has been poisoned"))?
            .send(command)
            .map_err(|_| MetronomeError::EngineClosed)
    }
}

fn build_stream(mut voices: Consumer<ClickVoice>) -> Result<(cpal::Stream, FrameClock)> {
    let host = cpal::default_host();
    let device = host
        .default_output_device()
        .ok_or_else(|| MetronomeError::EngineUnavailable("no default output device".into()))?;

    let supported = device
        .default_output_config()
        .map_err(|err| MetronomeError::EngineUnavailable(err.to_string()))?;
    if supported.sample_format() != cpal::SampleFormat::F32 {
        return Err(MetronomeError::EngineUnavailable(format!(
            "unsupported sample format {:?}",
            supported.sample_format()
        )));
    }

    let config: cpal::StreamConfig = supported.into();
    let channels = (config.channels as usize).max(1);
    let clock = FrameClock::new(config.sample_rate.0);
    let render_clock = clock.clone();
    let mut mixer = VoiceMixer::new(config.sample_rate.0);
    let mut scratch = [0.0_f32; RENDER_CHUNK_FRAMES];

    let stream = device
        .build_output_stream(
            &config,
            move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                while let Ok(voice) = voices.pop() {
                    mixer.add(voice);
                }

                let frames =
                    mixer.render_interleaved(render_clock.frames(), &mut scratch, data, channels);
                render_clock.advance(frames);
            },
            |err| tracing::warn!(%err, "output stream error"),
            None,
        )
        .map_err(|err| MetronomeError::EngineUnavailable(err.to_string()))?;

    if let Err(err) = stream.pause() {
        tracing::debug!(%err, "backend cannot pause a fresh stream");
    }

    Ok((stream, clock))
}

impl AudioClock for DeviceEngine {
    fn now(&self) -> f64 {
        self.clock.now()
    }
}

impl AudioEngine for DeviceEngine {
    fn state(&self) -> EngineState {
        self.state.load()
    }

    fn resume(&self) -> Result<()> {
        self.state.transition(EngineState::Running)?;
        self.send(StreamCommand::Play)
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
        if self.state.load() == EngineState::Closed {
            return Ok(());
        }
        self.state.store(EngineState::Closed);
        let _ = self.send(StreamCommand::Pause);
        let _ = self.send(StreamCommand::Close);

        let handle = self
            .worker
            .lock()
            .map_err(|_| MetronomeError::msg("device worker has been poisoned"))?
            .take();
        if let Some(handle) = handle {
            handle
                .join()
                .map_err(|_| MetronomeError::msg("device thread panicked"))?;
        }
        Ok(())
    }
}

impl Drop for DeviceEngine {
    fn drop(&mut self) {
        if let Err(err) = self.close() {
            tracing::warn!(%err, "failed to close output device");
        }
    }
}

impl std::fmt::Debug for DeviceEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceEngine")
            .field("clock", &self.clock)
            .field("state", &self.state.load())
            .finish()
    }
}
