//! Core library for the RhythmFlow metronome.
//!
//! Clicks are scheduled a little ahead of time on the audio engine's own
//! clock, which keeps them periodic no matter how irregularly the scheduling
//! loop itself is woken. Each module owns one piece of that pipeline: the
//! tick source wakes the [`BeatScheduler`], the scheduler hands voices to an
//! [`AudioEngine`] and beat indices to the [`BeatNotifier`], and the
//! [`PlaybackController`] wires them together behind start/stop.

pub mod audio;
pub mod config;
pub mod error;
pub mod notify;
pub mod playback;
pub mod stopwatch;
pub mod synth;
pub mod tempo;
pub mod ticker;
pub mod timeline;
pub mod wake;

#[cfg(feature = "cpal")]
pub use audio::DeviceEngine;
pub use audio::{
    AudioClock, AudioEngine, EngineFactory, EngineState, FrameClock, OfflineEngine, SilentEngine,
    SoftwareEngine,
};
pub use config::{AppConfig, AudioConfig, MetronomeConfig};
pub use error::{MetronomeError, Result};
pub use notify::{BeatCallback, BeatNotifier};
pub use playback::{PlaybackController, PracticeSession};
pub use stopwatch::{format_elapsed, ManualTime, MonotonicTime, SessionTimer, TimeSource};
pub use synth::{play_click, ClickVoice, Instrument, Ramp, VoiceMixer};
pub use tempo::{Tempo, TempoInput, MAX_BPM, MIN_BPM};
pub use ticker::{IntervalTicker, ManualTickHandle, ManualTicker, TickFn, TickSource};
pub use timeline::{BeatScheduler, ScheduledBeat};
pub use wake::{NoWakeLock, WakeLock};
