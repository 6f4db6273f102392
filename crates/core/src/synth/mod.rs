//! Click synthesis policy.
//!
//! Each beat becomes one [`ClickVoice`]: a single oscillator with exponential
//! pitch and gain ramps, pinned to an audio-clock timestamp. The engine that
//! receives the voice is responsible for rendering it at that exact time.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::{AudioEngine, MetronomeError};

mod mixer;

pub use mixer::{VoiceMixer, RENDER_CHUNK_FRAMES};

/// Gain every click starts at before decaying.
const PEAK_GAIN: f32 = 1.5;

/// Closed set of click sounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Instrument {
    #[default]
    Digital,
    Woodblock,
    Drum,
}

impl Instrument {
    pub const ALL: [Instrument; 3] = [Instrument::Digital, Instrument::Woodblock, Instrument::Drum];

    pub fn name(self) -> &'static str {
        match self {
            Instrument::Digital => "digital",
            Instrument::Woodblock => "woodblock",
            Instrument::Drum => "drum",
        }
    }

    pub(crate) fn to_bits(self) -> u8 {
        match self {
            Instrument::Digital => 0,
            Instrument::Woodblock => 1,
            Instrument::Drum => 2,
        }
    }

    pub(crate) fn from_bits(bits: u8) -> Self {
        match bits {
            1 => Instrument::Woodblock,
            2 => Instrument::Drum,
            _ => Instrument::Digital,
        }
    }
}

impl fmt::Display for Instrument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Instrument {
    type Err = MetronomeError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Instrument::ALL
            .into_iter()
            .find(|instrument| instrument.name().eq_ignore_ascii_case(value.trim()))
            .ok_or_else(|| {
                MetronomeError::msg(format!(
                    "unknown instrument `{value}` (expected digital, woodblock or drum)"
                ))
            })
    }
}

/// Exponential ramp between two strictly positive values.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ramp {
    pub from: f32,
    pub to: f32,
}

impl Ramp {
    pub const fn hold(value: f32) -> Self {
        Self {
            from: value,
            to: value,
        }
    }

    pub const fn exponential(from: f32, to: f32) -> Self {
        Self { from, to }
    }

    /// Value at `progress` in [0, 1] along the ramp.
    pub fn value_at(&self, progress: f64) -> f32 {
        if self.from == self.to || self.from <= 0.0 || self.to <= 0.0 {
            return self.from;
        }

        let progress = progress.clamp(0.0, 1.0) as f32;
        self.from * (self.to / self.from).powf(progress)
    }
}

/// One enveloped tone scheduled on the audio clock.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClickVoice {
    /// Audio-clock time at which the tone starts, in seconds.
    pub start: f64,
    pub duration: f64,
    pub frequency: Ramp,
    pub gain: Ramp,
}

impl ClickVoice {
    /// Builds the voice for one beat. Accent beats get the higher pitch.
    pub fn for_beat(instrument: Instrument, time: f64, accent: bool) -> Self {
        match instrument {
            Instrument::Digital => Self {
                start: time,
                duration: 0.05,
                frequency: Ramp::hold(if accent { 1000.0 } else { 800.0 }),
                gain: Ramp::exponential(PEAK_GAIN, 0.001),
            },
            Instrument::Woodblock => Self {
                start: time,
                duration: 0.1,
                frequency: Ramp::hold(if accent { 1200.0 } else { 800.0 }),
                gain: Ramp::exponential(PEAK_GAIN, 0.01),
            },
            Instrument::Drum => Self {
                start: time,
                duration: 0.5,
                frequency: Ramp::exponential(if accent { 150.0 } else { 100.0 }, 0.01),
                gain: Ramp::exponential(PEAK_GAIN, 0.01),
            },
        }
    }

    pub fn end(&self) -> f64 {
        self.start + self.duration
    }

    /// Pitch at the onset of the click.
    pub fn pitch(&self) -> f32 {
        self.frequency.from
    }
}

/// Schedules the click for one beat on `engine`.
///
/// Failures are logged and swallowed so a missing click never stops playback.
/// Returns whether the engine accepted the voice.
pub fn play_click<E>(engine: &E, instrument: Instrument, time: f64, accent: bool) -> bool
where
    E: AudioEngine + ?Sized,
{
    let voice = ClickVoice::for_beat(instrument, time, accent);
    match engine.schedule(voice) {
        Ok(()) => true,
        Err(err) => {
            tracing::warn!(%err, %instrument, time, accent, "failed to schedule click");
            false
        }
    }
}
