//! Look-ahead beat scheduling.
//!
//! The scheduler owns the position of the next unscheduled beat on the audio
//! clock. Every tick it schedules all beats that fall inside the look-ahead
//! horizon, so late or dropped ticks cost latency headroom but never beats.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{AudioClock, MetronomeConfig, Tempo};

/// How far ahead of the audio clock beats are scheduled, in seconds.
pub const DEFAULT_LOOK_AHEAD: f64 = 0.1;
/// Gap between `start` and the first beat, in seconds.
pub const DEFAULT_START_LEAD: f64 = 0.05;
/// Upper bound for both the look-ahead horizon and the start lead, in seconds.
///
/// Keeps the catch-up loop in `on_tick` bounded by the beats that are due.
pub const MAX_LOOK_AHEAD: f64 = 1.0;
pub const DEFAULT_BEATS_PER_MEASURE: usize = 4;

/// One beat handed to the synthesiser and the visual notifier.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScheduledBeat {
    /// Position in the measure, `0` being the accent.
    pub index: usize,
    /// Audio-clock time of the click, in seconds.
    pub time: f64,
    pub accent: bool,
    /// How long to wait before the beat should become visible.
    pub notify_delay: Duration,
}

#[derive(Debug, Clone)]
pub struct BeatScheduler {
    next_beat_time: f64,
    current_beat: usize,
    beats_per_measure: usize,
    look_ahead: f64,
    start_lead: f64,
}

impl BeatScheduler {
    pub fn new(beats_per_measure: usize) -> Self {
        Self::with_timing(beats_per_measure, DEFAULT_LOOK_AHEAD, DEFAULT_START_LEAD)
    }

    /// Out-of-range timings are clamped to `[0, MAX_LOOK_AHEAD]`; values that
    /// are not finite fall back to the defaults.
    pub fn with_timing(beats_per_measure: usize, look_ahead: f64, start_lead: f64) -> Self {
        Self {
            next_beat_time: 0.0,
            current_beat: 0,
            beats_per_measure: beats_per_measure.max(1),
            look_ahead: bounded(look_ahead, DEFAULT_LOOK_AHEAD),
            start_lead: bounded(start_lead, DEFAULT_START_LEAD),
        }
    }

    pub fn from_config(config: &MetronomeConfig) -> Self {
        Self::with_timing(
            config.beats_per_measure as usize,
            config.look_ahead_secs,
            config.start_lead_secs,
        )
    }

    /// Re-anchors the timeline: the next beat is an accent, `start_lead`
    /// seconds after `now`.
    pub fn reset(&mut self, now: f64) {
        self.current_beat = 0;
        self.next_beat_time = now + self.start_lead;
    }

    pub fn next_beat_time(&self) -> f64 {
        self.next_beat_time
    }

    pub fn current_beat(&self) -> usize {
        self.current_beat
    }

    pub fn beats_per_measure(&self) -> usize {
        self.beats_per_measure
    }

    pub fn look_ahead(&self) -> f64 {
        self.look_ahead
    }

    /// Schedules every beat inside the horizon and returns how many were
    /// dispatched.
    ///
    /// `dispatch` runs once per beat, in timeline order, before the scheduler
    /// moves on. `tempo` is read when advancing past each beat, so a change
    /// only affects beats that have not been dispatched yet.
    pub fn on_tick<C, T, F>(&mut self, clock: &C, mut tempo: T, mut dispatch: F) -> usize
    where
        C: AudioClock + ?Sized,
        T: FnMut() -> Tempo,
        F: FnMut(&ScheduledBeat),
    {
        let mut dispatched = 0;

        while self.next_beat_time < clock.now() + self.look_ahead {
            let index = self.current_beat;
            let beat = ScheduledBeat {
                index,
                time: self.next_beat_time,
                accent: index == 0,
                notify_delay: notify_delay(self.next_beat_time, clock.now()),
            };
            dispatch(&beat);

            self.advance(tempo());
            dispatched += 1;
        }

        if dispatched > 1 {
            tracing::debug!(dispatched, "caught up on several beats in one tick");
        }
        dispatched
    }

    fn advance(&mut self, tempo: Tempo) {
        self.next_beat_time += tempo.seconds_per_beat();
        self.current_beat = (self.current_beat + 1) % self.beats_per_measure;
    }
}

impl Default for BeatScheduler {
    fn default() -> Self {
        Self::new(DEFAULT_BEATS_PER_MEASURE)
    }
}

fn bounded(seconds: f64, fallback: f64) -> f64 {
    if seconds.is_finite() {
        seconds.clamp(0.0, MAX_LOOK_AHEAD)
    } else {
        fallback
    }
}

/// Wait before a beat at `beat_time` becomes visible; zero once it is due.
pub fn notify_delay(beat_time: f64, now: f64) -> Duration {
    let seconds = beat_time - now;
    if seconds > 0.0 {
        Duration::from_secs_f64(seconds)
    } else {
        Duration::ZERO
    }
}
