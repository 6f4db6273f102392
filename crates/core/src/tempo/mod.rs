use std::fmt;

use serde::{Deserialize, Serialize};

/// Slowest tempo the scheduler accepts.
pub const MIN_BPM: u32 = 40;
/// Fastest tempo the scheduler accepts.
pub const MAX_BPM: u32 = 280;
pub const DEFAULT_BPM: u32 = 120;

/// Beats per minute, always within [`MIN_BPM`, `MAX_BPM`].
///
/// Deserialisation accepts any JSON number, rounds it and clamps instead of
/// failing, so a hand-edited config with `"tempo": 999` or `"tempo": 120.0`
/// still loads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "f64", into = "u32")]
pub struct Tempo(u32);

impl Tempo {
    /// Clamps any integer into the supported range.
    pub fn clamped(bpm: i64) -> Self {
        Self(bpm.clamp(MIN_BPM as i64, MAX_BPM as i64) as u32)
    }

    pub fn bpm(self) -> u32 {
        self.0
    }

    /// Interval between consecutive beats in audio-clock seconds.
    pub fn seconds_per_beat(self) -> f64 {
        60.0 / self.0 as f64
    }

    /// Returns the tempo moved by `delta` beats per minute, clamped.
    pub fn nudged(self, delta: i64) -> Self {
        Self::clamped(self.0 as i64 + delta)
    }
}

impl Default for Tempo {
    fn default() -> Self {
        Self(DEFAULT_BPM)
    }
}

impl From<i64> for Tempo {
    fn from(value: i64) -> Self {
        Self::clamped(value)
    }
}

impl From<f64> for Tempo {
    /// Rounds to the nearest whole BPM; NaN lands on the minimum.
    fn from(value: f64) -> Self {
        Self::clamped(value.round() as i64)
    }
}

impl From<Tempo> for u32 {
    fn from(value: Tempo) -> Self {
        value.0
    }
}

impl fmt::Display for Tempo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} BPM", self.0)
    }
}

/// Editing buffer in front of a committed [`Tempo`].
///
/// While the user types, the draft may hold anything (zero, negative, huge)
/// and nothing downstream sees it. Only [`TempoInput::commit`] and
/// [`TempoInput::nudge`] publish a value, and they always clamp.
#[derive(Debug, Clone)]
pub struct TempoInput {
    draft: i64,
    committed: Tempo,
}

impl TempoInput {
    pub fn new(initial: Tempo) -> Self {
        Self {
            draft: initial.bpm() as i64,
            committed: initial,
        }
    }

    /// Replaces the draft with the leading integer of `text`, or zero when the
    /// text does not start with a number.
    pub fn edit(&mut self, text: &str) {
        self.draft = parse_leading_int(text).unwrap_or(0);
    }

    pub fn draft(&self) -> i64 {
        self.draft
    }

    pub fn committed(&self) -> Tempo {
        self.committed
    }

    /// Normalises the draft (e.g. on focus loss) and returns the new tempo.
    pub fn commit(&mut self) -> Tempo {
        self.committed = Tempo::clamped(self.draft);
        self.draft = self.committed.bpm() as i64;
        self.committed
    }

    /// Step buttons: adjust the current draft and commit in one go.
    pub fn nudge(&mut self, delta: i64) -> Tempo {
        self.draft = self.draft.saturating_add(delta);
        self.commit()
    }
}

impl Default for TempoInput {
    fn default() -> Self {
        Self::new(Tempo::default())
    }
}

fn parse_leading_int(text: &str) -> Option<i64> {
    let trimmed = text.trim_start();
    let (negative, rest) = match trimmed.as_bytes().first() {
        Some(b'-') => (true, &trimmed[1..]),
        Some(b'+') => (false, &trimmed[1..]),
        _ => (false, trimmed),
    };

    let digits_len = rest.bytes().take_while(u8::is_ascii_digit).count();
    if digits_len == 0 {
        return None;
    }

    let digits = &rest[..digits_len];
    let magnitude = digits.parse::<i64>().unwrap_or(i64::MAX);
    Some(if negative { -magnitude } else { magnitude })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clamps_committed_values() {
        assert_eq!(Tempo::clamped(5).bpm(), 40);
        assert_eq!(Tempo::clamped(999).bpm(), 280);
        assert_eq!(Tempo::clamped(150).bpm(), 150);
        assert_eq!(Tempo::clamped(-12).bpm(), 40);
    }

    #[test]
    fn seconds_per_beat_follows_tempo() {
        for bpm in [40, 60, 97, 120, 280] {
            let tempo = Tempo::clamped(bpm);
            assert!((tempo.seconds_per_beat() - 60.0 / bpm as f64).abs() < 1e-12);
        }
    }

    #[test]
    fn drafts_are_tolerated_until_commit() {
        let mut input = TempoInput::new(Tempo::clamped(120));

        input.edit("");
        assert_eq!(input.draft(), 0);
        assert_eq!(input.committed().bpm(), 120);

        input.edit("9");
        assert_eq!(input.committed().bpm(), 120);
        assert_eq!(input.commit().bpm(), 40);
        assert_eq!(input.draft(), 40);
    }

    #[test]
    fn parses_like_a_form_field() {
        let mut input = TempoInput::default();
        input.edit("  150bpm");
        assert_eq!(input.commit().bpm(), 150);

        input.edit("abc");
        assert_eq!(input.commit().bpm(), 40);

        input.edit("99999999999999999999999");
        assert_eq!(input.commit().bpm(), 280);
    }

    #[test]
    fn nudges_stay_in_range() {
        let mut input = TempoInput::new(Tempo::clamped(279));
        assert_eq!(input.nudge(1).bpm(), 280);
        assert_eq!(input.nudge(1).bpm(), 280);

        let mut input = TempoInput::new(Tempo::clamped(40));
        assert_eq!(input.nudge(-1).bpm(), 40);
        assert_eq!(Tempo::clamped(100).nudged(-5).bpm(), 95);
    }

    #[test]
    fn deserialises_with_clamping() {
        let tempo: Tempo = serde_json::from_str("999").unwrap();
        assert_eq!(tempo.bpm(), 280);
        let tempo: Tempo = serde_json::from_str("120.0").unwrap();
        assert_eq!(tempo.bpm(), 120);
        let tempo: Tempo = serde_json::from_str("132.6").unwrap();
        assert_eq!(tempo.bpm(), 133);
        let tempo: Tempo = serde_json::from_str("-1e9").unwrap();
        assert_eq!(tempo.bpm(), 40);
        assert_eq!(serde_json::to_string(&Tempo::clamped(90)).unwrap(), "90");
    }
}
