use std::{fs, path::Path, time::Duration};

use serde::{Deserialize, Serialize};

use crate::{
    timeline::{DEFAULT_BEATS_PER_MEASURE, DEFAULT_LOOK_AHEAD, DEFAULT_START_LEAD, MAX_LOOK_AHEAD},
    ticker::DEFAULT_TICK_INTERVAL,
    Instrument, MetronomeError, Result, Tempo,
};

/// Top-level configuration structure for the application.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub metronome: MetronomeConfig,
    pub audio: AudioConfig,
}

impl AppConfig {
    /// Reads and validates a JSON configuration file.
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    pub fn from_json_str(text: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> Result<()> {
        self.metronome.validate()?;
        self.audio.validate()
    }
}

/// Scheduling behaviour of the metronome.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetronomeConfig {
    pub tempo: Tempo,
    pub beats_per_measure: u32,
    pub instrument: Instrument,
    pub look_ahead_secs: f64,
    pub start_lead_secs: f64,
    pub tick_interval_ms: u64,
}

impl Default for MetronomeConfig {
    fn default() -> Self {
        Self {
            tempo: Tempo::default(),
            beats_per_measure: DEFAULT_BEATS_PER_MEASURE as u32,
            instrument: Instrument::default(),
            look_ahead_secs: DEFAULT_LOOK_AHEAD,
            start_lead_secs: DEFAULT_START_LEAD,
            tick_interval_ms: DEFAULT_TICK_INTERVAL.as_millis() as u64,
        }
    }
}

impl MetronomeConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    pub fn validate(&self) -> Result<()> {
        if self.beats_per_measure == 0 {
            return Err(MetronomeError::InvalidConfig(
                "beats_per_measure must be at least 1".into(),
            ));
        }
        if !(self.look_ahead_secs > 0.0 && self.look_ahead_secs <= MAX_LOOK_AHEAD) {
            return Err(MetronomeError::InvalidConfig(format!(
                "look_ahead_secs must be in (0, {MAX_LOOK_AHEAD}]"
            )));
        }
        if !(self.start_lead_secs >= 0.0 && self.start_lead_secs <= MAX_LOOK_AHEAD) {
            return Err(MetronomeError::InvalidConfig(format!(
                "start_lead_secs must be in [0, {MAX_LOOK_AHEAD}]"
            )));
        }
        if self.tick_interval_ms == 0 {
            return Err(MetronomeError::InvalidConfig(
                "tick_interval_ms must be positive".into(),
            ));
        }
        Ok(())
    }
}

/// Configuration specific to the audio subsystem.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    pub sample_rate: u32,
    /// Frames rendered per block by the software engine.
    pub block_size: usize,
    pub voice_queue_capacity: usize,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: 48_000,
            block_size: 256,
            voice_queue_capacity: 64,
        }
    }
}

impl AudioConfig {
    pub fn validate(&self) -> Result<()> {
        if self.sample_rate == 0 || self.block_size == 0 || self.voice_queue_capacity == 0 {
            return Err(MetronomeError::InvalidConfig(
                "sample_rate, block_size and voice_queue_capacity must be positive".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_yields_defaults() {
        let config = AppConfig::from_json_str("{}").unwrap();
        assert_eq!(config.metronome.tempo.bpm(), 120);
        assert_eq!(config.metronome.beats_per_measure, 4);
        assert_eq!(config.metronome.instrument, Instrument::Digital);
        assert_eq!(config.metronome.tick_interval(), Duration::from_millis(25));
        assert_eq!(config.audio.sample_rate, 48_000);
    }

    #[test]
    fn partial_documents_merge_with_defaults() {
        let config = AppConfig::from_json_str(
            r#"{ "metronome": { "tempo": 5, "instrument": "drum" } }"#,
        )
        .unwrap();
        assert_eq!(config.metronome.tempo.bpm(), 40);
        assert_eq!(config.metronome.instrument, Instrument::Drum);
        assert!((config.metronome.look_ahead_secs - 0.1).abs() < 1e-12);

        let config = AppConfig::from_json_str(r#"{ "metronome": { "tempo": 96.0 } }"#).unwrap();
        assert_eq!(config.metronome.tempo.bpm(), 96);
    }

    #[test]
    fn rejects_invalid_values() {
        let err = AppConfig::from_json_str(r#"{ "metronome": { "beats_per_measure": 0 } }"#)
            .unwrap_err();
        assert!(matches!(err, MetronomeError::InvalidConfig(_)));

        let err = AppConfig::from_json_str(r#"{ "metronome": { "look_ahead_secs": 1e300 } }"#)
            .unwrap_err();
        assert!(matches!(err, MetronomeError::InvalidConfig(_)));

        let err = AppConfig::from_json_str(r#"{ "audio": { "block_size": 0 } }"#).unwrap_err();
        assert!(matches!(err, MetronomeError::InvalidConfig(_)));

        let err = AppConfig::from_json_str("not json").unwrap_err();
        assert!(matches!(err, MetronomeError::Json(_)));
    }

    #[test]
    fn serialises_round_trip_through_json() {
        let json = AppConfig::default().to_json_pretty().unwrap();
        assert!(json.contains("\"instrument\": \"digital\""));
        assert!(AppConfig::from_json_str(&json).is_ok());
    }
}
