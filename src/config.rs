//! Transcription settings.
//!
//! A single flat struct covers the estimator thresholds, the segmenter's
//! gating and velocity curve, and the encoder's tempo/PPQN/channel. Missing
//! fields in a JSON file fall back to the defaults below.

use crate::analysis::EstimatorSettings;
use crate::error::{ConfigError, ValidationError};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Default tempo in beats per minute.
pub const DEFAULT_TEMPO: f64 = 130.0;

/// Default MIDI resolution in pulses per quarter note.
pub const DEFAULT_PPQN: u32 = 96;

/// Complete configuration for one transcription.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TranscriberConfig {
    /// Tempo in beats per minute, written to the set-tempo meta event.
    pub tempo: f64,

    /// Pulses (ticks) per quarter note.
    pub ppqn: u32,

    /// Upper tempo bound for live sessions.
    pub max_tempo: f64,

    /// MIDI channel (0-15) used for every note.
    pub channel: u8,

    /// Lowest accepted pitch in Hz.
    pub pitch_min: f64,

    /// Highest accepted pitch in Hz.
    pub pitch_max: f64,

    /// Notes per beat. Sets both the analysis chunk size and the minimum
    /// interval between distinguishable notes.
    pub resolution: u32,

    /// Sample rate in Hz of the audio handed to the core.
    pub sample_rate: u32,

    /// RMS below which a buffer counts as silence.
    pub threshold_rms: f64,

    /// Absolute amplitude used to trim attack/decay edges before correlating.
    pub threshold_amplitude: f64,

    /// Maximum number of samples analysed per chunk.
    pub min_sample: usize,

    /// Velocity for a zero-amplitude note.
    pub velocity_base: f64,

    /// Velocity added per unit of mean absolute amplitude.
    pub velocity_scale: f64,

    /// Map the running mean of pitches seen since the last accepted call
    /// instead of the instantaneous pitch.
    pub smoothing: bool,
}

impl Default for TranscriberConfig {
    fn default() -> Self {
        Self {
            tempo: DEFAULT_TEMPO,
            ppqn: DEFAULT_PPQN,
            max_tempo: 720.0,
            channel: 0,
            pitch_min: 20.0,
            pitch_max: 20_000.0,
            resolution: 32,
            sample_rate: 32_000,
            threshold_rms: 0.01,
            threshold_amplitude: 0.2,
            min_sample: 500,
            velocity_base: 40.0,
            velocity_scale: 200.0,
            smoothing: true,
        }
    }
}

impl TranscriberConfig {
    /// Checks every field against its valid range.
    ///
    /// # Errors
    ///
    /// Returns the first violated constraint as a `ValidationError`.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if !(self.tempo.is_finite() && self.tempo > 0.0) {
            return Err(ValidationError::InvalidTempo(self.tempo));
        }
        if !(self.max_tempo.is_finite() && self.max_tempo > 0.0) {
            return Err(ValidationError::InvalidConfig(format!(
                "max_tempo ({}) must be finite and positive",
                self.max_tempo
            )));
        }
        if self.ppqn == 0 || self.ppqn > 0x7FFF {
            return Err(ValidationError::InvalidPpqn(self.ppqn));
        }
        if self.channel > 15 {
            return Err(ValidationError::InvalidChannel(self.channel));
        }
        if !(self.pitch_min.is_finite() && self.pitch_max.is_finite())
            || self.pitch_min <= 0.0
            || self.pitch_min >= self.pitch_max
        {
            return Err(ValidationError::InvalidConfig(format!(
                "pitch range {}..{} Hz is empty or not positive",
                self.pitch_min, self.pitch_max
            )));
        }
        if self.resolution == 0 {
            return Err(ValidationError::InvalidConfig(
                "resolution must be at least 1".to_string(),
            ));
        }
        if self.sample_rate == 0 {
            return Err(ValidationError::InvalidConfig(
                "sample_rate must be positive".to_string(),
            ));
        }
        if self.min_sample < 3 {
            return Err(ValidationError::InvalidConfig(
                "min_sample must be at least 3".to_string(),
            ));
        }
        if self.threshold_rms < 0.0 || self.threshold_amplitude < 0.0 {
            return Err(ValidationError::InvalidConfig(
                "thresholds must not be negative".to_string(),
            ));
        }
        Ok(())
    }

    /// Minimum time in milliseconds between two accepted segmenter calls.
    pub fn min_interval_ms(&self) -> f64 {
        60_000.0 / (self.tempo * self.resolution as f64)
    }

    /// Length of one offline analysis chunk in samples at the configured
    /// sample rate.
    pub fn chunk_size(&self) -> usize {
        self.chunk_size_for(self.sample_rate)
    }

    /// Length of one offline analysis chunk in samples at `sample_rate`.
    ///
    /// One chunk spans a whole note divided by `resolution`.
    pub fn chunk_size_for(&self, sample_rate: u32) -> usize {
        let size = sample_rate as f64 * 240.0 / (self.tempo * self.resolution as f64);
        (size.round() as usize).max(1)
    }

    /// Estimator thresholds derived from this configuration.
    pub fn estimator_settings(&self) -> EstimatorSettings {
        EstimatorSettings {
            threshold_rms: self.threshold_rms,
            threshold_amplitude: self.threshold_amplitude,
        }
    }

    /// Loads and validates a configuration from a JSON file.
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be read, is not valid JSON, or fails
    /// validation.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let json = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = serde_json::from_str(&json)?;
        config.validate()?;
        Ok(config)
    }

    /// Writes this configuration to a pretty-printed JSON file.
    ///
    /// # Errors
    ///
    /// Returns error if serialization or file writing fails.
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = TranscriberConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.ppqn, 96);
        assert_eq!(config.resolution, 32);
    }

    #[test]
    fn test_derived_timings() {
        let config = TranscriberConfig {
            tempo: 80.0,
            resolution: 32,
            sample_rate: 32_000,
            ..Default::default()
        };
        // 32000 * 240 / (80 * 32)
        assert_eq!(config.chunk_size(), 3000);
        assert!((config.min_interval_ms() - 23.4375).abs() < 1e-9);
    }

    #[test]
    fn test_validation_rejects_bad_fields() {
        let bad_channel = TranscriberConfig {
            channel: 16,
            ..Default::default()
        };
        assert_eq!(bad_channel.validate(), Err(ValidationError::InvalidChannel(16)));

        let bad_ppqn = TranscriberConfig {
            ppqn: 0,
            ..Default::default()
        };
        assert_eq!(bad_ppqn.validate(), Err(ValidationError::InvalidPpqn(0)));

        let bad_range = TranscriberConfig {
            pitch_min: 500.0,
            pitch_max: 100.0,
            ..Default::default()
        };
        assert!(matches!(
            bad_range.validate(),
            Err(ValidationError::InvalidConfig(_))
        ));

        let bad_max_tempo = TranscriberConfig {
            max_tempo: f64::NAN,
            ..Default::default()
        };
        assert!(bad_max_tempo.validate().is_err());
    }

    #[test]
    fn test_tempo_above_max_tempo_is_valid() {
        // max_tempo only bounds live display, offline tempo is unrestricted
        let fast = TranscriberConfig {
            tempo: 800.0,
            ..Default::default()
        };
        assert_eq!(fast.validate(), Ok(()));
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: TranscriberConfig =
            serde_json::from_str(r#"{ "tempo": 75, "channel": 3 }"#).unwrap();
        assert_eq!(config.tempo, 75.0);
        assert_eq!(config.channel, 3);
        assert_eq!(config.sample_rate, 32_000);
        assert!(config.smoothing);
    }

    #[test]
    fn test_file_round_trip() {
        let path = std::env::temp_dir().join(format!(
            "sound2midi_config_{}.json",
            std::process::id()
        ));
        let config = TranscriberConfig {
            tempo: 90.0,
            ppqn: 480,
            ..Default::default()
        };
        config.save_to_file(&path).unwrap();
        let loaded = TranscriberConfig::load_from_file(&path).unwrap();
        std::fs::remove_file(&path).ok();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_missing_file_reports_path() {
        let err = TranscriberConfig::load_from_file("/nonexistent/sound2midi.json").unwrap_err();
        assert!(err.to_string().contains("sound2midi.json"));
    }
}
