use crate::error::{EngineError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Tunable engine constants. Every field has a default, so a config file only
/// needs the values it overrides.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Left carrier frequency; the right carrier sits at `base + beat offset`.
    pub base_frequency_hz: f32,
    pub max_beat_offset_hz: f32,
    pub max_nature_layers: usize,

    pub noise_buffer_seconds: f32,
    pub loop_fade_seconds: f32,

    /// Time constant for volume setters.
    pub volume_time_constant: f32,
    /// Time constant for beat frequency changes.
    pub frequency_time_constant: f32,
    /// Layer fade in/out length.
    pub layer_fade_seconds: f32,
    /// Master fade on start and stop.
    pub master_fade_seconds: f32,

    pub headroom: BusHeadroom,
    pub limiter: LimiterConfig,
    pub birds: BirdsConfig,

    /// Sample rate used when the host pulls audio itself.
    pub offline_sample_rate: f32,
    /// Fixed seed for all random sources, for reproducible renders.
    pub seed: Option<u64>,
}

/// Per-bus scale factors applied on top of the caller's `[0, 1]` volume.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BusHeadroom {
    pub binaural: f32,
    pub nature: f32,
    pub noise: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LimiterConfig {
    pub threshold_db: f32,
    pub knee_db: f32,
    pub ratio: f32,
    pub attack_seconds: f32,
    pub release_seconds: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BirdsConfig {
    pub tick_seconds: f32,
    pub window_seconds: f32,
    pub min_gap_seconds: f32,
    pub max_gap_seconds: f32,
    pub breeze_cutoff_hz: f32,
    pub breeze_level: f32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            base_frequency_hz: 200.0,
            max_beat_offset_hz: 40.0,
            max_nature_layers: 2,
            noise_buffer_seconds: 6.0,
            loop_fade_seconds: 0.5,
            volume_time_constant: 0.05,
            frequency_time_constant: 0.1,
            layer_fade_seconds: 0.5,
            master_fade_seconds: 1.0,
            headroom: BusHeadroom::default(),
            limiter: LimiterConfig::default(),
            birds: BirdsConfig::default(),
            offline_sample_rate: 44100.0,
            seed: None,
        }
    }
}

impl Default for BusHeadroom {
    fn default() -> Self {
        Self {
            binaural: 0.4,
            nature: 0.6,
            noise: 0.35,
        }
    }
}

impl Default for LimiterConfig {
    fn default() -> Self {
        Self {
            threshold_db: -3.0,
            knee_db: 6.0,
            ratio: 12.0,
            attack_seconds: 0.003,
            release_seconds: 0.25,
        }
    }
}

impl Default for BirdsConfig {
    fn default() -> Self {
        Self {
            tick_seconds: 2.0,
            window_seconds: 5.0,
            min_gap_seconds: 1.0,
            max_gap_seconds: 5.0,
            breeze_cutoff_hz: 900.0,
            breeze_level: 0.25,
        }
    }
}

impl EngineConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: EngineConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Self::from_json_str(&text)
    }

    pub fn validate(&self) -> Result<()> {
        let positive = [
            ("base_frequency_hz", self.base_frequency_hz),
            ("max_beat_offset_hz", self.max_beat_offset_hz),
            ("noise_buffer_seconds", self.noise_buffer_seconds),
            ("volume_time_constant", self.volume_time_constant),
            ("frequency_time_constant", self.frequency_time_constant),
            ("layer_fade_seconds", self.layer_fade_seconds),
            ("master_fade_seconds", self.master_fade_seconds),
            ("offline_sample_rate", self.offline_sample_rate),
            ("birds.tick_seconds", self.birds.tick_seconds),
            ("birds.window_seconds", self.birds.window_seconds),
            ("birds.min_gap_seconds", self.birds.min_gap_seconds),
            ("birds.max_gap_seconds", self.birds.max_gap_seconds),
            ("birds.breeze_cutoff_hz", self.birds.breeze_cutoff_hz),
            ("limiter.attack_seconds", self.limiter.attack_seconds),
            ("limiter.release_seconds", self.limiter.release_seconds),
        ];
        for (name, value) in positive {
            if !(value.is_finite() && value > 0.0) {
                return Err(EngineError::Config(format!(
                    "{} must be positive, got {}",
                    name, value
                )));
            }
        }

        let non_negative = [
            ("loop_fade_seconds", self.loop_fade_seconds),
            ("headroom.binaural", self.headroom.binaural),
            ("headroom.nature", self.headroom.nature),
            ("headroom.noise", self.headroom.noise),
            ("birds.breeze_level", self.birds.breeze_level),
        ];
        for (name, value) in non_negative {
            if !(value.is_finite() && value >= 0.0) {
                return Err(EngineError::Config(format!(
                    "{} must be non-negative, got {}",
                    name, value
                )));
            }
        }
        if !(self.limiter.threshold_db.is_finite() && self.limiter.knee_db.is_finite()) {
            return Err(EngineError::Config(
                "limiter.threshold_db and limiter.knee_db must be finite".to_string(),
            ));
        }
        if self.loop_fade_seconds * 2.0 > self.noise_buffer_seconds {
            return Err(EngineError::Config(
                "loop_fade_seconds must be at most half of noise_buffer_seconds".to_string(),
            ));
        }
        if self.birds.max_gap_seconds < self.birds.min_gap_seconds {
            return Err(EngineError::Config(
                "birds.max_gap_seconds must not be below birds.min_gap_seconds".to_string(),
            ));
        }
        // Ticks further apart than the window leave gaps in the chirp horizon
        if self.birds.tick_seconds > self.birds.window_seconds {
            return Err(EngineError::Config(
                "birds.tick_seconds must not exceed birds.window_seconds".to_string(),
            ));
        }
        if !(self.limiter.ratio >= 1.0 && self.limiter.ratio.is_finite()) {
            return Err(EngineError::Config(format!(
                "limiter.ratio must be at least 1, got {}",
                self.limiter.ratio
            )));
        }
        Ok(())
    }

    pub(crate) fn rng(&self) -> fastrand::Rng {
        match self.seed {
            Some(seed) => fastrand::Rng::with_seed(seed),
            None => fastrand::Rng::new(),
        }
    }
}
