use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::{interpolation::Easing, ReactiveError, Result};

/// Top-level configuration structure for the engine.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub audio: AudioConfig,
    pub envelope: EnvelopeConfig,
    pub blend: BlendConfig,
    pub interpolation: InterpolationConfig,
    pub chain: ChainConfig,
}

impl EngineConfig {
    /// Parses a JSON document. Missing fields fall back to their defaults.
    pub fn from_json_str(text: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads and validates a JSON configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    pub fn to_json_string(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Rejects values that would make the engine misbehave (zero FFT size,
    /// coefficients outside (0, 1], negative durations).
    pub fn validate(&self) -> Result<()> {
        let audio = &self.audio;
        if audio.fft_size < 2 || !audio.fft_size.is_power_of_two() {
            return Err(ReactiveError::invalid(format!(
                "fft_size must be a power of two >= 2, got {}",
                audio.fft_size
            )));
        }
        if !(audio.min_db < audio.max_db) {
            return Err(ReactiveError::invalid("min_db must be below max_db"));
        }
        if !(0.0..1.0).contains(&audio.smoothing) {
            return Err(ReactiveError::invalid("spectral smoothing must lie in [0, 1)"));
        }

        let env = &self.envelope;
        for (name, value) in [
            ("attack", env.attack),
            ("release", env.release),
            ("agc_decay", env.agc_decay),
            ("pulse_decay", env.pulse_decay),
        ] {
            if !(value > 0.0 && value <= 1.0) {
                return Err(ReactiveError::invalid(format!(
                    "{name} must lie in (0, 1], got {value}"
                )));
            }
        }
        if !(env.agc_floor > 0.0) {
            return Err(ReactiveError::invalid("agc_floor must be positive"));
        }
        if !(env.shaping_exponent > 0.0) {
            return Err(ReactiveError::invalid("shaping_exponent must be positive"));
        }
        if !(env.beat_hold_ms >= 0.0) {
            return Err(ReactiveError::invalid("beat_hold_ms must not be negative"));
        }

        if !self.blend.audio_gain.is_finite() || self.blend.audio_gain < 0.0 {
            return Err(ReactiveError::invalid("audio_gain must be a non-negative number"));
        }
        if !(self.interpolation.duration_ms >= 0.0) {
            return Err(ReactiveError::invalid("interpolation duration must not be negative"));
        }
        if !(self.chain.duration_ms > 0.0) {
            return Err(ReactiveError::invalid("chain step duration must be positive"));
        }
        Ok(())
    }
}

/// Configuration of the spectrum analyser that feeds the band extractor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    pub sample_rate: u32,
    pub fft_size: usize,
    pub min_db: f32,
    pub max_db: f32,
    /// Temporal smoothing applied to each spectrum bin between blocks.
    pub smoothing: f32,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: 48_000,
            fft_size: 2048,
            min_db: -100.0,
            max_db: -30.0,
            smoothing: 0.8,
        }
    }
}

/// Envelope follower coefficients. Attack, release and decay values are
/// expressed per reference frame of [`EnvelopeConfig::reference_frame_ms`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnvelopeConfig {
    pub shaping_exponent: f32,
    pub attack: f32,
    pub release: f32,
    pub agc_decay: f32,
    pub agc_floor: f32,
    pub beat_threshold: f32,
    pub beat_hold_ms: f64,
    pub pulse_decay: f32,
    pub reference_frame_ms: f32,
}

impl Default for EnvelopeConfig {
    fn default() -> Self {
        Self {
            shaping_exponent: 0.6,
            attack: 0.5,
            release: 0.08,
            agc_decay: 0.995,
            agc_floor: 0.05,
            beat_threshold: 0.6,
            beat_hold_ms: 250.0,
            pulse_decay: 0.85,
            reference_frame_ms: 1000.0 / 60.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BlendConfig {
    pub audio_gain: f32,
    pub audio_enabled: bool,
}

impl Default for BlendConfig {
    fn default() -> Self {
        Self {
            audio_gain: 0.1,
            audio_enabled: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InterpolationConfig {
    /// When disabled, loading a preset jumps straight to it.
    pub enabled: bool,
    pub duration_ms: f64,
    pub easing: Easing,
}

impl Default for InterpolationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            duration_ms: 2000.0,
            easing: Easing::CubicInOut,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChainConfig {
    pub duration_ms: f64,
    #[serde(rename = "loop")]
    pub loop_chain: bool,
    pub shuffle: bool,
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            duration_ms: 2000.0,
            loop_chain: false,
            shuffle: false,
        }
    }
}
