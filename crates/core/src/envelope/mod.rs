use serde::{Deserialize, Serialize};

use crate::{config::EnvelopeConfig, timeline::Millis, BandEnergies};

/// Index into the four tracked bands, in [`BandEnergies::to_array`] order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Band {
    Bass,
    Mid,
    Treble,
    Level,
}

impl Band {
    pub const ALL: [Band; 4] = [Band::Bass, Band::Mid, Band::Treble, Band::Level];

    pub fn index(self) -> usize {
        match self {
            Self::Bass => 0,
            Self::Mid => 1,
            Self::Treble => 2,
            Self::Level => 3,
        }
    }
}

/// Per-band follower state.
#[derive(Debug, Clone, PartialEq)]
pub struct BandState {
    pub smoothed: f32,
    /// Decaying loudness ceiling the shaped input is divided by.
    pub agc_reference: f32,
    pub agc_floor: f32,
    pub pulse: f32,
    pub last_beat_ms: Option<Millis>,
}

impl BandState {
    fn new(agc_floor: f32) -> Self {
        Self {
            smoothed: 0.0,
            agc_reference: agc_floor,
            agc_floor,
            pulse: 0.0,
            last_beat_ms: None,
        }
    }

    pub fn agc_gain(&self) -> f32 {
        1.0 / self.agc_reference.max(self.agc_floor)
    }
}

/// Turns raw band energies into smoothed control signals roughly in
/// `[0, 1]`, with threshold-based onset pulses.
///
/// Coefficients are defined per reference frame and rescaled by the actual
/// tick length, so the response does not depend on the audio callback rate.
#[derive(Debug, Clone)]
pub struct EnvelopeFollower {
    config: EnvelopeConfig,
    bands: [BandState; 4],
    clock_ms: Millis,
    beat_fired: bool,
}

impl Default for EnvelopeFollower {
    fn default() -> Self {
        Self::new(EnvelopeConfig::default())
    }
}

impl EnvelopeFollower {
    pub fn new(config: EnvelopeConfig) -> Self {
        let floor = config.agc_floor;
        Self {
            config,
            bands: std::array::from_fn(|_| BandState::new(floor)),
            clock_ms: 0.0,
            beat_fired: false,
        }
    }

    pub fn config(&self) -> &EnvelopeConfig {
        &self.config
    }

    pub fn band(&self, band: Band) -> &BandState {
        &self.bands[band.index()]
    }

    /// Smoothed output of the last accepted update.
    pub fn output(&self) -> BandEnergies {
        BandEnergies::from_array(std::array::from_fn(|i| self.bands[i].smoothed))
    }

    /// Decaying one-shot pulse of the bass band, 1.0 on the tick a beat fires.
    pub fn beat_pulse(&self) -> f32 {
        self.bands[Band::Bass.index()].pulse
    }

    /// Whether the last accepted update fired a bass beat.
    pub fn beat_fired(&self) -> bool {
        self.beat_fired
    }

    pub fn reset(&mut self) {
        *self = Self::new(self.config.clone());
    }

    /// Advances the follower by `dt_ms`. A zero, negative or non-finite
    /// `dt_ms` leaves the state untouched and returns the previous output.
    pub fn update(&mut self, raw: BandEnergies, dt_ms: Millis) -> BandEnergies {
        if !(dt_ms.is_finite() && dt_ms > 0.0) {
            return self.output();
        }

        let cfg = &self.config;
        let frames = (dt_ms as f32 / cfg.reference_frame_ms.max(f32::EPSILON)).max(0.0);
        let attack = 1.0 - (1.0 - cfg.attack).powf(frames);
        let release = 1.0 - (1.0 - cfg.release).powf(frames);
        let agc_decay = cfg.agc_decay.powf(frames);
        let pulse_decay = cfg.pulse_decay.powf(frames);
        let exponent = cfg.shaping_exponent;
        let threshold = cfg.beat_threshold;
        let hold_ms = cfg.beat_hold_ms;

        self.clock_ms += dt_ms;
        let now = self.clock_ms;
        self.beat_fired = false;

        for (state, input) in self.bands.iter_mut().zip(raw.to_array()) {
            // `max` maps NaN to 0; infinities are rejected below.
            let shaped = input.max(0.0).powf(exponent);
            if shaped.is_finite() {
                let reference = (state.agc_reference * agc_decay)
                    .max(shaped)
                    .max(state.agc_floor);
                let normalized = (shaped / reference).clamp(0.0, 1.0);
                let coefficient = if normalized > state.smoothed { attack } else { release };
                let next = state.smoothed + coefficient * (normalized - state.smoothed);

                if reference.is_finite() && next.is_finite() {
                    state.agc_reference = reference;
                    state.smoothed = next.max(0.0);
                }
            }

            state.pulse = if (state.pulse * pulse_decay).is_finite() {
                state.pulse * pulse_decay
            } else {
                0.0
            };

            let held = state
                .last_beat_ms
                .map(|last| now - last >= hold_ms)
                .unwrap_or(true);
            if state.smoothed > threshold && held {
                state.pulse = 1.0;
                state.last_beat_ms = Some(now);
            }
        }

        self.beat_fired = self.bands[Band::Bass.index()].last_beat_ms == Some(now);
        self.output()
    }
}
