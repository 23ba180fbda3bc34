//! Blendable parameter schema and the live state the renderer reads.
//!
//! Every blendable field implements [`Interpolate`], so adding a field to
//! [`StateSnapshot`] only requires a type that can be interpolated.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{BandEnergies, ReactiveError, WeightVector};

/// Number of independently coloured render layers.
pub const LAYER_COUNT: usize = 3;

/// Linear cross-fade between two values of the same type.
pub trait Interpolate: Sized {
    /// `t = 0` yields `self`, `t = 1` yields `target`.
    fn lerp(&self, target: &Self, t: f32) -> Self;
}

impl Interpolate for f32 {
    fn lerp(&self, target: &Self, t: f32) -> Self {
        self + (target - self) * t
    }
}

impl<T: Interpolate, const N: usize> Interpolate for [T; N] {
    fn lerp(&self, target: &Self, t: f32) -> Self {
        std::array::from_fn(|i| self[i].lerp(&target[i], t))
    }
}

impl Interpolate for WeightVector {
    fn lerp(&self, target: &Self, t: f32) -> Self {
        WeightVector::new(self.as_array().lerp(target.as_array(), t))
    }
}

/// RGB colour with components in `[0, 1]`. Serialized as `#rrggbb`.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Rgb {
    pub r: f32,
    pub g: f32,
    pub b: f32,
}

impl Rgb {
    pub const BLACK: Self = Self::new(0.0, 0.0, 0.0);
    pub const WHITE: Self = Self::new(1.0, 1.0, 1.0);

    pub const fn new(r: f32, g: f32, b: f32) -> Self {
        Self { r, g, b }
    }

    /// Parses `#rrggbb`, `rrggbb` or the short `#rgb` form.
    pub fn from_hex(text: &str) -> Option<Self> {
        let digits = text.trim().trim_start_matches('#');
        if !digits.is_ascii() {
            return None;
        }
        let channel = |s: &str| u8::from_str_radix(s, 16).ok().map(|v| f32::from(v) / 255.0);
        match digits.len() {
            6 => Some(Self::new(
                channel(&digits[0..2])?,
                channel(&digits[2..4])?,
                channel(&digits[4..6])?,
            )),
            3 => {
                let short = |i: usize| channel(&digits[i..i + 1].repeat(2));
                Some(Self::new(short(0)?, short(1)?, short(2)?))
            }
            _ => None,
        }
    }

    /// Formats as `#rrggbb`, clamping out-of-range components.
    pub fn to_hex(&self) -> String {
        let byte = |v: f32| {
            if v.is_finite() {
                (v.clamp(0.0, 1.0) * 255.0).round() as u8
            } else {
                0
            }
        };
        format!("#{:02x}{:02x}{:02x}", byte(self.r), byte(self.g), byte(self.b))
    }
}

impl Interpolate for Rgb {
    fn lerp(&self, target: &Self, t: f32) -> Self {
        Self::new(
            self.r.lerp(&target.r, t),
            self.g.lerp(&target.g, t),
            self.b.lerp(&target.b, t),
        )
    }
}

impl TryFrom<String> for Rgb {
    type Error = ReactiveError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Rgb::from_hex(&value)
            .ok_or_else(|| ReactiveError::invalid(format!("`{value}` is not a hex colour")))
    }
}

impl From<Rgb> for String {
    fn from(value: Rgb) -> Self {
        value.to_hex()
    }
}

impl fmt::Display for Rgb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// Render layers that carry their own base colour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Layer {
    Shape,
    Particles,
    Background,
}

impl Layer {
    pub fn index(self) -> usize {
        match self {
            Self::Shape => 0,
            Self::Particles => 1,
            Self::Background => 2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Lighting {
    pub ambient: f32,
    pub directional: f32,
}

impl Default for Lighting {
    fn default() -> Self {
        Self {
            ambient: 0.4,
            directional: 0.8,
        }
    }
}

impl Interpolate for Lighting {
    fn lerp(&self, target: &Self, t: f32) -> Self {
        Self {
            ambient: self.ambient.lerp(&target.ambient, t),
            directional: self.directional.lerp(&target.directional, t),
        }
    }
}

/// Every blendable parameter at one instant. Presets store these, and
/// interpolation cross-fades between two of them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StateSnapshot {
    pub morph_weights: WeightVector,
    /// Euler rotation in radians.
    pub rotation: [f32; 3],
    pub scale: f32,
    /// Continuous rotation speed in radians per second.
    pub idle_spin: f32,
    pub layer_colors: [Rgb; LAYER_COUNT],
    pub lighting: Lighting,
}

impl Default for StateSnapshot {
    fn default() -> Self {
        Self::baseline()
    }
}

impl StateSnapshot {
    /// The neutral look: a plain sphere, no rotation, unit scale.
    pub fn baseline() -> Self {
        Self {
            morph_weights: WeightVector::only(crate::MorphTarget::Sphere),
            rotation: [0.0; 3],
            scale: 1.0,
            idle_spin: 0.0,
            layer_colors: [Rgb::new(0.0, 1.0, 1.0), Rgb::WHITE, Rgb::BLACK],
            lighting: Lighting::default(),
        }
    }

    pub fn with_weights(mut self, weights: WeightVector) -> Self {
        self.morph_weights = weights;
        self
    }

    pub fn layer_color(&self, layer: Layer) -> Rgb {
        self.layer_colors[layer.index()]
    }

    pub fn set_layer_color(&mut self, layer: Layer, color: Rgb) {
        self.layer_colors[layer.index()] = color;
    }
}

impl Interpolate for StateSnapshot {
    fn lerp(&self, target: &Self, t: f32) -> Self {
        Self {
            morph_weights: self.morph_weights.lerp(&target.morph_weights, t),
            rotation: self.rotation.lerp(&target.rotation, t),
            scale: self.scale.lerp(&target.scale, t),
            idle_spin: self.idle_spin.lerp(&target.idle_spin, t),
            layer_colors: self.layer_colors.lerp(&target.layer_colors, t),
            lighting: self.lighting.lerp(&target.lighting, t),
        }
    }
}

/// The single mutable state the renderer reads every frame.
///
/// `params` is the user-authored state written by presets, interpolation and
/// controller input. The remaining fields are derived once per render tick
/// and are never persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct LiveState {
    pub params: StateSnapshot,
    pub final_weights: WeightVector,
    pub audio_weights: WeightVector,
    pub envelope: BandEnergies,
    pub beat_pulse: f32,
    pub audio_enabled: bool,
    pub audio_gain: f32,
}

impl Default for LiveState {
    fn default() -> Self {
        Self::new(StateSnapshot::baseline())
    }
}

impl LiveState {
    pub fn new(params: StateSnapshot) -> Self {
        Self {
            final_weights: params.morph_weights.normalized(),
            params,
            audio_weights: WeightVector::ZERO,
            envelope: BandEnergies::ZERO,
            beat_pulse: 0.0,
            audio_enabled: true,
            audio_gain: 0.1,
        }
    }

    /// Deep copy of the blendable parameters.
    pub fn snapshot(&self) -> StateSnapshot {
        self.params.clone()
    }

    /// Envelope values as other listeners should see them: zero when audio
    /// is off, pathological values read as zero.
    pub fn effective_audio(&self) -> BandEnergies {
        if self.audio_enabled {
            self.envelope.sanitized()
        } else {
            BandEnergies::ZERO
        }
    }

    /// Scale including the transient beat kick.
    pub fn effective_scale(&self, kick: f32) -> f32 {
        let pulse = if self.audio_enabled { self.beat_pulse } else { 0.0 };
        self.params.scale * (1.0 + pulse * kick)
    }

    pub fn reset_to_baseline(&mut self) {
        self.params = StateSnapshot::baseline();
    }
}
