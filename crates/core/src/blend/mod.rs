use serde::{Deserialize, Serialize};

use crate::BandEnergies;

/// Named morph targets of the rendered shape, in weight-vector order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MorphTarget {
    Sphere,
    Cube,
    Pyramid,
    Torus,
}

impl MorphTarget {
    pub const ALL: [MorphTarget; 4] = [
        MorphTarget::Sphere,
        MorphTarget::Cube,
        MorphTarget::Pyramid,
        MorphTarget::Torus,
    ];

    pub fn index(self) -> usize {
        match self {
            Self::Sphere => 0,
            Self::Cube => 1,
            Self::Pyramid => 2,
            Self::Torus => 3,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Sphere => "sphere",
            Self::Cube => "cube",
            Self::Pyramid => "pyramid",
            Self::Torus => "torus",
        }
    }

    /// Band that drives this target when audio is on: bass, mid and treble
    /// feed the first three targets, overall level feeds the torus.
    pub fn band(self, envelope: &BandEnergies) -> f32 {
        match self {
            Self::Sphere => envelope.bass,
            Self::Cube => envelope.mid,
            Self::Pyramid => envelope.treble,
            Self::Torus => envelope.level,
        }
    }
}

/// Morph weights, one per [`MorphTarget`], each in `[0, 1]`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f32; 4]", into = "[f32; 4]")]
pub struct WeightVector([f32; 4]);

impl WeightVector {
    pub const ZERO: Self = Self([0.0; 4]);

    /// Builds a vector, clamping every component into `[0, 1]` (NaN reads as 0).
    pub fn new(weights: [f32; 4]) -> Self {
        Self(weights.map(clamp_unit))
    }

    /// A vector fully weighted towards one target.
    pub fn only(target: MorphTarget) -> Self {
        let mut weights = Self::ZERO;
        weights.0[target.index()] = 1.0;
        weights
    }

    pub fn get(&self, target: MorphTarget) -> f32 {
        self.0[target.index()]
    }

    pub fn set(&mut self, target: MorphTarget, value: f32) {
        self.0[target.index()] = clamp_unit(value);
    }

    pub fn as_array(&self) -> &[f32; 4] {
        &self.0
    }

    pub fn sum(&self) -> f32 {
        self.0.iter().sum()
    }

    /// Rescales proportionally so the components sum to 1 when they exceed
    /// it. Vectors already summing to at most 1 are returned untouched.
    pub fn normalized(self) -> Self {
        let sum = self.sum();
        if sum > 1.0 && sum.is_finite() {
            Self(self.0.map(|w| w / sum))
        } else {
            self
        }
    }

    pub(crate) fn from_raw(weights: [f32; 4]) -> Self {
        Self(weights)
    }
}

impl From<[f32; 4]> for WeightVector {
    fn from(weights: [f32; 4]) -> Self {
        Self::new(weights)
    }
}

impl From<WeightVector> for [f32; 4] {
    fn from(weights: WeightVector) -> Self {
        weights.0
    }
}

fn clamp_unit(value: f32) -> f32 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

/// Layers the per-frame audio contribution on top of the base weights.
#[derive(Debug, Clone, Default)]
pub struct WeightBlender {
    audio_weights: WeightVector,
}

impl WeightBlender {
    pub fn new() -> Self {
        Self::default()
    }

    /// Audio contribution computed by the last call to [`Self::compute_final`].
    pub fn audio_weights(&self) -> WeightVector {
        self.audio_weights
    }

    /// Combines `base` with the audio contribution. `base` is never modified.
    ///
    /// With audio off the audio contribution is reset to zero and the result
    /// equals `base` bit for bit (unless `base` itself sums above 1). The
    /// result never sums above 1.
    pub fn compute_final(
        &mut self,
        base: &WeightVector,
        audio_on: bool,
        envelope: &BandEnergies,
        gain: f32,
    ) -> WeightVector {
        if !audio_on {
            self.audio_weights = WeightVector::ZERO;
            return base.normalized();
        }

        let envelope = envelope.sanitized();
        let gain = if gain.is_finite() { gain.max(0.0) } else { 0.0 };

        let mut audio = [0.0; 4];
        let mut combined = [0.0; 4];
        for target in MorphTarget::ALL {
            let i = target.index();
            let contribution = target.band(&envelope) * gain;
            audio[i] = if contribution.is_finite() { contribution } else { 0.0 };
            combined[i] = clamp_unit(base.0[i] + audio[i]);
        }

        self.audio_weights = WeightVector::from_raw(audio);
        WeightVector::from_raw(combined).normalized()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn audio_off_returns_base_and_clears_contribution() {
        let mut blender = WeightBlender::new();
        let base = WeightVector::new([0.3, 0.2, 0.1, 0.05]);

        blender.compute_final(&base, true, &BandEnergies::new(1.0, 1.0, 1.0, 1.0), 0.5);
        assert!(blender.audio_weights().sum() > 0.0);

        let result = blender.compute_final(&base, false, &BandEnergies::new(1.0, 1.0, 1.0, 1.0), 0.5);
        assert_eq!(result, base);
        assert_eq!(blender.audio_weights(), WeightVector::ZERO);
    }

    #[test]
    fn maps_bands_to_targets() {
        let mut blender = WeightBlender::new();
        let envelope = BandEnergies::new(0.8, 0.4, 0.2, 0.1);

        let result = blender.compute_final(&WeightVector::ZERO, true, &envelope, 0.5);
        let audio = blender.audio_weights();
        assert!((audio.get(MorphTarget::Sphere) - 0.4).abs() < 1e-6);
        assert!((audio.get(MorphTarget::Cube) - 0.2).abs() < 1e-6);
        assert!((audio.get(MorphTarget::Pyramid) - 0.1).abs() < 1e-6);
        assert!((audio.get(MorphTarget::Torus) - 0.05).abs() < 1e-6);
        assert_eq!(result, audio);
    }

    #[test]
    fn normalizes_when_sum_exceeds_one() {
        let mut blender = WeightBlender::new();
        let base = WeightVector::new([0.5, 0.5, 0.5, 0.5]);

        let result = blender.compute_final(&base, true, &BandEnergies::ZERO, 1.0);
        assert!((result.sum() - 1.0).abs() < 1e-6);
        for target in MorphTarget::ALL {
            assert!((result.get(target) - 0.25).abs() < 1e-6);
        }
    }

    #[test]
    fn clamps_each_component_before_normalizing() {
        let mut blender = WeightBlender::new();
        let base = WeightVector::only(MorphTarget::Sphere);

        let result = blender.compute_final(&base, true, &BandEnergies::new(2.0, 0.0, 0.0, 0.0), 1.0);
        assert_eq!(result, WeightVector::only(MorphTarget::Sphere));
    }

    #[test]
    fn pathological_envelope_contributes_nothing() {
        let mut blender = WeightBlender::new();
        let base = WeightVector::new([0.2, 0.2, 0.0, 0.0]);
        let envelope = BandEnergies::new(f32::NAN, f32::INFINITY, -3.0, 0.0);

        let result = blender.compute_final(&base, true, &envelope, 1.0);
        assert_eq!(result, base);

        let result = blender.compute_final(&base, true, &BandEnergies::new(1.0, 1.0, 1.0, 1.0), f32::NAN);
        assert_eq!(result, base);
    }

    #[test]
    fn setters_clamp_into_unit_range() {
        let mut weights = WeightVector::ZERO;
        weights.set(MorphTarget::Cube, 1.7);
        weights.set(MorphTarget::Torus, -0.4);
        assert_eq!(weights.as_array(), &[0.0, 1.0, 0.0, 0.0]);
    }
}
