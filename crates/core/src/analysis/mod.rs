use std::{f32::consts::PI, fmt, sync::Arc};

use realfft::{num_complex::Complex32, RealFftPlanner, RealToComplex};
use serde::{Deserialize, Serialize};

use crate::{config::AudioConfig, ReactiveError, Result};

const LOW_BAND_FRACTION: f32 = 0.15;
const MID_BAND_FRACTION: f32 = 0.45;

/// Scalar energies of one audio analysis frame. Band values are average
/// spectrum magnitudes scaled to 0..1 (byte / 255); `level` is the RMS of the
/// time-domain block.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct BandEnergies {
    pub bass: f32,
    pub mid: f32,
    pub treble: f32,
    pub level: f32,
}

impl BandEnergies {
    pub const ZERO: Self = Self {
        bass: 0.0,
        mid: 0.0,
        treble: 0.0,
        level: 0.0,
    };

    pub fn new(bass: f32, mid: f32, treble: f32, level: f32) -> Self {
        Self {
            bass,
            mid,
            treble,
            level,
        }
    }

    pub fn to_array(self) -> [f32; 4] {
        [self.bass, self.mid, self.treble, self.level]
    }

    pub fn from_array(values: [f32; 4]) -> Self {
        Self::new(values[0], values[1], values[2], values[3])
    }

    /// Replaces NaN, infinite and negative components with zero.
    pub fn sanitized(self) -> Self {
        Self::from_array(self.to_array().map(|v| if v.is_finite() { v.max(0.0) } else { 0.0 }))
    }

    pub fn is_finite(&self) -> bool {
        self.to_array().iter().all(|v| v.is_finite())
    }
}

/// Splits a byte-range magnitude spectrum into bass / mid / treble averages.
#[derive(Debug, Clone, Copy)]
pub struct BandEnergyExtractor {
    low_fraction: f32,
    mid_fraction: f32,
}

impl Default for BandEnergyExtractor {
    fn default() -> Self {
        Self {
            low_fraction: LOW_BAND_FRACTION,
            mid_fraction: MID_BAND_FRACTION,
        }
    }
}

impl BandEnergyExtractor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the `[start, end)` bin ranges of the three bands for a
    /// spectrum with `bins` entries.
    pub fn band_ranges(&self, bins: usize) -> [(usize, usize); 3] {
        let low_end = ((bins as f32 * self.low_fraction).round() as usize).min(bins);
        let mid_end = (low_end + (bins as f32 * self.mid_fraction).round() as usize).min(bins);
        [(0, low_end), (low_end, mid_end), (mid_end, bins)]
    }

    /// Never fails: empty inputs produce zeros.
    pub fn extract(&self, spectrum: &[u8], time_domain: &[f32]) -> BandEnergies {
        let [low, mid, high] = self.band_ranges(spectrum.len());
        BandEnergies {
            bass: average(&spectrum[low.0..low.1]),
            mid: average(&spectrum[mid.0..mid.1]),
            treble: average(&spectrum[high.0..high.1]),
            level: compute_rms(time_domain),
        }
    }
}

fn average(bins: &[u8]) -> f32 {
    if bins.is_empty() {
        return 0.0;
    }
    let sum: u32 = bins.iter().map(|&b| u32::from(b)).sum();
    sum as f32 / bins.len() as f32 / 255.0
}

/// RMS over the finite samples of a block; 0 for an empty block.
pub fn compute_rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum: f32 = samples
        .iter()
        .filter(|sample| sample.is_finite())
        .map(|sample| sample * sample)
        .sum();
    (sum / samples.len() as f32).sqrt()
}

/// Turns PCM blocks into a byte magnitude spectrum (one byte per bin, bins
/// `0..fft_size / 2`), mapping `[min_db, max_db]` linearly onto `0..=255`.
pub struct SpectrumAnalyser {
    fft_size: usize,
    min_db: f32,
    max_db: f32,
    smoothing: f32,
    fft_planner: RealFftPlanner<f32>,
    fft: Option<FftResources>,
    smoothed: Vec<f32>,
    bytes: Vec<u8>,
}

impl SpectrumAnalyser {
    pub fn new(config: &AudioConfig) -> Self {
        let bins = config.fft_size / 2;
        Self {
            fft_size: config.fft_size,
            min_db: config.min_db,
            max_db: config.max_db,
            smoothing: config.smoothing,
            fft_planner: RealFftPlanner::new(),
            fft: None,
            smoothed: vec![0.0; bins],
            bytes: vec![0; bins],
        }
    }

    pub fn fft_size(&self) -> usize {
        self.fft_size
    }

    pub fn bin_count(&self) -> usize {
        self.bytes.len()
    }

    /// The spectrum produced by the most recent call to [`Self::process`].
    pub fn spectrum(&self) -> &[u8] {
        &self.bytes
    }

    /// Clears the temporal smoothing history.
    pub fn reset(&mut self) {
        self.smoothed.iter_mut().for_each(|v| *v = 0.0);
        self.bytes.iter_mut().for_each(|v| *v = 0);
    }

    pub fn process(&mut self, samples: &[f32]) -> Result<&[u8]> {
        let size = self.fft_size;
        let smoothing = self.smoothing;
        let (min_db, max_db) = (self.min_db, self.max_db);

        // Most recent `size` samples, zero padded at the front when short.
        let tail = &samples[samples.len().saturating_sub(size)..];
        let offset = size - tail.len();

        self.prepare_fft()?;
        let Self {
            fft,
            smoothed,
            bytes,
            ..
        } = self;
        let fft = fft
            .as_mut()
            .ok_or_else(|| ReactiveError::msg("fft resources missing after planning"))?;

        for (index, slot) in fft.input.iter_mut().enumerate() {
            let sample = if index < offset { 0.0 } else { tail[index - offset] };
            let sample = if sample.is_finite() { sample } else { 0.0 };
            *slot = sample * hann_value(index, size);
        }

        fft.plan
            .process_with_scratch(&mut fft.input, &mut fft.spectrum, &mut fft.scratch)
            .map_err(|err| ReactiveError::msg(format!("spectrum analysis failed: {err}")))?;

        let scale = 1.0 / size as f32;
        let range = max_db - min_db;
        for ((bin, smoothed), byte) in fft
            .spectrum
            .iter()
            .zip(smoothed.iter_mut())
            .zip(bytes.iter_mut())
        {
            let magnitude = bin.norm() * scale;
            *smoothed = smoothing * *smoothed + (1.0 - smoothing) * magnitude;
            let db = if *smoothed > 0.0 {
                20.0 * smoothed.log10()
            } else {
                f32::NEG_INFINITY
            };
            let scaled = 255.0 * (db - min_db) / range;
            *byte = if scaled.is_finite() {
                scaled.clamp(0.0, 255.0) as u8
            } else {
                0
            };
        }

        Ok(bytes.as_slice())
    }

    fn prepare_fft(&mut self) -> Result<()> {
        let size = self.fft_size;
        if size < 2 {
            return Err(ReactiveError::invalid("fft size must be at least two"));
        }

        let rebuild = self
            .fft
            .as_ref()
            .map(|fft| fft.size != size)
            .unwrap_or(true);

        if rebuild {
            let plan = self.fft_planner.plan_fft_forward(size);
            let scratch = plan.make_scratch_vec();
            let spectrum = plan.make_output_vec();
            let input = plan.make_input_vec();
            self.fft = Some(FftResources {
                size,
                plan,
                scratch,
                spectrum,
                input,
            });
        }

        Ok(())
    }
}

struct FftResources {
    size: usize,
    plan: Arc<dyn RealToComplex<f32>>,
    scratch: Vec<Complex32>,
    spectrum: Vec<Complex32>,
    input: Vec<f32>,
}

impl fmt::Debug for SpectrumAnalyser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpectrumAnalyser")
            .field("fft_size", &self.fft_size)
            .field("min_db", &self.min_db)
            .field("max_db", &self.max_db)
            .field("smoothing", &self.smoothing)
            .field("planned", &self.fft.as_ref().map(|fft| fft.size))
            .finish()
    }
}

fn hann_value(index: usize, len: usize) -> f32 {
    if len <= 1 {
        return 1.0;
    }

    0.5 - 0.5 * ((2.0 * PI * index as f32) / (len as f32 - 1.0)).cos()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sine(freq_hz: f32, sample_rate: f32, len: usize) -> Vec<f32> {
        (0..len)
            .map(|i| (2.0 * PI * freq_hz * i as f32 / sample_rate).sin())
            .collect()
    }

    #[test]
    fn partitions_spectrum_into_three_bands() {
        let extractor = BandEnergyExtractor::new();
        assert_eq!(extractor.band_ranges(100), [(0, 15), (15, 60), (60, 100)]);

        let mut spectrum = vec![0u8; 100];
        spectrum[..15].fill(255);
        spectrum[60..].fill(51);

        let bands = extractor.extract(&spectrum, &[]);
        assert!((bands.bass - 1.0).abs() < 1e-6);
        assert_eq!(bands.mid, 0.0);
        assert!((bands.treble - 0.2).abs() < 1e-6);
        assert_eq!(bands.level, 0.0);
    }

    #[test]
    fn empty_input_yields_zeros() {
        let bands = BandEnergyExtractor::new().extract(&[], &[]);
        assert_eq!(bands, BandEnergies::ZERO);
    }

    #[test]
    fn level_is_rms_of_time_domain() {
        let bands = BandEnergyExtractor::new().extract(&[0; 8], &[0.5, -0.5, 0.5, -0.5]);
        assert!((bands.level - 0.5).abs() < 1e-6);
    }

    #[test]
    fn sanitizes_pathological_values() {
        let bands = BandEnergies::new(f32::NAN, -1.0, f32::INFINITY, 0.3).sanitized();
        assert_eq!(bands, BandEnergies::new(0.0, 0.0, 0.0, 0.3));
    }

    #[test]
    fn silence_produces_empty_spectrum() {
        let mut analyser = SpectrumAnalyser::new(&AudioConfig::default());
        let spectrum = analyser.process(&vec![0.0; 2048]).unwrap();
        assert_eq!(spectrum.len(), 1024);
        assert!(spectrum.iter().all(|&b| b == 0));
    }

    #[test]
    fn low_tone_lands_in_bass_band() {
        let config = AudioConfig {
            smoothing: 0.0,
            ..AudioConfig::default()
        };
        let mut analyser = SpectrumAnalyser::new(&config);
        let samples = sine(200.0, config.sample_rate as f32, config.fft_size);
        let spectrum = analyser.process(&samples).unwrap().to_vec();

        let bands = BandEnergyExtractor::new().extract(&spectrum, &samples);
        assert!(bands.bass > bands.mid);
        assert!(bands.bass > bands.treble);
        assert!((bands.level - std::f32::consts::FRAC_1_SQRT_2).abs() < 0.02);
    }

    #[test]
    fn short_blocks_are_zero_padded() {
        let mut analyser = SpectrumAnalyser::new(&AudioConfig::default());
        let spectrum = analyser.process(&[0.8; 16]).unwrap();
        assert_eq!(spectrum.len(), 1024);
    }
}
