//! Noise power spectral density: Welch estimation and lookup.

use crate::math::fft::FftHelper;
use crate::math::stats::StatsHelper;
use crate::math::window::hann;
use crate::prelude::{StageError, StageResult};
use crate::series::SampledSeries;
use crate::time::TimeSpan;
use ndarray::{Array2, Axis};
use serde::{Deserialize, Serialize};

/// One-sided power spectral density sampled every `delta_f` Hz from 0 Hz.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NoisePowerSpectrum {
    values: Vec<f64>,
    delta_f: f64,
}

impl NoisePowerSpectrum {
    pub fn new(values: Vec<f64>, delta_f: f64) -> Self {
        Self { values, delta_f }
    }

    /// Spectrum of unit-variance white noise sampled at `sample_rate`.
    pub fn white(sample_rate: f64, delta_f: f64) -> Self {
        let bins = (sample_rate / 2.0 / delta_f).floor() as usize + 1;
        Self::new(vec![2.0 / sample_rate; bins], delta_f)
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn delta_f(&self) -> f64 {
        self.delta_f
    }

    /// Linear interpolation at `frequency`. Zero whenever either bracketing
    /// bin is zero so that suppressed bands stay suppressed.
    pub fn value_at(&self, frequency: f64) -> f64 {
        if self.values.is_empty() || !(frequency >= 0.0) {
            return 0.0;
        }
        let position = frequency / self.delta_f;
        let lower = position.floor() as usize;
        let last = self.values.len() - 1;
        if lower >= last {
            return self.values[last];
        }
        let (a, b) = (self.values[lower], self.values[lower + 1]);
        if a <= 0.0 || b <= 0.0 {
            return 0.0;
        }
        let frac = position - lower as f64;
        a + (b - a) * frac
    }

    /// Amplitude that maps noise of this spectrum onto unit variance for a
    /// series sampled at `sample_rate`, or `None` where the spectrum is empty.
    pub fn whitening_amplitude(&self, frequency: f64, sample_rate: f64) -> Option<f64> {
        let power = self.value_at(frequency);
        if power > 0.0 && power.is_finite() {
            Some((power * sample_rate / 2.0).sqrt())
        } else {
            None
        }
    }

    /// Zeroes every bin outside `[low, high]`.
    pub fn restrict_band(mut self, low: f64, high: f64) -> Self {
        let delta_f = self.delta_f;
        for (k, value) in self.values.iter_mut().enumerate() {
            let frequency = k as f64 * delta_f;
            if frequency < low || frequency > high {
                *value = 0.0;
            }
        }
        self
    }

    /// Zeroes every bin within `half_width` of `center`, so that a notched
    /// band is skipped by whitening and filtering instead of amplified.
    pub fn suppress_band(mut self, center: f64, half_width: f64) -> Self {
        let delta_f = self.delta_f;
        for (k, value) in self.values.iter_mut().enumerate() {
            if (k as f64 * delta_f - center).abs() <= half_width {
                *value = 0.0;
            }
        }
        self
    }
}

/// Welch estimate with Hann-windowed, mean-detrended segments of
/// `segment_seconds` at 50% overlap, combined by a bias-corrected median so
/// that a loud transient in one or two segments does not lift the estimate.
pub fn welch(series: &SampledSeries, segment_seconds: f64) -> StageResult<NoisePowerSpectrum> {
    let sample_rate = series.sample_rate();
    let segment_len = (segment_seconds * sample_rate).round() as usize;
    if segment_len < 2 || segment_len > series.len() {
        return Err(StageError::InsufficientData {
            what: "PSD averaging window",
            requested: TimeSpan::from_duration(series.start(), segment_seconds),
            available: series.span(),
        });
    }

    let step = (segment_len / 2).max(1);
    let segment_count = (series.len() - segment_len) / step + 1;
    let bins = segment_len / 2 + 1;
    let window = hann(segment_len);
    let window_power: f64 = window.iter().map(|w| w * w).sum();
    let scale = 1.0 / (sample_rate * window_power);
    let nyquist_bin = (segment_len % 2 == 0).then_some(segment_len / 2);
    let fft = FftHelper::new(segment_len);

    let mut periodograms = Array2::<f64>::zeros((segment_count, bins));
    for (row, mut periodogram) in periodograms.outer_iter_mut().enumerate() {
        let offset = row * step;
        let segment = &series.samples()[offset..offset + segment_len];
        let mean = StatsHelper::mean(segment);
        let tapered: Vec<f64> = segment
            .iter()
            .zip(&window)
            .map(|(value, w)| (value - mean) * w)
            .collect();
        let spectrum = fft.forward(&tapered);
        for k in 0..bins {
            let mut power = spectrum[k].norm_sqr() * scale;
            if k != 0 && Some(k) != nyquist_bin {
                power *= 2.0;
            }
            periodogram[k] = power;
        }
    }

    let bias = median_bias(segment_count);
    let averaged: Vec<f64> = periodograms
        .axis_iter(Axis(1))
        .map(|column| median(column.to_vec()) / bias)
        .collect();
    if averaged.iter().any(|v| !v.is_finite()) {
        return Err(StageError::Numerical("PSD estimate is not finite".into()));
    }
    Ok(NoisePowerSpectrum::new(
        averaged,
        sample_rate / segment_len as f64,
    ))
}

fn median(mut values: Vec<f64>) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.sort_by(f64::total_cmp);
    let mid = values.len() / 2;
    if values.len() % 2 == 0 {
        0.5 * (values[mid - 1] + values[mid])
    } else {
        values[mid]
    }
}

/// Ratio of median to mean for `n` chi-squared (2 dof) periodogram bins.
fn median_bias(n: usize) -> f64 {
    let terms = n.saturating_sub(1) / 2;
    1.0 + (1..=terms)
        .map(|i| {
            let even = 2.0 * i as f64;
            1.0 / (even + 1.0) - 1.0 / even
        })
        .sum::<f64>()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::GpsTime;
    use rand::{rngs::StdRng, Rng, SeedableRng};

    #[test]
    fn welch_of_white_noise_is_flat_at_expected_level() {
        let rate = 256.0;
        let mut rng = StdRng::seed_from_u64(7);
        let samples: Vec<f64> = (0..256 * 64).map(|_| rng.gen_range(-1.0..1.0)).collect();
        let series = SampledSeries::new(GpsTime::from_seconds(0.0), rate, samples).unwrap();
        let psd = welch(&series, 4.0).unwrap();

        assert_eq!(psd.values().len(), 513);
        assert_eq!(psd.delta_f(), 0.25);
        // Uniform on [-1, 1) has variance 1/3.
        let expected = 2.0 * (1.0 / 3.0) / rate;
        let interior = &psd.values()[20..480];
        let level = StatsHelper::mean(interior);
        assert!((level - expected).abs() / expected < 0.1, "level {level}");
    }

    #[test]
    fn welch_rejects_window_longer_than_series() {
        let series = SampledSeries::new(GpsTime::from_seconds(0.0), 16.0, vec![0.0; 32]).unwrap();
        let err = welch(&series, 4.0).unwrap_err();
        assert_eq!(err.kind(), "InsufficientDataError");
    }

    #[test]
    fn value_at_interpolates_and_respects_zeros() {
        let psd = NoisePowerSpectrum::new(vec![0.0, 2.0, 4.0, 4.0], 1.0);
        assert_eq!(psd.value_at(1.5), 3.0);
        assert_eq!(psd.value_at(0.5), 0.0);
        assert_eq!(psd.value_at(10.0), 4.0);
        assert!(psd.whitening_amplitude(0.25, 8.0).is_none());
    }

    #[test]
    fn median_bias_approaches_ln2() {
        assert_eq!(median_bias(1), 1.0);
        assert!((median_bias(3) - (1.0 + 1.0 / 3.0 - 0.5)).abs() < 1e-12);
        assert!((median_bias(1001) - std::f64::consts::LN_2).abs() < 1e-3);
    }

    #[test]
    fn median_resists_single_loud_segment() {
        let rate = 64.0;
        let mut rng = StdRng::seed_from_u64(9);
        let mut samples: Vec<f64> = (0..64 * 64).map(|_| rng.gen_range(-1.0..1.0)).collect();
        for value in &mut samples[1030..1050] {
            *value *= 50.0;
        }
        let series = SampledSeries::new(GpsTime::from_seconds(0.0), rate, samples).unwrap();
        let psd = welch(&series, 4.0).unwrap();
        let expected = 2.0 * (1.0 / 3.0) / rate;
        let level = StatsHelper::mean(&psd.values()[10..120]);
        assert!((level - expected).abs() / expected < 0.2, "level {level}");
    }

    #[test]
    fn suppress_band_zeroes_around_center() {
        let psd = NoisePowerSpectrum::new(vec![1.0; 8], 1.0).suppress_band(4.0, 1.0);
        assert_eq!(psd.values(), &[1.0, 1.0, 1.0, 0.0, 0.0, 0.0, 1.0, 1.0]);
        assert!(psd.whitening_amplitude(4.5, 16.0).is_none());
        assert!(psd.whitening_amplitude(1.5, 16.0).is_some());
    }

    #[test]
    fn restrict_band_zeroes_outside() {
        let psd = NoisePowerSpectrum::new(vec![1.0; 8], 1.0).restrict_band(2.0, 5.0);
        assert_eq!(psd.values(), &[0.0, 0.0, 1.0, 1.0, 1.0, 1.0, 0.0, 0.0]);
    }
}
