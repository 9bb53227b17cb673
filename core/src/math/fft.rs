use num_complex::Complex64;
use rustfft::{num_traits::Zero, Fft, FftPlanner};
use std::sync::Arc;

/// Helper that wraps a planned forward/inverse `rustfft` pair of one size.
pub struct FftHelper {
    forward: Arc<dyn Fft<f64>>,
    inverse: Arc<dyn Fft<f64>>,
    size: usize,
}

impl FftHelper {
    pub fn new(size: usize) -> Self {
        let mut planner = FftPlanner::new();
        let forward = planner.plan_fft_forward(size);
        let inverse = planner.plan_fft_inverse(size);
        Self {
            forward,
            inverse,
            size,
        }
    }

    /// Forward transform of a real sequence, zero-padded or truncated at the tail.
    pub fn forward(&self, input: &[f64]) -> Vec<Complex64> {
        let mut buffer: Vec<Complex64> = input
            .iter()
            .take(self.size)
            .map(|&value| Complex64::new(value, 0.0))
            .collect();
        buffer.resize(self.size, Complex64::zero());
        self.forward.process(&mut buffer);
        buffer
    }

    /// Inverse transform, scaled by `1/N` so that `inverse(forward(x)) == x`.
    pub fn inverse(&self, mut spectrum: Vec<Complex64>) -> Vec<Complex64> {
        spectrum.resize(self.size, Complex64::zero());
        self.inverse.process(&mut spectrum);
        let scale = 1.0 / self.size.max(1) as f64;
        spectrum.iter_mut().for_each(|value| *value *= scale);
        spectrum
    }

    pub fn inverse_real(&self, spectrum: Vec<Complex64>) -> Vec<f64> {
        self.inverse(spectrum).into_iter().map(|c| c.re).collect()
    }
}

/// Absolute frequency (Hz) of bin `k` in an `n`-point transform.
pub fn bin_frequency(k: usize, n: usize, sample_rate: f64) -> f64 {
    let folded = k.min(n - k);
    folded as f64 * sample_rate / n as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fft_helper_returns_same_length() {
        let helper = FftHelper::new(4);
        let output = helper.forward(&[1.0, 0.0, -1.0, 0.0]);
        assert_eq!(output.len(), 4);
    }

    #[test]
    fn inverse_recovers_input() {
        let helper = FftHelper::new(8);
        let input = [0.5, -1.0, 2.0, 0.0, 3.5, -0.25, 1.0, 0.75];
        let recovered = helper.inverse_real(helper.forward(&input));
        for (a, b) in input.iter().zip(recovered.iter()) {
            assert!((a - b).abs() < 1e-12);
        }
    }

    #[test]
    fn bin_frequency_folds_negative_half() {
        assert_eq!(bin_frequency(1, 8, 8.0), 1.0);
        assert_eq!(bin_frequency(7, 8, 8.0), 1.0);
        assert_eq!(bin_frequency(4, 8, 8.0), 4.0);
    }
}
