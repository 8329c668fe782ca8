//! FFT wrapper used by resampling and pitch analysis
//!
//! Thin layer over rustfft that keeps one planner per analysis run so that
//! plans for repeated frame sizes are reused.

use num_complex::Complex;
use rustfft::FftPlanner;

/// FFT processor with cached plans
pub struct Fft {
    planner: FftPlanner<f64>,
}

impl Default for Fft {
    fn default() -> Self {
        Self::new()
    }
}

impl Fft {
    /// Create a new FFT processor
    pub fn new() -> Self {
        Self {
            planner: FftPlanner::new(),
        }
    }

    /// Forward FFT of real input, zero-padded to `size` (or the input length if larger)
    pub fn real_fft(&mut self, input: &[f64], size: usize) -> Vec<Complex<f64>> {
        let size = size.max(input.len());
        let plan = self.planner.plan_fft_forward(size);

        let mut buffer: Vec<Complex<f64>> = input
            .iter()
            .map(|&x| Complex::new(x, 0.0))
            .chain(std::iter::repeat(Complex::new(0.0, 0.0)))
            .take(size)
            .collect();

        plan.process(&mut buffer);
        buffer
    }

    /// Inverse FFT, scaled by 1/N
    pub fn inverse_fft(&mut self, input: &[Complex<f64>]) -> Vec<Complex<f64>> {
        let size = input.len();
        if size == 0 {
            return Vec::new();
        }
        let plan = self.planner.plan_fft_inverse(size);

        let mut buffer = input.to_vec();
        plan.process(&mut buffer);

        let scale = 1.0 / size as f64;
        for c in &mut buffer {
            *c *= scale;
        }
        buffer
    }

    /// Circular autocorrelation at the input length.
    ///
    /// Callers zero-pad the input so that the lags they read are free of
    /// wrap-around.
    pub fn autocorrelation(&mut self, input: &[f64]) -> Vec<f64> {
        let n = input.len();
        if n == 0 {
            return Vec::new();
        }

        let spectrum = self.real_fft(input, n);
        let power: Vec<Complex<f64>> = spectrum
            .iter()
            .map(|c| Complex::new(c.norm_sqr(), 0.0))
            .collect();

        self.inverse_fft(&power).iter().map(|c| c.re).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_forward_inverse_recovers_signal() {
        let signal: Vec<f64> = (0..16).map(|i| (i as f64 * 0.3).sin()).collect();
        let mut fft = Fft::new();
        let spectrum = fft.real_fft(&signal, 16);
        let back = fft.inverse_fft(&spectrum);
        for (a, b) in signal.iter().zip(back.iter()) {
            assert_relative_eq!(*a, b.re, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_autocorrelation_lag_zero_is_energy() {
        let mut input = vec![1.0, -2.0, 3.0];
        input.resize(8, 0.0);
        let ac = Fft::new().autocorrelation(&input);
        assert_relative_eq!(ac[0], 14.0, epsilon = 1e-12);
        // lag 1: 1*-2 + -2*3
        assert_relative_eq!(ac[1], -8.0, epsilon = 1e-12);
    }
}
