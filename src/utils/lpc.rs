//! Linear prediction by Burg's method and root-based resonance extraction
//!
//! `lpc_burg` follows Praat's VECburg recursion; `lpc_to_formants` turns the
//! predictor polynomial into resonance candidates via companion-matrix
//! eigenvalues, Newton polishing and reflection into the unit circle.

use std::f64::consts::PI;

use nalgebra::DMatrix;
use num_complex::Complex;

/// Predictor coefficients and residual power of one frame
#[derive(Debug, Clone)]
pub struct LpcResult {
    /// a[1..=m] in Praat's sign convention (no leading 1.0)
    pub coefficients: Vec<f64>,
    /// Mean-square prediction error
    pub gain: f64,
}

/// One resonance read off a polynomial root
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FormantCandidate {
    /// Frequency in Hz
    pub frequency: f64,
    /// Bandwidth in Hz
    pub bandwidth: f64,
}

/// Burg's method of order `order`.
///
/// Returns `None` when the input is shorter than the order requires.
pub fn lpc_burg(samples: &[f64], order: usize) -> Option<LpcResult> {
    let n = samples.len();
    if order == 0 || n <= order {
        return None;
    }

    let mut a = vec![0.0; order];
    let mut xms = samples.iter().map(|x| x * x).sum::<f64>() / n as f64;
    if xms <= 0.0 {
        return Some(LpcResult {
            coefficients: a,
            gain: 0.0,
        });
    }

    // forward and backward errors, offset by one sample
    let mut forward = samples[..n - 1].to_vec();
    let mut backward = samples[1..].to_vec();
    let mut previous = vec![0.0; order];

    for i in 0..order {
        let len = n - i - 1;
        let (num, den) = forward[..len]
            .iter()
            .zip(&backward[..len])
            .fold((0.0, 0.0), |(num, den), (&f, &b)| (num + f * b, den + f * f + b * b));

        if den <= 0.0 {
            return Some(LpcResult {
                coefficients: a,
                gain: 0.0,
            });
        }

        a[i] = 2.0 * num / den;
        xms *= 1.0 - a[i] * a[i];
        for j in 0..i {
            a[j] = previous[j] - a[i] * previous[i - j - 1];
        }

        if i + 1 < order {
            previous[..=i].copy_from_slice(&a[..=i]);
            for j in 0..len - 1 {
                forward[j] -= a[i] * backward[j];
                backward[j] = backward[j + 1] - a[i] * forward[j + 1];
            }
        }
    }

    Some(LpcResult {
        coefficients: a,
        gain: xms,
    })
}

/// Resonances of the predictor polynomial, sorted by frequency.
///
/// Only upper-half-plane roots between 50 Hz and Nyquist − 50 Hz are kept.
pub fn lpc_to_formants(coefficients: &[f64], sample_rate: f64) -> Vec<FormantCandidate> {
    let m = coefficients.len();
    if m == 0 {
        return Vec::new();
    }
    let nyquist = 0.5 * sample_rate;

    // z^m - a1 z^(m-1) - ... - am, constant term first
    let mut polynomial: Vec<f64> = coefficients.iter().rev().map(|c| -c).collect();
    polynomial.push(1.0);

    let mut roots = polynomial_roots(&polynomial);
    polish_roots(&polynomial, &mut roots);

    let mut formants: Vec<FormantCandidate> = roots
        .into_iter()
        .map(|root| {
            let magnitude = root.norm();
            if magnitude > 1.0 {
                root / (magnitude * magnitude)
            } else {
                root
            }
        })
        .filter(|root| root.im >= 0.0)
        .filter_map(|root| {
            let frequency = root.im.atan2(root.re).abs() * nyquist / PI;
            if frequency < 50.0 || frequency > nyquist - 50.0 {
                return None;
            }
            let power = root.norm_sqr();
            let bandwidth = if power > 0.0 {
                -power.ln() * nyquist / PI
            } else {
                nyquist
            };
            Some(FormantCandidate {
                frequency,
                bandwidth,
            })
        })
        .collect();

    formants.sort_by(|a, b| a.frequency.total_cmp(&b.frequency));
    formants
}

/// Roots of a real polynomial given constant term first
fn polynomial_roots(coefficients: &[f64]) -> Vec<Complex<f64>> {
    let Some(degree) = coefficients.len().checked_sub(1) else {
        return Vec::new();
    };
    if degree == 0 {
        return Vec::new();
    }
    let leading = coefficients[degree];
    if leading.abs() < 1e-15 {
        return polynomial_roots(&coefficients[..degree]);
    }

    let mut companion = DMatrix::<f64>::zeros(degree, degree);
    for i in 1..degree {
        companion[(i, i - 1)] = 1.0;
    }
    for i in 0..degree {
        companion[(i, degree - 1)] = -coefficients[i] / leading;
    }

    companion
        .complex_eigenvalues()
        .iter()
        .map(|c| Complex::new(c.re, c.im))
        .collect()
}

/// p(z) and p'(z) by Horner's rule
fn evaluate_with_derivative(coefficients: &[f64], z: Complex<f64>) -> (Complex<f64>, Complex<f64>) {
    let mut value = Complex::new(0.0, 0.0);
    let mut derivative = Complex::new(0.0, 0.0);
    for &c in coefficients.iter().rev() {
        derivative = derivative * z + value;
        value = value * z + c;
    }
    (value, derivative)
}

/// Newton iteration that stops as soon as the residual stops shrinking
fn polish_root(coefficients: &[f64], root: Complex<f64>) -> Complex<f64> {
    const MAX_ITERATIONS: usize = 80;

    let mut best = root;
    let mut current = root;
    let mut min_residual = f64::MAX;
    for _ in 0..MAX_ITERATIONS {
        let (p, dp) = evaluate_with_derivative(coefficients, current);
        let residual = p.norm();
        if residual >= min_residual {
            return best;
        }
        min_residual = residual;
        best = current;
        if dp.norm() == 0.0 {
            return best;
        }
        current -= p / dp;
    }
    best
}

/// Polish every root, keeping real roots real and conjugate pairs conjugate
fn polish_roots(coefficients: &[f64], roots: &mut [Complex<f64>]) {
    let mut i = 0;
    while i < roots.len() {
        let original = roots[i];
        if original.im.abs() > 1e-15 {
            roots[i] = polish_root(coefficients, original);
            if let Some(next) = roots.get(i + 1).copied() {
                if (next.im + original.im).abs() < 1e-10 && (next.re - original.re).abs() < 1e-10 {
                    roots[i + 1] = roots[i].conj();
                    i += 1;
                }
            }
        } else {
            roots[i] = Complex::new(polish_root(coefficients, Complex::new(original.re, 0.0)).re, 0.0);
        }
        i += 1;
    }
}
