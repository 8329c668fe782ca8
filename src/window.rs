//! Analysis windows
//!
//! The three windows the analyses need, each in the exact form Praat uses:
//! a Hanning window for pitch autocorrelation, the edge-corrected Gaussian for
//! Burg formant frames, and the Kaiser-Bessel window for intensity.

use std::f64::consts::PI;

/// Praat's pitch-analysis Hanning window (1-based phase, no zero end points)
pub fn hanning(size: usize) -> Vec<f64> {
    let denom = (size + 1) as f64;
    (1..=size)
        .map(|i| 0.5 - 0.5 * (2.0 * PI * i as f64 / denom).cos())
        .collect()
}

/// Gaussian window used for Burg formant frames, shifted and rescaled so that
/// it reaches zero at its edges
pub fn formant_gaussian(size: usize) -> Vec<f64> {
    if size == 0 {
        return Vec::new();
    }

    let edge = (-12.0_f64).exp();
    let mid = (size as f64 - 1.0) / 2.0;
    let denom = (size + 1) as f64;

    (0..size)
        .map(|i| {
            let diff = i as f64 - mid;
            let gaussian = (-48.0 * diff * diff / (denom * denom)).exp();
            (gaussian - edge) / (1.0 - edge)
        })
        .collect()
}

/// Kaiser-Bessel window of `2 * half + 1` samples, as used by Sound: To Intensity.
///
/// `half_duration` is half the physical window length in seconds and `dx` the
/// sample period; the shape is I0((2π² + 0.5)·√(1 − x²)).
pub fn intensity_kaiser(half: usize, dx: f64, half_duration: f64) -> Vec<f64> {
    let beta = 2.0 * PI * PI + 0.5;
    (0..2 * half + 1)
        .map(|i| {
            let x = (i as f64 - half as f64) * dx / half_duration;
            let root = (1.0 - x * x).max(0.0).sqrt();
            bessel_i0(beta * root)
        })
        .collect()
}

/// Modified Bessel function I0 (polynomial approximations 9.8.1/9.8.2 of
/// Abramowitz & Stegun)
pub fn bessel_i0(x: f64) -> f64 {
    let x = x.abs();
    if x < 3.75 {
        let t = x / 3.75;
        let t2 = t * t;
        1.0 + t2
            * (3.5156229
                + t2 * (3.0899424
                    + t2 * (1.2067492 + t2 * (0.2659732 + t2 * (0.0360768 + t2 * 0.0045813)))))
    } else {
        let t = 3.75 / x;
        (x.exp() / x.sqrt())
            * (0.39894228
                + t * (0.01328592
                    + t * (0.00225319
                        + t * (-0.00157565
                            + t * (0.00916281
                                + t * (-0.02057706
                                    + t * (0.02635537 + t * (-0.01647633 + t * 0.00392377))))))))
    }
}
