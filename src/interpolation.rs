//! Interpolation for querying frame-based analysis results at arbitrary times
//!
//! Frame values use NaN for "undefined" (e.g. a frame where no formant was
//! found). Queries skip undefined neighbours instead of propagating NaN.

/// Interpolation methods
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Interpolation {
    /// Linear interpolation between adjacent frames
    #[default]
    Linear,
}

impl Interpolation {
    /// Interpolate at a fractional frame `position` (0.0 = first frame).
    ///
    /// Returns `None` outside `[0, n - 1]` or when the relevant frames are all
    /// undefined.
    pub fn interpolate_with_undefined(self, values: &[f64], position: f64) -> Option<f64> {
        let n = values.len();
        if n == 0 || position < 0.0 || position > (n - 1) as f64 {
            return None;
        }

        match self {
            Interpolation::Linear => {
                let idx = (position.floor() as usize).min(n - 1);
                let frac = position - idx as f64;
                let v0 = values[idx];
                let v1 = values.get(idx + 1).copied().unwrap_or(v0);

                match (v0.is_nan(), v1.is_nan()) {
                    (true, true) => None,
                    (true, false) => Some(v1),
                    (false, true) => Some(v0),
                    (false, false) => Some(lerp(v0, v1, frac)),
                }
            }
        }
    }
}

/// Linear interpolation between two values
pub fn lerp(a: f64, b: f64, t: f64) -> f64 {
    a + t * (b - a)
}
