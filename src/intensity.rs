//! Intensity (loudness) contours in dB
//!
//! Follows Praat's `Sound: To Intensity`: a Kaiser-Bessel window of physical
//! length 6.4 / min_pitch, mean-square energy weighted by the window, and
//! frame placement by Praat's short-term analysis rule (frames centred on the
//! signal).

use crate::window::intensity_kaiser;
use crate::Sound;

/// Reference pressure for dB SPL (2·10⁻⁵ Pa)
const REFERENCE_PRESSURE: f64 = 2e-5;

/// Value Praat stores for frames with no measurable energy
pub const SILENT_DB: f64 = -300.0;

/// Intensity contour representing energy over time
#[derive(Debug, Clone)]
pub struct Intensity {
    /// Intensity values in dB
    values: Vec<f64>,
    /// Time of first frame centre
    start_time: f64,
    /// Time step between frames
    time_step: f64,
}

impl Intensity {
    /// Compute intensity from a Sound.
    ///
    /// # Arguments
    /// * `min_pitch` - Lowest expected F0 (Hz); sets the window length
    /// * `time_step` - Frame step in seconds; `<= 0` means 0.8 / min_pitch
    /// * `subtract_mean` - Remove the local mean before squaring
    pub fn from_sound(sound: &Sound, min_pitch: f64, time_step: f64, subtract_mean: bool) -> Self {
        let min_pitch = min_pitch.max(1.0);
        let logical_window = 3.2 / min_pitch;
        let physical_window = 2.0 * logical_window;
        let time_step = if time_step <= 0.0 {
            logical_window / 4.0
        } else {
            time_step
        };

        let nx = sound.num_samples();
        let dx = sound.dx();
        let duration = nx as f64 * dx;
        if nx == 0 || physical_window > duration {
            return Self {
                values: Vec::new(),
                start_time: sound.start_time(),
                time_step,
            };
        }

        let half_duration = 0.5 * physical_window;
        let half = (half_duration / dx).floor() as usize;
        let window = intensity_kaiser(half, dx, half_duration);

        let num_frames = ((duration - physical_window) / time_step).floor() as usize + 1;
        let x1 = sound.x1();
        let mid_time = x1 - 0.5 * dx + 0.5 * duration;
        let first_time = mid_time - 0.5 * num_frames as f64 * time_step + 0.5 * time_step;

        let samples = sound.samples();
        let reference = REFERENCE_PRESSURE * REFERENCE_PRESSURE;

        let values = (0..num_frames)
            .map(|frame| {
                let t = first_time + frame as f64 * time_step;
                let centre = ((t - x1) / dx).round() as i64;
                let lo = (centre - half as i64).max(0) as usize;
                let hi = ((centre + half as i64) as usize).min(nx - 1);
                if hi < lo {
                    return SILENT_DB;
                }
                let offset = centre - half as i64;

                let mean = if subtract_mean {
                    samples[lo..=hi].iter().sum::<f64>() / (hi - lo + 1) as f64
                } else {
                    0.0
                };

                let mut sum_xw = 0.0;
                let mut sum_w = 0.0;
                for i in lo..=hi {
                    let w = window[(i as i64 - offset) as usize];
                    let s = samples[i] - mean;
                    sum_xw += s * s * w;
                    sum_w += w;
                }

                let relative = if sum_w > 0.0 { sum_xw / sum_w } else { 0.0 } / reference;
                if relative < 1e-30 {
                    SILENT_DB
                } else {
                    10.0 * relative.log10()
                }
            })
            .collect();

        Self {
            values,
            start_time: first_time,
            time_step,
        }
    }

    /// Centre time of a frame
    pub fn get_time_from_frame(&self, frame: usize) -> f64 {
        self.start_time + frame as f64 * self.time_step
    }

    /// Centre times of all frames
    pub fn times(&self) -> Vec<f64> {
        (0..self.values.len()).map(|i| self.get_time_from_frame(i)).collect()
    }

    /// All intensity values
    pub fn values(&self) -> &[f64] {
        &self.values
    }

    /// Number of frames
    pub fn num_frames(&self) -> usize {
        self.values.len()
    }

    /// Time step between frames
    pub fn time_step(&self) -> f64 {
        self.time_step
    }

    /// Centre time of the first frame
    pub fn start_time(&self) -> f64 {
        self.start_time
    }
}

impl Sound {
    /// Intensity contour with mean subtraction (Praat's default)
    pub fn to_intensity(&self, min_pitch: f64, time_step: f64) -> Intensity {
        Intensity::from_sound(self, min_pitch, time_step, true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn peak(intensity: &Intensity) -> f64 {
        intensity.values().iter().copied().fold(SILENT_DB, f64::max)
    }

    #[test]
    fn test_steady_tone_is_flat() {
        let sound = Sound::create_tone(440.0, 0.5, 16000.0, 0.1, 0.0);
        let intensity = sound.to_intensity(100.0, 0.0);
        assert!(intensity.num_frames() > 10);

        let values = intensity.values();
        let mean = values.iter().sum::<f64>() / values.len() as f64;
        for &v in values {
            assert!((v - mean).abs() < 1.0, "{} vs {}", v, mean);
        }
        // 0.1 amplitude sine: 10·log10(0.005 / 4e-10) ≈ 70.97 dB
        assert_relative_eq!(mean, 70.97, epsilon = 0.5);
    }

    #[test]
    fn test_silence_is_floor() {
        let intensity = Sound::create_silence(0.3, 16000.0).to_intensity(100.0, 0.0);
        assert!(intensity.num_frames() > 0);
        assert!(intensity.values().iter().all(|&v| v == SILENT_DB));
    }

    #[test]
    fn test_doubling_amplitude_adds_six_db() {
        let quiet = Sound::create_tone(440.0, 0.5, 16000.0, 0.1, 0.0).to_intensity(100.0, 0.01);
        let loud = Sound::create_tone(440.0, 0.5, 16000.0, 0.2, 0.0).to_intensity(100.0, 0.01);
        assert_relative_eq!(peak(&loud) - peak(&quiet), 6.02, epsilon = 0.3);
    }

    #[test]
    fn test_too_short_for_window() {
        let intensity = Sound::create_tone(440.0, 0.03, 16000.0, 0.1, 0.0).to_intensity(100.0, 0.0);
        assert_eq!(intensity.num_frames(), 0);
        assert!(intensity.times().is_empty());
    }

    #[test]
    fn test_frames_are_centred() {
        let sound = Sound::create_tone(440.0, 0.5, 16000.0, 0.1, 0.0);
        let intensity = sound.to_intensity(100.0, 0.01);
        let times = intensity.times();
        let first = times[0];
        let last = times[times.len() - 1];
        assert_relative_eq!(first + last, sound.duration(), epsilon = 1e-9);
    }
}
