//! Formant tracks by Burg linear prediction
//!
//! The sound is resampled to twice the formant ceiling and pre-emphasized;
//! each frame is Gaussian-windowed over twice the nominal window length and
//! fitted with an LPC polynomial of order 2 × max_formants. Roots of that
//! polynomial give the resonances F1, F2, ... in ascending order.

use crate::interpolation::Interpolation;
use crate::utils::lpc::{lpc_burg, lpc_to_formants};
use crate::window::formant_gaussian;
use crate::Sound;

/// Frequency and bandwidth of one formant; NaN when undefined
#[derive(Debug, Clone, Copy)]
pub struct FormantPoint {
    pub frequency: f64,
    pub bandwidth: f64,
}

impl FormantPoint {
    const UNDEFINED: FormantPoint = FormantPoint {
        frequency: f64::NAN,
        bandwidth: f64::NAN,
    };
}

/// Formant contour; every frame holds exactly `max_num_formants` points
#[derive(Debug, Clone)]
pub struct Formant {
    frames: Vec<Vec<FormantPoint>>,
    start_time: f64,
    time_step: f64,
    max_num_formants: usize,
}

impl Formant {
    /// Burg analysis.
    ///
    /// # Arguments
    /// * `time_step` - Frame step; `<= 0` means a quarter of `window_length`
    /// * `max_num_formants` - Formants per frame (LPC order is twice this)
    /// * `ceiling` - Highest formant frequency; the sound is resampled to 2 × ceiling
    /// * `window_length` - Nominal window; the Gaussian spans twice this
    /// * `pre_emphasis_from` - Pre-emphasis corner frequency in Hz
    pub fn from_sound_burg(
        sound: &Sound,
        time_step: f64,
        max_num_formants: usize,
        ceiling: f64,
        window_length: f64,
        pre_emphasis_from: f64,
    ) -> Self {
        let max_num_formants = max_num_formants.clamp(1, 10);
        let ceiling = ceiling.min(0.5 * sound.sample_rate());
        let time_step = if time_step <= 0.0 {
            window_length / 4.0
        } else {
            time_step
        };
        let mut result = Self {
            frames: Vec::new(),
            start_time: sound.start_time(),
            time_step,
            max_num_formants,
        };

        let resampled = if sound.sample_rate() > 2.0 * ceiling {
            sound.resample(2.0 * ceiling)
        } else {
            sound.clone()
        };
        let emphasized = if pre_emphasis_from > 0.0 {
            resampled.pre_emphasis(pre_emphasis_from)
        } else {
            resampled
        };

        let samples = emphasized.samples();
        let sample_rate = emphasized.sample_rate();
        let dx = emphasized.dx();
        let x1 = emphasized.x1();
        let window_duration = 2.0 * window_length;
        let window_len = (window_duration / dx).floor() as usize;
        let half = window_len / 2;
        let duration = samples.len() as f64 * dx;
        if samples.is_empty() || window_len == 0 || duration < window_duration {
            return result;
        }

        let window = formant_gaussian(window_len);
        let num_frames = ((duration - window_duration) / time_step).floor() as usize + 1;
        let start_time = x1 + 0.5 * (duration - dx - (num_frames - 1) as f64 * time_step);
        let order = 2 * max_num_formants;
        let nx = samples.len() as isize;

        result.start_time = start_time;
        result.frames = (0..num_frames)
            .map(|frame| {
                let t = start_time + frame as f64 * time_step;
                let left = ((t - x1) / dx).floor() as isize;
                let lo = (left + 1 - half as isize).clamp(0, nx) as usize;
                let hi = (left + half as isize + 1).clamp(0, nx) as usize;
                let windowed: Vec<f64> = samples[lo..hi]
                    .iter()
                    .zip(&window)
                    .map(|(s, w)| s * w)
                    .collect();

                let mut points: Vec<FormantPoint> = lpc_burg(&windowed, order)
                    .map(|lpc| lpc_to_formants(&lpc.coefficients, sample_rate))
                    .unwrap_or_default()
                    .into_iter()
                    .filter(|c| {
                        c.frequency > 50.0
                            && c.frequency < ceiling
                            && c.bandwidth > 0.0
                            && c.bandwidth < ceiling
                            && c.bandwidth < 2.0 * c.frequency
                    })
                    .take(max_num_formants)
                    .map(|c| FormantPoint {
                        frequency: c.frequency,
                        bandwidth: c.bandwidth,
                    })
                    .collect();
                points.resize(max_num_formants, FormantPoint::UNDEFINED);
                points
            })
            .collect();

        result
    }

    /// Frequency of formant `formant_number` (1 = F1) at `time`.
    ///
    /// `None` outside the analysed range or where the formant is undefined.
    pub fn get_value_at_time(
        &self,
        formant_number: usize,
        time: f64,
        interpolation: Interpolation,
    ) -> Option<f64> {
        if formant_number == 0 || formant_number > self.max_num_formants || self.frames.is_empty() {
            return None;
        }
        let position = (time - self.start_time) / self.time_step;
        if position < -0.5 || position > self.frames.len() as f64 - 0.5 {
            return None;
        }
        let track: Vec<f64> = self
            .frames
            .iter()
            .map(|points| points[formant_number - 1].frequency)
            .collect();
        let last = (track.len() - 1) as f64;
        interpolation.interpolate_with_undefined(&track, position.clamp(0.0, last))
    }

    pub fn get_value_at_frame(&self, formant_number: usize, frame: usize) -> Option<f64> {
        let point = self.frames.get(frame)?.get(formant_number.checked_sub(1)?)?;
        (!point.frequency.is_nan()).then_some(point.frequency)
    }

    /// Frequencies of one formant across all frames, NaN where undefined
    pub fn track(&self, formant_number: usize) -> Vec<f64> {
        (0..self.frames.len())
            .map(|i| self.get_value_at_frame(formant_number, i).unwrap_or(f64::NAN))
            .collect()
    }

    pub fn get_time_from_frame(&self, frame: usize) -> f64 {
        self.start_time + frame as f64 * self.time_step
    }

    pub fn times(&self) -> Vec<f64> {
        (0..self.frames.len()).map(|i| self.get_time_from_frame(i)).collect()
    }

    pub fn num_frames(&self) -> usize {
        self.frames.len()
    }

    pub fn max_num_formants(&self) -> usize {
        self.max_num_formants
    }

    pub fn time_step(&self) -> f64 {
        self.time_step
    }
}

impl Sound {
    /// Formant contour by Burg's method, see [`Formant::from_sound_burg`]
    pub fn to_formant_burg(
        &self,
        time_step: f64,
        max_num_formants: usize,
        ceiling: f64,
        window_length: f64,
        pre_emphasis_from: f64,
    ) -> Formant {
        Formant::from_sound_burg(
            self,
            time_step,
            max_num_formants,
            ceiling,
            window_length,
            pre_emphasis_from,
        )
    }
}
