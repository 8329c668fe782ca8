//! Sound type for recorded trial signals
//!
//! A `Sound` holds mono samples with their sample rate. Trials arrive as raw
//! sample vectors from the per-trial container files, so there is no audio
//! file decoding here; the analysis constructors (`to_intensity`, `to_pitch`,
//! `to_formant_burg`) live next to their result types.

use std::f64::consts::PI;

use num_complex::Complex;

use crate::utils::Fft;

/// Audio samples with associated sample rate and timing information
#[derive(Debug, Clone)]
pub struct Sound {
    /// Mono samples
    samples: Vec<f64>,
    /// Sample rate in Hz
    sample_rate: f64,
    /// Start time of the first sample (usually 0.0)
    start_time: f64,
}

impl Sound {
    /// Create a Sound from borrowed samples
    ///
    /// # Example
    /// ```
    /// use perturb_tracks::Sound;
    ///
    /// let sound = Sound::from_samples(&[0.0, 0.5, 1.0, 0.5], 16000.0);
    /// assert_eq!(sound.num_samples(), 4);
    /// ```
    pub fn from_samples(samples: &[f64], sample_rate: f64) -> Self {
        Self::from_samples_owned(samples.to_vec(), sample_rate)
    }

    /// Create a Sound from owned samples (avoids cloning)
    pub fn from_samples_owned(samples: Vec<f64>, sample_rate: f64) -> Self {
        Self {
            samples,
            sample_rate,
            start_time: 0.0,
        }
    }

    /// Get the sample rate in Hz
    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    /// Get a reference to the samples
    pub fn samples(&self) -> &[f64] {
        &self.samples
    }

    /// Get the number of samples
    pub fn num_samples(&self) -> usize {
        self.samples.len()
    }

    /// Get the total duration in seconds
    pub fn duration(&self) -> f64 {
        self.samples.len() as f64 / self.sample_rate
    }

    /// Get the start time
    pub fn start_time(&self) -> f64 {
        self.start_time
    }

    /// Get the end time (time just after the last sample)
    pub fn end_time(&self) -> f64 {
        self.start_time + self.duration()
    }

    /// Sample period (Praat's `dx`)
    pub fn dx(&self) -> f64 {
        1.0 / self.sample_rate
    }

    /// Centre time of the first sample (Praat's `x1`)
    pub fn x1(&self) -> f64 {
        self.start_time + 0.5 * self.dx()
    }

    /// Samples from `index` to the end, as a new Sound starting at time zero
    pub fn slice_from(&self, index: usize) -> Sound {
        self.slice(index, self.samples.len())
    }

    /// Samples in `start..end` (clamped), as a new Sound starting at time zero
    pub fn slice(&self, start: usize, end: usize) -> Sound {
        let end = end.min(self.samples.len());
        let start = start.min(end);
        Sound::from_samples(&self.samples[start..end], self.sample_rate)
    }

    /// First-order pre-emphasis: y[n] = x[n] - alpha * x[n-1]
    /// with alpha = exp(-2π · from_frequency / sample_rate)
    pub fn pre_emphasis(&self, from_frequency: f64) -> Sound {
        if self.samples.is_empty() {
            return self.clone();
        }

        let alpha = (-2.0 * PI * from_frequency / self.sample_rate).exp();
        let mut filtered = Vec::with_capacity(self.samples.len());
        filtered.push(self.samples[0]);
        filtered.extend(self.samples.windows(2).map(|w| w[1] - alpha * w[0]));

        Sound {
            samples: filtered,
            sample_rate: self.sample_rate,
            start_time: self.start_time,
        }
    }

    /// Resample to a new rate.
    ///
    /// Downsampling first removes everything above the new Nyquist frequency
    /// in the FFT domain; new samples are then read off with a Hanning-windowed
    /// sinc interpolator (depth 50) on Praat's sample grid.
    pub fn resample(&self, new_sample_rate: f64) -> Sound {
        let ratio = new_sample_rate / self.sample_rate;
        if self.samples.is_empty() || (ratio - 1.0).abs() < 1e-6 {
            return self.clone();
        }

        let new_len = (self.duration() * new_sample_rate).round() as usize;
        if new_len == 0 {
            return Sound {
                samples: Vec::new(),
                sample_rate: new_sample_rate,
                start_time: self.start_time,
            };
        }

        let source = if ratio < 1.0 {
            self.lowpass(ratio)
        } else {
            self.samples.clone()
        };

        let old_dx = self.dx();
        let new_dx = 1.0 / new_sample_rate;
        let old_x1 = self.x1();
        let new_x1 = self.start_time + 0.5 * (self.duration() - (new_len - 1) as f64 * new_dx);

        let samples = (0..new_len)
            .map(|i| {
                let x = new_x1 + i as f64 * new_dx;
                windowed_sinc(&source, (x - old_x1) / old_dx, 50)
            })
            .collect();

        Sound {
            samples,
            sample_rate: new_sample_rate,
            start_time: self.start_time,
        }
    }

    /// Zero all FFT bins at or above `ratio` × Nyquist
    fn lowpass(&self, ratio: f64) -> Vec<f64> {
        const GUARD: usize = 1000;

        let n = self.samples.len();
        let nfft = (n + 2 * GUARD).next_power_of_two();
        let mut padded = vec![0.0; nfft];
        padded[GUARD..GUARD + n].copy_from_slice(&self.samples);

        let mut fft = Fft::new();
        let mut spectrum = fft.real_fft(&padded, nfft);

        let half = nfft / 2;
        let cutoff = ((ratio * half as f64).floor() as usize).min(half);
        let zero = Complex::new(0.0, 0.0);
        for bin in cutoff..=half {
            spectrum[bin] = zero;
            if bin != 0 && bin != half {
                spectrum[nfft - bin] = zero;
            }
        }

        fft.inverse_fft(&spectrum)[GUARD..GUARD + n]
            .iter()
            .map(|c| c.re)
            .collect()
    }

    /// Create a pure tone (sine wave)
    pub fn create_tone(
        frequency: f64,
        duration: f64,
        sample_rate: f64,
        amplitude: f64,
        phase: f64,
    ) -> Sound {
        let n_samples = (duration * sample_rate).round() as usize;
        let omega = 2.0 * PI * frequency / sample_rate;
        let samples = (0..n_samples)
            .map(|i| amplitude * (omega * i as f64 + phase).sin())
            .collect();
        Sound::from_samples_owned(samples, sample_rate)
    }

    /// Create silence
    pub fn create_silence(duration: f64, sample_rate: f64) -> Sound {
        let n_samples = (duration * sample_rate).round() as usize;
        Sound::from_samples_owned(vec![0.0; n_samples], sample_rate)
    }

    /// Root-mean-square amplitude
    pub fn rms(&self) -> f64 {
        if self.samples.is_empty() {
            return 0.0;
        }
        let sum_sq: f64 = self.samples.iter().map(|&s| s * s).sum();
        (sum_sq / self.samples.len() as f64).sqrt()
    }
}

/// Hanning-windowed sinc interpolation at a fractional 0-based position.
/// Positions outside the signal take the nearest edge sample.
fn windowed_sinc(samples: &[f64], position: f64, max_depth: usize) -> f64 {
    let n = samples.len();
    if n == 0 {
        return f64::NAN;
    }
    if position <= 0.0 {
        return samples[0];
    }
    if position >= (n - 1) as f64 {
        return samples[n - 1];
    }

    let left = position.floor() as usize;
    if position == left as f64 {
        return samples[left];
    }

    let depth = max_depth.min(left + 1).min(n - 1 - left);
    let half_width = depth as f64 + 0.5;

    let mut acc = 0.0;
    for i in (left + 1 - depth)..=(left + depth) {
        let distance = position - i as f64;
        let phase = PI * distance;
        let window = 0.5 + 0.5 * (phase / half_width).cos();
        acc += samples[i] * phase.sin() / phase * window;
    }
    acc
}
