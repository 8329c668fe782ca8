//! Pitch (F0) tracking by the autocorrelation method
//!
//! Boersma (1993): each frame is Hanning-windowed over three periods of the
//! pitch floor, its autocorrelation is divided by the window's own
//! autocorrelation, and local maxima become candidates. A Viterbi pass then
//! picks one candidate (or "unvoiced") per frame.

use crate::utils::Fft;
use crate::window::hanning;
use crate::Sound;

/// Tuning of the candidate search and path finder; the defaults are Praat's
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PitchParams {
    pub periods_per_window: f64,
    pub max_candidates: usize,
    pub silence_threshold: f64,
    pub voicing_threshold: f64,
    pub octave_cost: f64,
    pub octave_jump_cost: f64,
    pub voiced_unvoiced_cost: f64,
}

impl Default for PitchParams {
    fn default() -> Self {
        Self {
            periods_per_window: 3.0,
            max_candidates: 15,
            silence_threshold: 0.03,
            voicing_threshold: 0.45,
            octave_cost: 0.01,
            octave_jump_cost: 0.35,
            voiced_unvoiced_cost: 0.14,
        }
    }
}

/// A pitch candidate for a single frame; frequency 0 means unvoiced
#[derive(Debug, Clone, Copy)]
pub struct PitchCandidate {
    pub frequency: f64,
    pub strength: f64,
}

/// Candidates of one frame; after path finding the winner sits at index 0
#[derive(Debug, Clone)]
struct PitchFrame {
    candidates: Vec<PitchCandidate>,
    intensity: f64,
}

impl PitchFrame {
    fn unvoiced(intensity: f64) -> Self {
        Self {
            candidates: vec![PitchCandidate {
                frequency: 0.0,
                strength: 0.0,
            }],
            intensity,
        }
    }
}

/// Frame-independent quantities of one analysis run
struct FrameSetup {
    dx: f64,
    x1: f64,
    window: Vec<f64>,
    window_autocorrelation: Vec<f64>,
    half_window: usize,
    period: usize,
    half_period: usize,
    max_lag: usize,
    fft_size: usize,
    global_peak: f64,
    floor: f64,
}

/// Pitch contour
#[derive(Debug, Clone)]
pub struct Pitch {
    frames: Vec<PitchFrame>,
    start_time: f64,
    time_step: f64,
    ceiling: f64,
}

impl Pitch {
    /// Track pitch with Praat's default parameters.
    ///
    /// `time_step <= 0` selects 0.75 / floor.
    pub fn from_sound(sound: &Sound, time_step: f64, floor: f64, ceiling: f64) -> Self {
        Self::from_sound_with(sound, time_step, floor, ceiling, &PitchParams::default())
    }

    pub fn from_sound_with(
        sound: &Sound,
        time_step: f64,
        floor: f64,
        ceiling: f64,
        params: &PitchParams,
    ) -> Self {
        let dx = sound.dx();
        let floor = floor.max(10.0);
        let ceiling = ceiling.min(0.5 / dx);
        let time_step = if time_step <= 0.0 {
            params.periods_per_window / floor / 4.0
        } else {
            time_step
        };
        let empty = Self {
            frames: Vec::new(),
            start_time: sound.start_time(),
            time_step,
            ceiling,
        };

        let nx = sound.num_samples();
        let window_duration = params.periods_per_window / floor;
        let half_window = ((window_duration / dx).floor() as usize / 2).saturating_sub(1);
        let duration = nx as f64 * dx;
        if half_window < 2 || duration < window_duration {
            return empty;
        }
        let window_len = 2 * half_window;

        let samples = sound.samples();
        let mean = samples.iter().sum::<f64>() / nx as f64;
        let global_peak = samples.iter().map(|s| (s - mean).abs()).fold(0.0, f64::max);
        if global_peak == 0.0 {
            return empty;
        }

        let fft_size = ((window_len as f64 * 1.5) as usize).next_power_of_two();
        let window = hanning(window_len);
        let mut fft = Fft::new();
        let mut padded = window.clone();
        padded.resize(fft_size, 0.0);
        let raw = fft.autocorrelation(&padded);
        let window_autocorrelation: Vec<f64> = raw[..=window_len].iter().map(|r| r / raw[0]).collect();

        let period = (1.0 / dx / floor).floor() as usize;
        let setup = FrameSetup {
            dx,
            x1: sound.x1(),
            max_lag: ((window_len as f64 / params.periods_per_window).floor() as usize + 2)
                .min(window_len / 2),
            window,
            window_autocorrelation,
            half_window,
            period,
            half_period: period / 2 + 1,
            fft_size,
            global_peak,
            floor,
        };

        let num_frames = ((duration - window_duration) / time_step).floor() as usize + 1;
        let mid_time = sound.x1() - 0.5 * dx + 0.5 * duration;
        let start_time = mid_time - 0.5 * num_frames as f64 * time_step + 0.5 * time_step;
        let max_candidates = params.max_candidates.max((ceiling / floor).floor() as usize);

        let mut frames: Vec<PitchFrame> = (0..num_frames)
            .map(|i| {
                let time = start_time + i as f64 * time_step;
                analyse_frame(samples, time, &setup, max_candidates, params, &mut fft)
            })
            .collect();

        find_path(&mut frames, params, ceiling, time_step);

        Self {
            frames,
            start_time,
            time_step,
            ceiling,
        }
    }

    /// F0 of every frame, 0.0 where unvoiced
    pub fn frequencies(&self) -> Vec<f64> {
        (0..self.frames.len())
            .map(|i| self.get_value_at_frame(i).unwrap_or(0.0))
            .collect()
    }

    /// F0 at a frame, `None` if unvoiced or out of range
    pub fn get_value_at_frame(&self, frame: usize) -> Option<f64> {
        let winner = self.frames.get(frame)?.candidates.first()?;
        (winner.frequency > 0.0 && winner.frequency < self.ceiling).then_some(winner.frequency)
    }

    pub fn is_voiced(&self, frame: usize) -> bool {
        self.get_value_at_frame(frame).is_some()
    }

    pub fn count_voiced(&self) -> usize {
        (0..self.frames.len()).filter(|&i| self.is_voiced(i)).count()
    }

    /// Mean F0 over voiced frames
    pub fn mean(&self) -> Option<f64> {
        let voiced: Vec<f64> = (0..self.frames.len())
            .filter_map(|i| self.get_value_at_frame(i))
            .collect();
        (!voiced.is_empty()).then(|| voiced.iter().sum::<f64>() / voiced.len() as f64)
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

    pub fn time_step(&self) -> f64 {
        self.time_step
    }

    pub fn start_time(&self) -> f64 {
        self.start_time
    }
}

/// Candidate search for the frame centred at `time`
fn analyse_frame(
    samples: &[f64],
    time: f64,
    setup: &FrameSetup,
    max_candidates: usize,
    params: &PitchParams,
    fft: &mut Fft,
) -> PitchFrame {
    let nx = samples.len() as isize;
    let left = ((time - setup.x1) / setup.dx).floor() as isize;
    let right = left + 1;
    let window_len = setup.window.len();

    // local mean over one longest period to both sides
    let mean_lo = (right - setup.period as isize).clamp(0, nx) as usize;
    let mean_hi = (left + setup.period as isize).clamp(0, nx) as usize;
    let local_mean = if mean_hi > mean_lo {
        samples[mean_lo..mean_hi].iter().sum::<f64>() / (mean_hi - mean_lo) as f64
    } else {
        0.0
    };

    let lo = (right - setup.half_window as isize).clamp(0, nx) as usize;
    let hi = (left + setup.half_window as isize).clamp(0, nx) as usize;
    let mut frame = vec![0.0; setup.fft_size];
    for (j, i) in (lo..hi).take(window_len).enumerate() {
        frame[j] = (samples[i] - local_mean) * setup.window[j];
    }

    let peak_lo = setup.half_window.saturating_sub(setup.half_period);
    let peak_hi = (setup.half_window + setup.half_period).min(window_len);
    let local_peak = frame[peak_lo..peak_hi].iter().map(|v| v.abs()).fold(0.0, f64::max);
    let intensity = (local_peak / setup.global_peak).min(1.0);

    let mut result = PitchFrame::unvoiced(intensity);
    if local_peak == 0.0 {
        return result;
    }

    let ac = fft.autocorrelation(&frame);
    if ac[0] <= 0.0 {
        return result;
    }
    let r: Vec<f64> = (0..=setup.max_lag + 1)
        .map(|lag| {
            let w = setup.window_autocorrelation[lag];
            if w.abs() > 1e-10 {
                ac[lag] / (ac[0] * w)
            } else {
                0.0
            }
        })
        .collect();

    let octave_score = |c: &PitchCandidate| c.strength - params.octave_cost * (setup.floor / c.frequency).log2();

    for lag in 2..=setup.max_lag {
        let (prev, here, next) = (r[lag - 1], r[lag], r[lag + 1]);
        if here <= 0.5 * params.voicing_threshold || here <= prev || here < next {
            continue;
        }
        let dr = 0.5 * (next - prev);
        let d2r = 2.0 * here - prev - next;
        if d2r <= 0.0 {
            continue;
        }

        let refined_lag = lag as f64 + dr / d2r;
        let mut strength = here + 0.5 * dr * dr / d2r;
        if strength > 1.0 {
            strength = 1.0 / strength;
        }
        let candidate = PitchCandidate {
            frequency: 1.0 / setup.dx / refined_lag,
            strength,
        };

        if result.candidates.len() < max_candidates {
            result.candidates.push(candidate);
            continue;
        }
        let weakest = result
            .candidates
            .iter()
            .enumerate()
            .skip(1)
            .map(|(place, c)| (place, octave_score(c)))
            .min_by(|a, b| a.1.total_cmp(&b.1));
        if let Some((place, weakest_score)) = weakest {
            if octave_score(&candidate) > weakest_score {
                result.candidates[place] = candidate;
            }
        }
    }

    result
}

/// Viterbi selection; leaves the winning candidate of each frame at index 0
fn find_path(frames: &mut [PitchFrame], params: &PitchParams, ceiling: f64, time_step: f64) {
    let Some(last) = frames.len().checked_sub(1) else {
        return;
    };

    let correction = 0.01 / time_step;
    let jump_cost = params.octave_jump_cost * correction;
    let voicing_cost = params.voiced_unvoiced_cost * correction;
    let voiceless = |f: f64| f <= 0.0 || f >= ceiling;

    let mut delta: Vec<Vec<f64>> = frames
        .iter()
        .map(|frame| {
            let unvoiced_strength = if params.silence_threshold <= 0.0 {
                0.0
            } else {
                params.voicing_threshold
                    + (2.0
                        - frame.intensity / (params.silence_threshold / (1.0 + params.voicing_threshold)))
                        .max(0.0)
            };
            frame
                .candidates
                .iter()
                .map(|c| {
                    if voiceless(c.frequency) {
                        unvoiced_strength
                    } else {
                        c.strength - params.octave_cost * (ceiling / c.frequency).log2()
                    }
                })
                .collect()
        })
        .collect();
    let mut psi: Vec<Vec<usize>> = frames.iter().map(|f| vec![0; f.candidates.len()]).collect();

    for i in 1..frames.len() {
        for (k2, c2) in frames[i].candidates.iter().enumerate() {
            let mut best = f64::NEG_INFINITY;
            let mut place = 0;
            for (k1, c1) in frames[i - 1].candidates.iter().enumerate() {
                let transition = match (voiceless(c1.frequency), voiceless(c2.frequency)) {
                    (true, true) => 0.0,
                    (true, false) | (false, true) => voicing_cost,
                    (false, false) => jump_cost * (c1.frequency / c2.frequency).log2().abs(),
                };
                let value = delta[i - 1][k1] - transition;
                if value > best {
                    best = value;
                    place = k1;
                }
            }
            delta[i][k2] += best;
            psi[i][k2] = place;
        }
    }

    let mut place = delta[last]
        .iter()
        .enumerate()
        .fold((0, f64::NEG_INFINITY), |acc, (k, &v)| if v > acc.1 { (k, v) } else { acc })
        .0;
    for i in (0..frames.len()).rev() {
        let previous = psi[i][place];
        frames[i].candidates.swap(0, place);
        place = previous;
    }
}

impl Sound {
    /// Pitch contour between `floor` and `ceiling` Hz
    pub fn to_pitch(&self, time_step: f64, floor: f64, ceiling: f64) -> Pitch {
        Pitch::from_sound(self, time_step, floor, ceiling)
    }
}
