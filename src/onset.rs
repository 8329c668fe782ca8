//! Speech onset detection
//!
//! Speech is taken to start once the signal is both loud (intensity within
//! `drop_db` of the trial's peak) and voiced (a non-zero pitch frame). Each
//! criterion gives a crossing time; the onset is the later of the two.

use crate::experiment::Gender;
use crate::{Intensity, Pitch, Sound};

/// Minimum pitch of the onset intensity analysis (Hz)
pub const ONSET_MIN_PITCH: f64 = 100.0;

/// Crossing times of both criteria; `f64::INFINITY` where never met
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Onset {
    pub intensity: f64,
    pub voicing: f64,
}

impl Onset {
    pub fn time(&self) -> f64 {
        self.intensity.max(self.voicing)
    }

    pub fn is_found(&self) -> bool {
        self.time().is_finite()
    }
}

/// Intensity and voicing crossings of one trial, with automatic time steps
pub fn detect_onset(sound: &Sound, gender: Gender, drop_db: f64) -> Onset {
    let intensity = sound.to_intensity(ONSET_MIN_PITCH, 0.0);
    let (floor, ceiling) = gender.pitch_range();
    let pitch = sound.to_pitch(0.0, floor, ceiling);
    Onset {
        intensity: intensity_crossing(&intensity, drop_db),
        voicing: voicing_crossing(&pitch),
    }
}

/// Time of the first frame louder than `peak - drop_db`
pub fn intensity_crossing(intensity: &Intensity, drop_db: f64) -> f64 {
    let values = intensity.values();
    let peak = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let threshold = peak - drop_db;
    values
        .iter()
        .position(|&v| v > threshold)
        .map_or(f64::INFINITY, |frame| intensity.get_time_from_frame(frame))
}

/// Time of the first voiced frame
pub fn voicing_crossing(pitch: &Pitch) -> f64 {
    (0..pitch.num_frames())
        .find(|&frame| pitch.is_voiced(frame))
        .map_or(f64::INFINITY, |frame| pitch.get_time_from_frame(frame))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn delayed_tone(delay: f64, tone: f64, sample_rate: f64) -> Sound {
        let mut samples = Sound::create_silence(delay, sample_rate).samples().to_vec();
        samples.extend_from_slice(Sound::create_tone(180.0, tone, sample_rate, 0.5, 0.0).samples());
        Sound::from_samples_owned(samples, sample_rate)
    }

    #[test]
    fn test_onset_after_leading_silence() {
        let onset = detect_onset(&delayed_tone(0.2, 0.4, 16000.0), Gender::Female, 10.0);
        assert!(onset.is_found());
        assert!(onset.time() >= onset.intensity);
        assert!(onset.time() >= onset.voicing);
        assert!(onset.time() > 0.15 && onset.time() < 0.3, "onset at {}", onset.time());
    }

    #[test]
    fn test_silence_has_no_onset() {
        let onset = detect_onset(&Sound::create_silence(0.5, 16000.0), Gender::Male, 10.0);
        assert_eq!(onset.voicing, f64::INFINITY);
        assert!(!onset.is_found());
    }

    #[test]
    fn test_too_short_has_no_onset() {
        let onset = detect_onset(&Sound::create_tone(200.0, 0.01, 16000.0, 0.5, 0.0), Gender::Male, 10.0);
        assert_eq!(onset.intensity, f64::INFINITY);
        assert_eq!(onset.time(), f64::INFINITY);
    }
}
