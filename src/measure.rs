//! Tracked measures and the analyses that produce them
//!
//! F1 and F2 come from one Burg formant analysis in formant experiments; pitch
//! comes from the autocorrelation tracker in pitch experiments. Everything a
//! stage needs to know about a measure (which experiment yields it, the table
//! keys it is stored under, plot ranges and colours) hangs off [`Measure`].

use crate::experiment::{Condition, ExperimentKind, Gender};
use crate::{Formant, Pitch, RunConfig, Sound};

/// A track extracted per trial
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Measure {
    F1,
    F2,
    Pitch,
}

/// RGB triple
pub type Rgb = (u8, u8, u8);

const BLACK: Rgb = (0, 0, 0);

impl Measure {
    /// Plot column order
    pub const ALL: [Measure; 3] = [Measure::F1, Measure::F2, Measure::Pitch];

    /// Measures read from one analysis of the given experiment kind
    pub fn of_experiment(kind: ExperimentKind) -> &'static [Measure] {
        match kind {
            ExperimentKind::F1 => &[Measure::F1, Measure::F2],
            ExperimentKind::F0 => &[Measure::Pitch],
        }
    }

    /// Panel title suffix
    pub fn label(self) -> &'static str {
        match self {
            Measure::F1 => "F1",
            Measure::F2 => "F2",
            Measure::Pitch => "Pitch",
        }
    }

    /// Key of the raw track in trial records, prefix of the aggregate keys
    pub fn stats_key(self) -> &'static str {
        match self {
            Measure::F1 => "F1",
            Measure::F2 => "F2",
            Measure::Pitch => "pitch",
        }
    }

    pub fn mean_key(self) -> String {
        format!("{}_mean", self.stats_key())
    }

    pub fn std_key(self) -> String {
        format!("{}_std", self.stats_key())
    }

    pub fn mean_diff_key(self) -> String {
        format!("{}_mean_diff", self.stats_key())
    }

    pub fn std_diff_key(self) -> String {
        format!("{}_std_diff", self.stats_key())
    }

    pub fn experiment(self) -> ExperimentKind {
        match self {
            Measure::F1 | Measure::F2 => ExperimentKind::F1,
            Measure::Pitch => ExperimentKind::F0,
        }
    }

    /// Frequency axis of mean and trial panels (Hz)
    pub fn y_range(self) -> (f64, f64) {
        match self {
            Measure::F1 => (0.0, 1200.0),
            Measure::F2 => (1200.0, 2400.0),
            Measure::Pitch => (75.0, 375.0),
        }
    }

    /// Frequency axis of difference panels (Hz)
    pub fn diff_range(self) -> (f64, f64) {
        match self {
            Measure::F1 | Measure::F2 => (-200.0, 200.0),
            Measure::Pitch => (-50.0, 50.0),
        }
    }

    pub fn color(self, condition: Condition) -> Rgb {
        match (self.experiment(), condition) {
            (_, Condition::NoShift) => BLACK,
            (ExperimentKind::F1, Condition::ShiftUp) => (0x77, 0xAC, 0x30),
            (ExperimentKind::F1, Condition::ShiftDown) => (0xD9, 0x53, 0x19),
            (ExperimentKind::F0, Condition::ShiftUp) => (0xA2, 0x14, 0x2F),
            (ExperimentKind::F0, Condition::ShiftDown) => (0x00, 0x72, 0xBD),
        }
    }
}

/// Parameters of the per-trial analyses
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AnalysisSettings {
    pub time_step: f64,
    pub max_formants: usize,
    pub ceiling: f64,
    pub window_length: f64,
    pub pre_emphasis_from: f64,
    pub pitch_floor: f64,
    pub pitch_ceiling: f64,
}

impl AnalysisSettings {
    pub fn new(config: &RunConfig, gender: Gender, ceiling: f64) -> Self {
        let (pitch_floor, pitch_ceiling) = gender.pitch_range();
        Self {
            time_step: config.time_step,
            max_formants: config.max_formants,
            ceiling,
            window_length: config.formant_window_length,
            pre_emphasis_from: config.pre_emphasis_from,
            pitch_floor,
            pitch_ceiling,
        }
    }
}

/// One analysis of a trial; all measures of its experiment are read from it
#[derive(Debug, Clone)]
pub enum Analysis {
    Formant(Formant),
    Pitch(Pitch),
}

impl Analysis {
    pub fn run(kind: ExperimentKind, sound: &Sound, settings: &AnalysisSettings) -> Self {
        match kind {
            ExperimentKind::F1 => Analysis::Formant(sound.to_formant_burg(
                settings.time_step,
                settings.max_formants,
                settings.ceiling,
                settings.window_length,
                settings.pre_emphasis_from,
            )),
            ExperimentKind::F0 => Analysis::Pitch(sound.to_pitch(
                settings.time_step,
                settings.pitch_floor,
                settings.pitch_ceiling,
            )),
        }
    }

    /// Frame centre times
    pub fn times(&self) -> Vec<f64> {
        match self {
            Analysis::Formant(formant) => formant.times(),
            Analysis::Pitch(pitch) => pitch.times(),
        }
    }

    /// Per-frame values; NaN for undefined formants, 0 for unvoiced pitch.
    /// Empty when the measure does not come from this analysis.
    pub fn track(&self, measure: Measure) -> Vec<f64> {
        match (self, measure) {
            (Analysis::Formant(formant), Measure::F1) => formant.track(1),
            (Analysis::Formant(formant), Measure::F2) => formant.track(2),
            (Analysis::Pitch(pitch), Measure::Pitch) => pitch.frequencies(),
            _ => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keys() {
        assert_eq!(Measure::F1.mean_key(), "F1_mean");
        assert_eq!(Measure::F2.std_diff_key(), "F2_std_diff");
        assert_eq!(Measure::Pitch.mean_diff_key(), "pitch_mean_diff");
        assert_eq!(Measure::Pitch.label(), "Pitch");
    }

    #[test]
    fn test_experiment_mapping() {
        for kind in [ExperimentKind::F1, ExperimentKind::F0] {
            for measure in Measure::of_experiment(kind) {
                assert_eq!(measure.experiment(), kind);
            }
        }
    }

    #[test]
    fn test_palettes() {
        assert_eq!(Measure::F2.color(Condition::NoShift), (0, 0, 0));
        assert_eq!(Measure::F1.color(Condition::ShiftUp), (0x77, 0xAC, 0x30));
        assert_eq!(Measure::Pitch.color(Condition::ShiftDown), (0x00, 0x72, 0xBD));
    }

    #[test]
    fn test_pitch_track_of_tone() {
        let sound = Sound::create_tone(200.0, 0.3, 16000.0, 0.5, 0.0);
        let settings = AnalysisSettings::new(&RunConfig::default(), Gender::Female, 5500.0);
        let analysis = Analysis::run(ExperimentKind::F0, &sound, &settings);
        let track = analysis.track(Measure::Pitch);
        assert_eq!(track.len(), analysis.times().len());
        assert!(!track.is_empty());
        assert!(analysis.track(Measure::F1).is_empty());
        let middle = track[track.len() / 2];
        assert!((middle - 200.0).abs() < 2.0, "got {}", middle);
    }
}
