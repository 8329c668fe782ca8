//! Experiment metadata and per-trial recordings
//!
//! A subject directory holds `expt.mat` (speaker gender and the order of the
//! experiments run), one `expt_<i>_<kind>.mat` per experiment listing the word
//! and condition of every trial, and one `trial_<i>_<n>.mat` per recorded
//! trial. The extractor writes `expt_<i>_<kind>_data.mat` next to them.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::container::{self, ContainerError, Value};
use crate::Sound;

/// Speaker gender as recorded in `expt.mat`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Gender {
    Male,
    Female,
}

impl Gender {
    /// "male" in any case is male; every other label is treated as female
    pub fn from_label(label: &str) -> Self {
        if label.trim().eq_ignore_ascii_case("male") {
            Gender::Male
        } else {
            Gender::Female
        }
    }

    /// Pitch search range (floor, ceiling) in Hz
    pub fn pitch_range(self) -> (f64, f64) {
        match self {
            Gender::Male => (50.0, 250.0),
            Gender::Female => (100.0, 400.0),
        }
    }

    /// Formant ceiling used when the sweep gave no optimum
    pub fn default_ceiling(self) -> f64 {
        match self {
            Gender::Male => 5000.0,
            Gender::Female => 5500.0,
        }
    }
}

/// Feedback perturbation condition of a trial
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize)]
pub enum Condition {
    #[serde(rename = "noShift")]
    NoShift,
    #[serde(rename = "shiftUp")]
    ShiftUp,
    #[serde(rename = "shiftDown")]
    ShiftDown,
}

impl Condition {
    pub const ALL: [Condition; 3] = [Condition::NoShift, Condition::ShiftUp, Condition::ShiftDown];
    /// Conditions compared against the `noShift` baseline
    pub const SHIFTED: [Condition; 2] = [Condition::ShiftUp, Condition::ShiftDown];

    pub fn as_str(self) -> &'static str {
        match self {
            Condition::NoShift => "noShift",
            Condition::ShiftUp => "shiftUp",
            Condition::ShiftDown => "shiftDown",
        }
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which feedback parameter an experiment perturbs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
pub enum ExperimentKind {
    /// First-formant perturbation; formant tracks are extracted
    F1,
    /// Pitch perturbation; pitch tracks are extracted
    F0,
}

impl ExperimentKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ExperimentKind::F1 => "F1",
            ExperimentKind::F0 => "F0",
        }
    }
}

impl fmt::Display for ExperimentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Deserialize)]
struct ExptRecord {
    gender: String,
    #[serde(rename = "exptOrder")]
    expt_order: Vec<ExperimentKind>,
}

/// Contents of `expt.mat`
#[derive(Debug, Clone, PartialEq)]
pub struct SubjectMeta {
    pub gender: Gender,
    /// Experiments in run order; position `i` (1-based) names the files
    pub order: Vec<ExperimentKind>,
}

/// Contents of `expt_<i>_<kind>.mat`
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExperimentTrials {
    pub list_words: Vec<String>,
    pub list_conds: Vec<Condition>,
}

impl ExperimentTrials {
    /// (1-based trial number, word, condition) in recording order
    pub fn trials(&self) -> impl Iterator<Item = (usize, &str, Condition)> + '_ {
        self.list_words
            .iter()
            .zip(&self.list_conds)
            .enumerate()
            .map(|(i, (word, cond))| (i + 1, word.as_str(), *cond))
    }
}

#[derive(Debug, Deserialize)]
struct TrialParams {
    #[serde(rename = "sRate")]
    sample_rate: f64,
}

/// The `data` variable of a trial file
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrialRecording {
    pub signal_in: Vec<f64>,
    params: TrialParams,
}

impl TrialRecording {
    pub fn sample_rate(&self) -> f64 {
        self.params.sample_rate
    }

    pub fn into_sound(self) -> Sound {
        Sound::from_samples_owned(self.signal_in, self.params.sample_rate)
    }
}

pub fn subject_meta_path(subject_dir: &Path) -> PathBuf {
    subject_dir.join("expt.mat")
}

pub fn experiment_path(subject_dir: &Path, index: usize, kind: ExperimentKind) -> PathBuf {
    subject_dir.join(format!("expt_{}_{}.mat", index, kind))
}

pub fn trial_path(subject_dir: &Path, index: usize, trial: usize) -> PathBuf {
    subject_dir.join(format!("trial_{}_{}.mat", index, trial))
}

pub fn usage_path(subject_dir: &Path, index: usize, kind: ExperimentKind) -> PathBuf {
    subject_dir.join(format!("expt_{}_{}_data.mat", index, kind))
}

/// Read `expt.mat`
pub fn load_subject_meta(subject_dir: &Path) -> Result<SubjectMeta, ContainerError> {
    let record: ExptRecord = container::load_variable(&subject_meta_path(subject_dir), "expt")?;
    Ok(SubjectMeta {
        gender: Gender::from_label(&record.gender),
        order: record.expt_order,
    })
}

/// Read the word/condition lists of one experiment; `None` if the file is absent
pub fn load_experiment_trials(
    subject_dir: &Path,
    index: usize,
    kind: ExperimentKind,
) -> Result<Option<ExperimentTrials>, ContainerError> {
    let path = experiment_path(subject_dir, index, kind);
    if !path.exists() {
        return Ok(None);
    }
    container::load_variable(&path, "currExpt").map(Some)
}

pub fn load_trial(path: &Path) -> Result<TrialRecording, ContainerError> {
    container::load_variable(path, "data")
}

/// Write the usage flags of one experiment as `trial_usage`
pub fn save_usage(
    subject_dir: &Path,
    index: usize,
    kind: ExperimentKind,
    usage: &[bool],
) -> Result<(), ContainerError> {
    let flags = Value::Flags(usage.to_vec());
    container::save_variables(&usage_path(subject_dir, index, kind), &[("trial_usage", &flags)])
}

/// The first `limit` trial files of a subject in name order, across experiments
pub fn sweep_trial_files(subject_dir: &Path, limit: usize) -> std::io::Result<Vec<PathBuf>> {
    let mut files: Vec<PathBuf> = fs::read_dir(subject_dir)?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| {
            path.file_name()
                .and_then(|name| name.to_str())
                .and_then(|name| name.strip_prefix("trial_"))
                .and_then(|rest| rest.strip_suffix(".mat"))
                .is_some_and(|middle| middle.contains('_'))
        })
        .collect();
    files.sort();
    files.truncate(limit);
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::from_value;
    use tempfile::tempdir;

    #[test]
    fn test_gender_ranges() {
        assert_eq!(Gender::from_label("Male"), Gender::Male);
        assert_eq!(Gender::from_label("female"), Gender::Female);
        assert_eq!(Gender::from_label("unknown"), Gender::Female);
        assert_eq!(Gender::Male.pitch_range(), (50.0, 250.0));
        assert_eq!(Gender::Female.pitch_range(), (100.0, 400.0));
        assert_eq!(Gender::Male.default_ceiling(), 5000.0);
        assert_eq!(Gender::Female.default_ceiling(), 5500.0);
    }

    #[test]
    fn test_condition_labels() {
        let conds: Vec<Condition> = from_value(Value::List(vec![
            Value::from("noShift"),
            Value::from("shiftUp"),
            Value::from("shiftDown"),
        ]))
        .unwrap();
        assert_eq!(conds, Condition::ALL.to_vec());
        assert!(from_value::<Condition>(Value::from("shiftSideways")).is_err());
        assert_eq!(Condition::ShiftDown.to_string(), "shiftDown");
    }

    #[test]
    fn test_file_names() {
        let dir = Path::new("/lab/sp01");
        assert_eq!(experiment_path(dir, 2, ExperimentKind::F0), dir.join("expt_2_F0.mat"));
        assert_eq!(trial_path(dir, 1, 12), dir.join("trial_1_12.mat"));
        assert_eq!(usage_path(dir, 1, ExperimentKind::F1), dir.join("expt_1_F1_data.mat"));
    }

    #[test]
    fn test_single_trial_experiment() {
        let dir = tempdir().unwrap();
        let expt = Value::record([
            ("listWords", Value::from("bed")),
            ("listConds", Value::from("noShift")),
        ]);
        container::save_variables(&experiment_path(dir.path(), 1, ExperimentKind::F1), &[("currExpt", &expt)])
            .unwrap();

        let trials = load_experiment_trials(dir.path(), 1, ExperimentKind::F1)
            .unwrap()
            .unwrap();
        let listed: Vec<_> = trials.trials().collect();
        assert_eq!(listed, vec![(1, "bed", Condition::NoShift)]);
        assert!(load_experiment_trials(dir.path(), 2, ExperimentKind::F0).unwrap().is_none());
    }

    #[test]
    fn test_subject_meta_and_trial() {
        let dir = tempdir().unwrap();
        let expt = Value::record([
            ("gender", Value::from("male")),
            ("exptOrder", Value::List(vec![Value::from("F1"), Value::from("F0")])),
        ]);
        container::save_variables(&subject_meta_path(dir.path()), &[("expt", &expt)]).unwrap();
        let meta = load_subject_meta(dir.path()).unwrap();
        assert_eq!(meta.gender, Gender::Male);
        assert_eq!(meta.order, vec![ExperimentKind::F1, ExperimentKind::F0]);

        let data = Value::record([
            ("signalIn", Value::Numbers(vec![0.0, 0.1, -0.1])),
            ("params", Value::record([("sRate", Value::from(16000.0)), ("frameLen", Value::from(32.0))])),
        ]);
        let path = trial_path(dir.path(), 1, 1);
        container::save_variables(&path, &[("data", &data)]).unwrap();
        let trial = load_trial(&path).unwrap();
        assert_eq!(trial.sample_rate(), 16000.0);
        assert_eq!(trial.into_sound().num_samples(), 3);
    }

    #[test]
    fn test_sweep_files_sorted_and_limited() {
        let dir = tempdir().unwrap();
        for name in ["trial_2_1.mat", "trial_1_10.mat", "trial_1_2.mat", "expt.mat", "trial_x.mat"] {
            fs::write(dir.path().join(name), b"").unwrap();
        }
        let files = sweep_trial_files(dir.path(), 2).unwrap();
        let names: Vec<_> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_str().unwrap().to_string())
            .collect();
        assert_eq!(names, vec!["trial_1_10.mat", "trial_1_2.mat"]);
    }
}
