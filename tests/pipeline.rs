//! End-to-end tests of the three stages on synthetic subjects
//!
//! Subjects are laid out in temporary directories with the same files the lab
//! recordings have (expt.mat, expt_<i>_<kind>.mat, trial_<i>_<n>.mat), filled
//! with tones and a two-resonator vowel instead of speech.

use std::collections::BTreeMap;
use std::f64::consts::PI;
use std::path::Path;

use approx::assert_relative_eq;
use perturb_tracks::aggregate::{compute_diffs, compute_stats, MeanStd, StatsTable, TrialTable, TrialTrack};
use perturb_tracks::ceiling::{self, select_optimal, CeilingScore, OPTIMAL_FILE};
use perturb_tracks::container::{self, load_variable};
use perturb_tracks::experiment::{experiment_path, subject_meta_path, trial_path, usage_path};
use perturb_tracks::extract::{self, check_trial, Rejection};
use perturb_tracks::onset::detect_onset;
use perturb_tracks::store::{load_tables, save_tables, table_path, SubjectTables, TablePart};
use perturb_tracks::{Condition, ExperimentKind, Gender, Measure, RunConfig, Sound, Value};
use tempfile::tempdir;

const SAMPLE_RATE: f64 = 16000.0;

fn tone(frequency: f64, duration: f64) -> Vec<f64> {
    Sound::create_tone(frequency, duration, SAMPLE_RATE, 0.5, 0.0).samples().to_vec()
}

fn silence(duration: f64) -> Vec<f64> {
    vec![0.0; (duration * SAMPLE_RATE).round() as usize]
}

/// Impulse train at 120 Hz through resonators at 600 and 1700 Hz, peak 0.5
fn vowel(duration: f64) -> Vec<f64> {
    let n = (duration * SAMPLE_RATE) as usize;
    let period = (SAMPLE_RATE / 120.0) as usize;
    let mut signal: Vec<f64> = (0..n).map(|i| if i % period == 0 { 1.0 } else { 0.0 }).collect();
    for (freq, bw) in [(600.0, 80.0), (1700.0, 100.0)] {
        let r = (-PI * bw / SAMPLE_RATE).exp();
        let a1 = 2.0 * r * (2.0 * PI * freq / SAMPLE_RATE).cos();
        let a2 = -r * r;
        let (mut y1, mut y2) = (0.0, 0.0);
        for x in signal.iter_mut() {
            let y = *x + a1 * y1 + a2 * y2;
            y2 = y1;
            y1 = y;
            *x = y;
        }
    }
    let peak = signal.iter().fold(0.0f64, |m, v| m.max(v.abs()));
    signal.iter().map(|v| 0.5 * v / peak).collect()
}

fn concat(parts: &[Vec<f64>]) -> Vec<f64> {
    parts.concat()
}

fn write_trial(path: &Path, samples: Vec<f64>) {
    let data = Value::record([
        ("signalIn", Value::Numbers(samples)),
        ("params", Value::record([("sRate", Value::from(SAMPLE_RATE))])),
    ]);
    container::save_variables(path, &[("data", &data)]).unwrap();
}

fn write_meta(dir: &Path, gender: &str, order: &[&str]) {
    let expt = Value::record([
        ("gender", Value::from(gender)),
        ("exptOrder", Value::List(order.iter().map(|&k| Value::from(k)).collect())),
    ]);
    container::save_variables(&subject_meta_path(dir), &[("expt", &expt)]).unwrap();
}

fn write_experiment(dir: &Path, index: usize, kind: ExperimentKind, trials: &[(&str, &str)]) {
    let expt = Value::record([
        ("listWords", Value::List(trials.iter().map(|&(w, _)| Value::from(w)).collect())),
        ("listConds", Value::List(trials.iter().map(|&(_, c)| Value::from(c)).collect())),
    ]);
    container::save_variables(&experiment_path(dir, index, kind), &[("currExpt", &expt)]).unwrap();
}

#[test]
fn test_two_trials_aggregate_without_gaps() {
    let first: Vec<f64> = (0..200).map(|i| 500.0 + i as f64).collect();
    let second: Vec<f64> = (0..200).map(|i| 520.0 + 2.0 * i as f64).collect();
    let trial = |values: &Vec<f64>| TrialTrack {
        time: (0..200).map(|i| i as f64 * 0.002).collect(),
        tracks: BTreeMap::from([(Measure::F1, values.clone())]),
    };
    let mut data = TrialTable::new();
    data.entry("bed".into())
        .or_default()
        .insert(Condition::NoShift, vec![trial(&first), trial(&second)]);

    let stats = compute_stats(&data, 150);
    let f1 = &stats["bed"][&Condition::NoShift][&Measure::F1];
    assert_eq!(f1.mean.len(), 150);
    assert_eq!(f1.std.len(), 150);
    for i in 0..150 {
        let (a, b) = (first[i], second[i]);
        assert_relative_eq!(f1.mean[i], 0.5 * (a + b));
        assert_relative_eq!(f1.std[i], 0.5 * (a - b).abs());
    }
}

#[test]
fn test_ceiling_tie_keeps_first_candidate() {
    let scores = [
        CeilingScore::new(4000.0, [0.05, 0.08, f64::NAN, f64::NAN]),
        CeilingScore::new(4200.0, [0.03, 0.10, f64::NAN, f64::NAN]),
    ];
    assert_relative_eq!(scores[0].sum, 0.13);
    assert_relative_eq!(scores[1].sum, 0.13);
    assert_eq!(select_optimal(&scores), Some(4000.0));
}

#[test]
fn test_word_without_baseline_has_no_difference() {
    let entry = MeanStd {
        mean: vec![230.0; 150],
        std: vec![4.0; 150],
    };
    let mut stats = StatsTable::new();
    stats
        .entry("bed".into())
        .or_default()
        .insert(Condition::ShiftUp, BTreeMap::from([(Measure::Pitch, entry.clone())]));
    stats.entry("head".into()).or_default().extend([
        (Condition::NoShift, BTreeMap::from([(Measure::Pitch, entry.clone())])),
        (Condition::ShiftUp, BTreeMap::from([(Measure::Pitch, entry)])),
    ]);

    let diffs = compute_diffs(&stats);
    assert!(diffs["bed"].is_empty());
    let head = &diffs["head"][&Condition::ShiftUp][&Measure::Pitch];
    assert_relative_eq!(head.mean[0], 0.0);
    assert_relative_eq!(head.std[0], (32.0f64).sqrt());
}

#[test]
fn test_window_past_end_is_rejected() {
    let config = RunConfig::default();
    let sound = Sound::from_samples_owned(concat(&[silence(0.2), tone(200.0, 0.2)]), SAMPLE_RATE);
    assert_eq!(check_trial(&sound, Gender::Female, &config), Err(Rejection::OnsetTooLate));
}

#[test]
fn test_voicing_gap_in_window_is_rejected() {
    let config = RunConfig::default();
    let samples = concat(&[silence(0.1), tone(200.0, 0.1), silence(0.06), tone(200.0, 0.4)]);
    let sound = Sound::from_samples_owned(samples, SAMPLE_RATE);
    assert!(matches!(
        check_trial(&sound, Gender::Female, &config),
        Err(Rejection::Unvoiced { zeros, .. }) if zeros > 0
    ));
}

#[test]
fn test_onset_is_latest_crossing() {
    for delay in [0.05, 0.15, 0.3] {
        let sound = Sound::from_samples_owned(concat(&[silence(delay), tone(150.0, 0.4)]), SAMPLE_RATE);
        let onset = detect_onset(&sound, Gender::Male, 10.0);
        assert!(onset.time() >= onset.intensity);
        assert!(onset.time() >= onset.voicing);
        assert!((onset.time() - delay).abs() < 0.05, "delay {} onset {}", delay, onset.time());
    }
}

#[test]
fn test_tables_survive_container_round_trip() {
    let dir = tempdir().unwrap();
    let track = |f1: f64| TrialTrack {
        time: (0..160).map(|i| 0.0125 + i as f64 * 0.002).collect(),
        tracks: BTreeMap::from([
            (Measure::F1, vec![f1; 160]),
            (Measure::F2, (0..160).map(|i| if i < 150 { 1800.0 } else { f64::NAN }).collect()),
        ]),
    };
    let mut data = TrialTable::new();
    data.entry("bed".into()).or_default().extend([
        (Condition::NoShift, vec![track(550.0), track(560.0)]),
        (Condition::ShiftDown, vec![track(600.0)]),
    ]);
    data.entry("head".into())
        .or_default()
        .insert(Condition::ShiftUp, vec![track(500.0)]);
    let stats = compute_stats(&data, 150);
    let diffs = compute_diffs(&stats);
    let tables = SubjectTables {
        data: data.clone(),
        stats: stats.clone(),
        diffs: diffs.clone(),
    };

    save_tables(dir.path(), "107", ExperimentKind::F1, &tables).unwrap();
    for part in [TablePart::Data, TablePart::Stats, TablePart::Diff] {
        assert!(table_path(dir.path(), "107", ExperimentKind::F1, part).exists());
    }
    assert!(!table_path(dir.path(), "107", ExperimentKind::F0, TablePart::Data).exists());

    let back = load_tables(dir.path(), "107", ExperimentKind::F1).unwrap();
    assert_eq!(back.data.len(), 2);
    assert_eq!(back.data["bed"][&Condition::NoShift].len(), 2);
    assert_eq!(back.data["head"][&Condition::ShiftUp][0].time, data["head"][&Condition::ShiftUp][0].time);
    assert_eq!(back.stats["bed"][&Condition::NoShift][&Measure::F1], stats["bed"][&Condition::NoShift][&Measure::F1]);
    assert!(back.diffs["head"].is_empty());
    let down = &back.diffs["bed"][&Condition::ShiftDown][&Measure::F1];
    assert_relative_eq!(down.mean[10], 45.0);
}

#[test]
fn test_extract_subject_end_to_end() {
    let base = tempdir().unwrap();
    let dir = base.path().join("s01");
    std::fs::create_dir(&dir).unwrap();

    write_meta(&dir, "Male", &["F0", "F1"]);
    write_experiment(
        &dir,
        1,
        ExperimentKind::F0,
        &[("bed", "noShift"), ("bed", "shiftUp"), ("bed", "noShift"), ("bed", "shiftDown")],
    );
    write_trial(&trial_path(&dir, 1, 1), concat(&[silence(0.05), tone(150.0, 0.6)]));
    write_trial(&trial_path(&dir, 1, 2), concat(&[silence(0.05), tone(170.0, 0.6)]));
    // trial 3 was never recorded
    write_trial(&trial_path(&dir, 1, 4), concat(&[silence(0.4), tone(150.0, 0.1)]));

    write_experiment(&dir, 2, ExperimentKind::F1, &[("head", "noShift")]);
    write_trial(&trial_path(&dir, 2, 1), concat(&[silence(0.05), vowel(0.6)]));

    let config = RunConfig {
        base_directory: base.path().to_path_buf(),
        subject_ids: vec!["s01".into()],
        ..RunConfig::default()
    };
    extract::run(&config).unwrap();

    let usage: Vec<bool> = load_variable(&usage_path(&dir, 1, ExperimentKind::F0), "trial_usage").unwrap();
    assert_eq!(usage, vec![true, true, false, false]);
    let usage: Vec<bool> = load_variable(&usage_path(&dir, 2, ExperimentKind::F1), "trial_usage").unwrap();
    assert_eq!(usage, vec![true]);

    let pitch = load_tables(base.path(), "s01", ExperimentKind::F0).unwrap();
    let trials = &pitch.data["bed"];
    assert_eq!(trials[&Condition::NoShift].len(), 1);
    assert!(!trials.contains_key(&Condition::ShiftDown));
    let baseline = &pitch.stats["bed"][&Condition::NoShift][&Measure::Pitch];
    assert_eq!(baseline.mean.len(), 150);
    assert!((baseline.mean[75] - 150.0).abs() < 3.0);
    let shift = &pitch.diffs["bed"][&Condition::ShiftUp][&Measure::Pitch];
    assert!((shift.mean[75] - 20.0).abs() < 4.0);

    let formant = load_tables(base.path(), "s01", ExperimentKind::F1).unwrap();
    let head = &formant.data["head"][&Condition::NoShift][0];
    assert_eq!(head.tracks[&Measure::F1].len(), head.time.len());
    assert!(head.tracks.contains_key(&Measure::F2));
    assert!(formant.diffs["head"].is_empty());
}

#[test]
fn test_missing_experiment_file_writes_no_usage() {
    let base = tempdir().unwrap();
    let dir = base.path().join("s02");
    std::fs::create_dir(&dir).unwrap();
    write_meta(&dir, "female", &["F1"]);

    let config = RunConfig {
        base_directory: base.path().to_path_buf(),
        ..RunConfig::default()
    };
    extract::run(&config).unwrap();
    assert!(!usage_path(&dir, 1, ExperimentKind::F1).exists());
    assert!(!table_path(base.path(), "s02", ExperimentKind::F1, TablePart::Stats).exists());
}

#[test]
fn test_ceiling_sweep_writes_tables() {
    let base = tempdir().unwrap();
    let dir = base.path().join("104");
    std::fs::create_dir(&dir).unwrap();
    write_trial(&trial_path(&dir, 1, 1), vowel(0.5));
    write_trial(&trial_path(&dir, 1, 2), concat(&[silence(0.1), vowel(0.4)]));
    std::fs::create_dir(base.path().join("empty")).unwrap();

    let config = RunConfig {
        base_directory: base.path().to_path_buf(),
        candidate_ceilings: vec![4000.0, 5000.0, 6000.0],
        ..RunConfig::default()
    };
    let sweeps = ceiling::run(&config).unwrap();
    assert_eq!(sweeps.len(), 1);
    let sweep = &sweeps[0];
    assert_eq!(sweep.scores.len(), 3);
    let optimal = sweep.optimal.unwrap();
    assert!(config.candidate_ceilings.contains(&optimal));

    let text = std::fs::read_to_string(base.path().join(ceiling::DEVIATIONS_FILE)).unwrap();
    assert_eq!(text.lines().count(), 4);
    assert!(text.starts_with("Subject ID,Ceiling,F1 deviation"));

    let ceilings = ceiling::read_optimal_ceilings(&base.path().join(OPTIMAL_FILE)).unwrap();
    assert_eq!(ceilings.get("104"), Some(&optimal));
}
