//! Formant ceiling sweep
//!
//! For every candidate ceiling each sweep trial is re-tracked, and the
//! within-trial coefficient of variation of F1..F4 is taken over the loud
//! frames (intensity above the configured threshold). Per formant these are
//! averaged across trials and the four averages summed; the ceiling with the
//! smallest sum wins.

use std::collections::BTreeMap;
use std::path::Path;

use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::experiment::{load_trial, sweep_trial_files};
use crate::interpolation::Interpolation;
use crate::{Result, RunConfig, Sound};

pub const DEVIATIONS_FILE: &str = "formant_deviations.csv";
pub const OPTIMAL_FILE: &str = "optimal_ceilings.csv";

/// Formants scored per ceiling (F1..F4)
pub const SCORED_FORMANTS: usize = 4;

/// Minimum pitch of the loudness analysis (Hz)
const SWEEP_MIN_PITCH: f64 = 100.0;

/// A sweep trial with its loud frame times, which do not depend on the ceiling
#[derive(Debug, Clone)]
pub struct SweepTrial {
    sound: Sound,
    loud_times: Vec<f64>,
}

impl SweepTrial {
    pub fn new(sound: Sound, config: &RunConfig) -> Self {
        let intensity = sound.to_intensity(SWEEP_MIN_PITCH, config.sweep_time_step);
        let loud_times = intensity
            .values()
            .iter()
            .enumerate()
            .filter(|&(_, &db)| db > config.intensity_threshold)
            .map(|(frame, _)| intensity.get_time_from_frame(frame))
            .collect();
        Self { sound, loud_times }
    }

    pub fn loud_times(&self) -> &[f64] {
        &self.loud_times
    }

    /// Coefficient of variation of each scored formant at one ceiling
    pub fn variation(&self, ceiling: f64, config: &RunConfig) -> [Option<f64>; SCORED_FORMANTS] {
        let formant = self.sound.to_formant_burg(
            config.sweep_time_step,
            config.max_formants,
            ceiling,
            config.formant_window_length,
            config.pre_emphasis_from,
        );
        std::array::from_fn(|i| {
            let values: Vec<f64> = self
                .loud_times
                .iter()
                .filter_map(|&t| formant.get_value_at_time(i + 1, t, Interpolation::Linear))
                .collect();
            coefficient_of_variation(&values)
        })
    }
}

/// Population standard deviation over mean; `None` below two values
pub fn coefficient_of_variation(values: &[f64]) -> Option<f64> {
    if values.len() < 2 {
        return None;
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    Some(variance.sqrt() / mean)
}

/// Sum ignoring NaN; NaN only when every term is NaN
pub fn nan_sum(values: &[f64]) -> f64 {
    values
        .iter()
        .filter(|v| !v.is_nan())
        .fold(None, |acc: Option<f64>, &v| Some(acc.unwrap_or(0.0) + v))
        .unwrap_or(f64::NAN)
}

/// Mean deviations of one ceiling; NaN where no trial contributed
#[derive(Debug, Clone, PartialEq)]
pub struct CeilingScore {
    pub ceiling: f64,
    pub deviations: [f64; SCORED_FORMANTS],
    pub sum: f64,
}

impl CeilingScore {
    pub fn new(ceiling: f64, deviations: [f64; SCORED_FORMANTS]) -> Self {
        Self {
            ceiling,
            deviations,
            sum: nan_sum(&deviations),
        }
    }

    /// Average per-trial variations formant by formant
    pub fn from_trials(ceiling: f64, variations: &[[Option<f64>; SCORED_FORMANTS]]) -> Self {
        let deviations = std::array::from_fn(|i| {
            let contributing: Vec<f64> = variations.iter().filter_map(|v| v[i]).collect();
            if contributing.is_empty() {
                f64::NAN
            } else {
                contributing.iter().sum::<f64>() / contributing.len() as f64
            }
        });
        Self::new(ceiling, deviations)
    }
}

/// Ceiling of the smallest defined sum; ties keep the earliest candidate
pub fn select_optimal(scores: &[CeilingScore]) -> Option<f64> {
    let mut best: Option<&CeilingScore> = None;
    for score in scores.iter().filter(|s| !s.sum.is_nan()) {
        if best.map_or(true, |b| score.sum < b.sum) {
            best = Some(score);
        }
    }
    best.map(|s| s.ceiling)
}

/// Sweep result of one subject
#[derive(Debug, Clone, PartialEq)]
pub struct SubjectSweep {
    pub subject: String,
    pub scores: Vec<CeilingScore>,
    pub optimal: Option<f64>,
}

/// Score every candidate ceiling over prepared trials
pub fn score_ceilings(trials: &[SweepTrial], config: &RunConfig) -> Vec<CeilingScore> {
    config
        .candidate_ceilings
        .iter()
        .map(|&ceiling| {
            let variations: Vec<_> = trials.iter().map(|t| t.variation(ceiling, config)).collect();
            let score = CeilingScore::from_trials(ceiling, &variations);
            let [f1, f2, f3, f4] = score.deviations;
            debug!(
                "Ceiling {} Hz - Mean Deviations: F1={:.2}, F2={:.2}, F3={:.2}, F4={:.2}, Sum={:.2}",
                ceiling, f1, f2, f3, f4, score.sum
            );
            score
        })
        .collect()
}

/// Sweep one subject; `None` when the subject has no trial files
pub fn sweep_subject(config: &RunConfig, subject: &str) -> Result<Option<SubjectSweep>> {
    let dir = config.subject_dir(subject);
    if !dir.is_dir() {
        warn!("Subject {}: directory {} not found, skipping", subject, dir.display());
        return Ok(None);
    }
    let files = sweep_trial_files(&dir, config.max_sweep_trials)?;
    if files.is_empty() {
        warn!("Subject {}: no trial files, skipping", subject);
        return Ok(None);
    }

    info!("Analyzing {} ({} trials)...", subject, files.len());
    let trials = files
        .iter()
        .map(|path| Ok(SweepTrial::new(load_trial(path)?.into_sound(), config)))
        .collect::<Result<Vec<_>>>()?;

    let scores = score_ceilings(&trials, config);
    let optimal = select_optimal(&scores);
    match optimal {
        Some(ceiling) => info!("Optimal ceiling for {}: {} Hz", subject, ceiling),
        None => warn!("No valid ceilings found for {}; optimal ceiling left undefined", subject),
    }

    Ok(Some(SubjectSweep {
        subject: subject.to_string(),
        scores,
        optimal,
    }))
}

/// Sweep every configured subject and write both ceiling tables
pub fn run(config: &RunConfig) -> Result<Vec<SubjectSweep>> {
    let mut sweeps = Vec::new();
    for subject in config.subjects()? {
        if let Some(sweep) = sweep_subject(config, &subject)? {
            sweeps.push(sweep);
        }
    }

    let deviations = config.base_directory.join(DEVIATIONS_FILE);
    info!("Saving formant deviations to {}", deviations.display());
    write_deviations(&deviations, &sweeps)?;

    let optimal = config.base_directory.join(OPTIMAL_FILE);
    info!("Saving optimal ceilings to {}", optimal.display());
    write_optimal_ceilings(&optimal, &sweeps)?;
    Ok(sweeps)
}

fn cell(value: f64) -> String {
    if value.is_nan() {
        String::new()
    } else {
        value.to_string()
    }
}

pub fn write_deviations(path: &Path, sweeps: &[SubjectSweep]) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record([
        "Subject ID",
        "Ceiling",
        "F1 deviation",
        "F2 deviation",
        "F3 deviation",
        "F4 deviation",
        "Sum of deviation",
    ])?;
    for sweep in sweeps {
        for score in &sweep.scores {
            let mut record = vec![sweep.subject.clone(), cell(score.ceiling)];
            record.extend(score.deviations.iter().map(|&d| cell(d)));
            record.push(cell(score.sum));
            writer.write_record(&record)?;
        }
    }
    writer.flush()?;
    Ok(())
}

pub fn write_optimal_ceilings(path: &Path, sweeps: &[SubjectSweep]) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record(["Subject ID", "Optimal Ceiling"])?;
    for sweep in sweeps {
        writer.write_record([sweep.subject.clone(), cell(sweep.optimal.unwrap_or(f64::NAN))])?;
    }
    writer.flush()?;
    Ok(())
}

#[derive(Debug, Deserialize)]
struct OptimalRow {
    #[serde(rename = "Subject ID")]
    subject: String,
    #[serde(rename = "Optimal Ceiling")]
    ceiling: Option<f64>,
}

/// Defined optimal ceilings by subject; a missing file gives an empty map
pub fn read_optimal_ceilings(path: &Path) -> Result<BTreeMap<String, f64>> {
    if !path.exists() {
        info!("No {} found; using default ceilings", path.display());
        return Ok(BTreeMap::new());
    }
    let mut reader = csv::Reader::from_path(path)?;
    let mut ceilings = BTreeMap::new();
    for row in reader.deserialize() {
        let row: OptimalRow = row?;
        if let Some(ceiling) = row.ceiling.filter(|c| !c.is_nan()) {
            ceilings.insert(row.subject, ceiling);
        }
    }
    Ok(ceilings)
}
