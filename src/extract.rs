//! Onset-aligned track extraction
//!
//! Every trial of every experiment listed in `expt.mat` is checked for
//! usability: a detectable onset, a full analysis window after it, and
//! continuous voicing across that window. Usable trials contribute tracks
//! measured from onset to the end of the recording. Tracks are grouped by
//! word and condition, aggregated, and written per subject together with a
//! usage log per experiment.

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

use tracing::{info, warn};

use crate::aggregate::{compute_diffs, compute_stats, TrialTable, TrialTrack};
use crate::ceiling::{read_optimal_ceilings, OPTIMAL_FILE};
use crate::experiment::{
    load_experiment_trials, load_subject_meta, load_trial, save_usage, subject_meta_path, trial_path,
    ExperimentKind, Gender,
};
use crate::measure::{Analysis, AnalysisSettings, Measure};
use crate::onset::detect_onset;
use crate::store::{save_tables, SubjectTables};
use crate::{Result, RunConfig, Sound};

/// Why a trial was left out
#[derive(Debug, Clone, PartialEq)]
pub enum Rejection {
    /// No trial file on disk
    Missing,
    /// Never loud enough or never voiced
    NoOnset,
    /// Fewer than a full window of samples after onset
    OnsetTooLate,
    /// The window is too short for a single pitch frame
    NoPitchFrames,
    /// Unvoiced pitch frames inside the window
    Unvoiced { zeros: usize, frames: usize },
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rejection::Missing => write!(f, "Trial file missing."),
            Rejection::NoOnset => write!(f, "No onset found."),
            Rejection::OnsetTooLate => write!(f, "Onset too late."),
            Rejection::NoPitchFrames => write!(f, "No pitch frames in window."),
            Rejection::Unvoiced { zeros, frames } => write!(
                f,
                "Zeros in pitch data ({}/{} = {:.2}%).",
                zeros,
                frames,
                100.0 * *zeros as f64 / *frames as f64
            ),
        }
    }
}

/// Samples covered by the aggregation window at this sample rate
pub fn window_samples(config: &RunConfig, sample_rate: f64) -> usize {
    (config.window_sample_count as f64 * sample_rate * config.time_step) as usize
}

/// Onset sample of a usable trial, or the reason it is not usable
pub fn check_trial(sound: &Sound, gender: Gender, config: &RunConfig) -> std::result::Result<usize, Rejection> {
    let onset = detect_onset(sound, gender, config.onset_drop_db);
    if !onset.is_found() {
        return Err(Rejection::NoOnset);
    }

    let desired = window_samples(config, sound.sample_rate());
    let onset_index = (onset.time() * sound.sample_rate()) as usize;
    if onset_index + desired > sound.num_samples() {
        return Err(Rejection::OnsetTooLate);
    }

    let (floor, ceiling) = gender.pitch_range();
    let window = sound.slice(onset_index, onset_index + desired);
    let pitch = window.to_pitch(config.time_step, floor, ceiling);
    let frames = pitch.num_frames();
    if frames == 0 {
        return Err(Rejection::NoPitchFrames);
    }
    let zeros = frames - pitch.count_voiced();
    if zeros > 0 {
        return Err(Rejection::Unvoiced { zeros, frames });
    }
    Ok(onset_index)
}

/// Tracks of one experiment kind from `onset_index` to the end of the sound
pub fn extract_trial(
    sound: &Sound,
    onset_index: usize,
    kind: ExperimentKind,
    settings: &AnalysisSettings,
) -> TrialTrack {
    let analysis = Analysis::run(kind, &sound.slice_from(onset_index), settings);
    TrialTrack {
        time: analysis.times(),
        tracks: Measure::of_experiment(kind)
            .iter()
            .map(|&measure| (measure, analysis.track(measure)))
            .collect(),
    }
}

/// Trial tables of one subject, by experiment kind
#[derive(Debug, Clone, Default)]
pub struct SubjectData {
    pub formant: TrialTable,
    pub pitch: TrialTable,
}

impl SubjectData {
    pub fn table_mut(&mut self, kind: ExperimentKind) -> &mut TrialTable {
        match kind {
            ExperimentKind::F1 => &mut self.formant,
            ExperimentKind::F0 => &mut self.pitch,
        }
    }
}

/// Where a subject's experiment lives and how its trials are analysed
#[derive(Debug, Clone, Copy)]
pub struct ExperimentContext<'a> {
    pub subject: &'a str,
    pub dir: &'a Path,
    pub gender: Gender,
    pub settings: AnalysisSettings,
}

/// Process the trials of experiment `index`; `None` when its file is absent.
/// The returned usage log has one entry per listed trial.
pub fn process_experiment(
    ctx: &ExperimentContext<'_>,
    index: usize,
    kind: ExperimentKind,
    config: &RunConfig,
    data: &mut TrialTable,
) -> Result<Option<Vec<bool>>> {
    let Some(trials) = load_experiment_trials(ctx.dir, index, kind)? else {
        warn!(
            "Subject {}, Experiment {} {}: experiment file missing, skipping",
            ctx.subject, index, kind
        );
        return Ok(None);
    };

    let mut usage = Vec::with_capacity(trials.list_words.len());
    for (trial, word, cond) in trials.trials() {
        let path = trial_path(ctx.dir, index, trial);
        let checked = if path.exists() {
            let sound = load_trial(&path)?.into_sound();
            check_trial(&sound, ctx.gender, config).map(|onset| (sound, onset))
        } else {
            Err(Rejection::Missing)
        };

        match checked {
            Ok((sound, onset)) => {
                usage.push(true);
                let track = extract_trial(&sound, onset, kind, &ctx.settings);
                data.entry(word.to_string())
                    .or_default()
                    .entry(cond)
                    .or_default()
                    .push(track);
            }
            Err(reason) => {
                usage.push(false);
                warn!(
                    "Subject {}, Experiment {} {}, Trial {}: Excluded - {}",
                    ctx.subject, index, kind, trial, reason
                );
            }
        }
    }
    Ok(Some(usage))
}

/// Extract, aggregate and save one subject; `None` when it has no `expt.mat`
pub fn process_subject(
    config: &RunConfig,
    subject: &str,
    ceilings: &BTreeMap<String, f64>,
) -> Result<Option<(SubjectTables, SubjectTables)>> {
    let dir = config.subject_dir(subject);
    if !subject_meta_path(&dir).exists() {
        warn!("Subject {}: no expt.mat in {}, skipping", subject, dir.display());
        return Ok(None);
    }

    let meta = load_subject_meta(&dir)?;
    let ceiling = ceilings
        .get(subject)
        .copied()
        .unwrap_or_else(|| meta.gender.default_ceiling());
    info!("Subject {}: {:?}, formant ceiling {} Hz", subject, meta.gender, ceiling);

    let ctx = ExperimentContext {
        subject,
        dir: &dir,
        gender: meta.gender,
        settings: AnalysisSettings::new(config, meta.gender, ceiling),
    };
    let mut data = SubjectData::default();
    for (index, &kind) in meta.order.iter().enumerate() {
        let index = index + 1;
        if let Some(usage) = process_experiment(&ctx, index, kind, config, data.table_mut(kind))? {
            let kept = usage.iter().filter(|&&used| used).count();
            info!(
                "Subject {}, Experiment {} {}: {}/{} trials usable",
                subject,
                index,
                kind,
                kept,
                usage.len()
            );
            save_usage(&dir, index, kind, &usage)?;
        }
    }

    let formant = aggregate(data.formant, config);
    let pitch = aggregate(data.pitch, config);
    save_tables(&config.base_directory, subject, ExperimentKind::F1, &formant)?;
    save_tables(&config.base_directory, subject, ExperimentKind::F0, &pitch)?;
    info!("Subject {} complete!", subject);
    Ok(Some((formant, pitch)))
}

fn aggregate(data: TrialTable, config: &RunConfig) -> SubjectTables {
    let stats = compute_stats(&data, config.window_sample_count);
    let diffs = compute_diffs(&stats);
    SubjectTables { data, stats, diffs }
}

/// Run the extractor over every configured subject
pub fn run(config: &RunConfig) -> Result<()> {
    let ceilings = read_optimal_ceilings(&config.base_directory.join(OPTIMAL_FILE))?;
    for subject in config.subjects()? {
        process_subject(config, &subject, &ceilings)?;
    }
    Ok(())
}
