//! Per word/condition aggregation of trial tracks
//!
//! Tracks are padded with NaN (or truncated) to the window length, then
//! reduced column by column ignoring NaN. Shifted conditions are compared
//! against the `noShift` aggregate of the same word.

use std::collections::BTreeMap;

use crate::experiment::Condition;
use crate::measure::Measure;

/// Tracks of one accepted trial, measured from onset
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TrialTrack {
    /// Frame times relative to onset
    pub time: Vec<f64>,
    pub tracks: BTreeMap<Measure, Vec<f64>>,
}

/// word → condition → accepted trials, in recording order
pub type TrialTable = BTreeMap<String, BTreeMap<Condition, Vec<TrialTrack>>>;

/// Columnwise centre and spread of a set of tracks
#[derive(Debug, Clone, PartialEq)]
pub struct MeanStd {
    pub mean: Vec<f64>,
    pub std: Vec<f64>,
}

/// word → condition → measure → aggregate
pub type StatsTable = BTreeMap<String, BTreeMap<Condition, BTreeMap<Measure, MeanStd>>>;

/// word → shifted condition → measure → difference from `noShift`.
/// Words without a baseline keep an empty entry.
pub type DiffTable = StatsTable;

/// Copy of `track` cut or NaN-padded to exactly `len` samples
pub fn pad_track(track: &[f64], len: usize) -> Vec<f64> {
    let mut padded: Vec<f64> = track.iter().take(len).copied().collect();
    padded.resize(len, f64::NAN);
    padded
}

/// NaN-ignoring mean and population standard deviation of each column.
/// Columns without any defined value are NaN.
pub fn nan_mean_std(rows: &[Vec<f64>], len: usize) -> MeanStd {
    let (mean, std) = (0..len)
        .map(|col| {
            let values: Vec<f64> = rows
                .iter()
                .filter_map(|row| row.get(col).copied())
                .filter(|v| !v.is_nan())
                .collect();
            if values.is_empty() {
                return (f64::NAN, f64::NAN);
            }
            let n = values.len() as f64;
            let mean = values.iter().sum::<f64>() / n;
            let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
            (mean, variance.sqrt())
        })
        .unzip();
    MeanStd { mean, std }
}

/// Aggregate every measure present in the trials of each word/condition
pub fn compute_stats(data: &TrialTable, len: usize) -> StatsTable {
    data.iter()
        .map(|(word, conditions)| {
            let per_condition: BTreeMap<Condition, BTreeMap<Measure, MeanStd>> = conditions
                .iter()
                .filter(|(_, trials)| !trials.is_empty())
                .map(|(&cond, trials)| {
                    let measures: BTreeMap<Measure, MeanStd> = Measure::ALL
                        .into_iter()
                        .filter_map(|measure| {
                            let rows: Vec<Vec<f64>> = trials
                                .iter()
                                .filter_map(|t| t.tracks.get(&measure))
                                .map(|track| pad_track(track, len))
                                .collect();
                            (!rows.is_empty()).then(|| (measure, nan_mean_std(&rows, len)))
                        })
                        .collect();
                    (cond, measures)
                })
                .collect();
            (word.clone(), per_condition)
        })
        .collect()
}

/// Shifted minus baseline, with root-sum-square spread
pub fn difference(shifted: &MeanStd, baseline: &MeanStd) -> MeanStd {
    MeanStd {
        mean: shifted.mean.iter().zip(&baseline.mean).map(|(s, b)| s - b).collect(),
        std: shifted
            .std
            .iter()
            .zip(&baseline.std)
            .map(|(s, b)| (s * s + b * b).sqrt())
            .collect(),
    }
}

pub fn compute_diffs(stats: &StatsTable) -> DiffTable {
    stats
        .iter()
        .map(|(word, conditions)| {
            let mut diffs = BTreeMap::new();
            if let Some(baseline) = conditions.get(&Condition::NoShift) {
                for cond in Condition::SHIFTED {
                    let Some(shifted) = conditions.get(&cond) else {
                        continue;
                    };
                    let measures: BTreeMap<Measure, MeanStd> = shifted
                        .iter()
                        .filter_map(|(measure, s)| {
                            baseline.get(measure).map(|b| (*measure, difference(s, b)))
                        })
                        .collect();
                    diffs.insert(cond, measures);
                }
            }
            (word.clone(), diffs)
        })
        .collect()
}
