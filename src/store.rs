//! Persisted per-subject tables
//!
//! The extractor writes trial tracks, aggregates and differences as MAT files
//! in the base directory (`<subject>_f1_data.mat`, `<subject>_f0_stats.mat`,
//! ...); the plotter reads them back. A table is only written when it has at
//! least one word, and a missing file reads back as an empty table.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::aggregate::{DiffTable, MeanStd, StatsTable, TrialTable, TrialTrack};
use crate::container::{self, from_value, Value};
use crate::experiment::{Condition, ExperimentKind};
use crate::measure::Measure;
use crate::{PipelineError, Result};

/// Which of the three tables of an experiment kind
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TablePart {
    Data,
    Stats,
    Diff,
}

impl TablePart {
    fn as_str(self) -> &'static str {
        match self {
            TablePart::Data => "data",
            TablePart::Stats => "stats",
            TablePart::Diff => "diff",
        }
    }
}

/// Trial tracks with their aggregates, for one experiment kind
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SubjectTables {
    pub data: TrialTable,
    pub stats: StatsTable,
    pub diffs: DiffTable,
}

fn prefix(kind: ExperimentKind) -> &'static str {
    match kind {
        ExperimentKind::F1 => "f1",
        ExperimentKind::F0 => "f0",
    }
}

/// Variable name inside a table file, e.g. `f0_stats`
pub fn variable_name(kind: ExperimentKind, part: TablePart) -> String {
    format!("{}_{}", prefix(kind), part.as_str())
}

pub fn table_path(base: &Path, subject: &str, kind: ExperimentKind, part: TablePart) -> PathBuf {
    base.join(format!("{}_{}.mat", subject, variable_name(kind, part)))
}

fn trial_value(trial: &TrialTrack) -> Value {
    let mut fields = BTreeMap::from([("time".to_string(), Value::Numbers(trial.time.clone()))]);
    for (measure, track) in &trial.tracks {
        fields.insert(measure.stats_key().to_string(), Value::Numbers(track.clone()));
    }
    Value::Record(fields)
}

pub fn trial_table_to_value(table: &TrialTable) -> Value {
    Value::record(table.iter().map(|(word, conditions)| {
        let conditions = Value::record(conditions.iter().map(|(cond, trials)| {
            (cond.as_str(), Value::List(trials.iter().map(trial_value).collect()))
        }));
        (word.as_str(), conditions)
    }))
}

fn aggregate_value(measures: &BTreeMap<Measure, MeanStd>, part: TablePart) -> Value {
    let mut fields = BTreeMap::new();
    for (measure, stats) in measures {
        let (mean_key, std_key) = match part {
            TablePart::Diff => (measure.mean_diff_key(), measure.std_diff_key()),
            _ => (measure.mean_key(), measure.std_key()),
        };
        fields.insert(mean_key, Value::Numbers(stats.mean.clone()));
        fields.insert(std_key, Value::Numbers(stats.std.clone()));
    }
    Value::Record(fields)
}

/// Stats or diff table as nested records; `part` picks the field names
pub fn stats_table_to_value(table: &StatsTable, part: TablePart) -> Value {
    Value::record(table.iter().map(|(word, conditions)| {
        let conditions = Value::record(
            conditions
                .iter()
                .map(|(cond, measures)| (cond.as_str(), aggregate_value(measures, part))),
        );
        (word.as_str(), conditions)
    }))
}

fn measure_for_key(key: &str) -> Option<Measure> {
    Measure::ALL.into_iter().find(|m| m.stats_key() == key)
}

type RawTrials = BTreeMap<String, BTreeMap<Condition, Vec<BTreeMap<String, Vec<f64>>>>>;
type RawStats = BTreeMap<String, BTreeMap<Condition, BTreeMap<String, Vec<f64>>>>;

pub fn trial_table_from_value(value: Value) -> Result<TrialTable> {
    let raw: RawTrials = from_value(value)?;
    Ok(raw
        .into_iter()
        .map(|(word, conditions)| {
            let conditions: BTreeMap<Condition, Vec<TrialTrack>> = conditions
                .into_iter()
                .map(|(cond, trials)| {
                    let trials: Vec<TrialTrack> = trials
                        .into_iter()
                        .map(|mut fields| {
                            let time = fields.remove("time").unwrap_or_default();
                            let tracks = fields
                                .into_iter()
                                .filter_map(|(key, track)| measure_for_key(&key).map(|m| (m, track)))
                                .collect();
                            TrialTrack { time, tracks }
                        })
                        .collect();
                    (cond, trials)
                })
                .collect();
            (word, conditions)
        })
        .collect())
}

pub fn stats_table_from_value(value: Value, part: TablePart) -> Result<StatsTable> {
    let raw: RawStats = from_value(value)?;
    Ok(raw
        .into_iter()
        .map(|(word, conditions)| {
            let conditions: BTreeMap<Condition, BTreeMap<Measure, MeanStd>> = conditions
                .into_iter()
                .map(|(cond, mut fields)| {
                    let measures: BTreeMap<Measure, MeanStd> = Measure::ALL
                        .into_iter()
                        .filter_map(|measure| {
                            let (mean_key, std_key) = match part {
                                TablePart::Diff => (measure.mean_diff_key(), measure.std_diff_key()),
                                _ => (measure.mean_key(), measure.std_key()),
                            };
                            let mean = fields.remove(&mean_key)?;
                            let std = fields
                                .remove(&std_key)
                                .unwrap_or_else(|| vec![f64::NAN; mean.len()]);
                            Some((measure, MeanStd { mean, std }))
                        })
                        .collect();
                    (cond, measures)
                })
                .collect();
            (word, conditions)
        })
        .collect())
}

fn save_table(path: &Path, name: &str, value: &Value) -> Result<()> {
    debug!("Writing {} to {}", name, path.display());
    container::save_variables(path, &[(name, value)])?;
    Ok(())
}

/// Write the non-empty tables of one experiment kind
pub fn save_tables(base: &Path, subject: &str, kind: ExperimentKind, tables: &SubjectTables) -> Result<()> {
    if !tables.data.is_empty() {
        let part = TablePart::Data;
        save_table(
            &table_path(base, subject, kind, part),
            &variable_name(kind, part),
            &trial_table_to_value(&tables.data),
        )?;
    }
    for (part, table) in [(TablePart::Stats, &tables.stats), (TablePart::Diff, &tables.diffs)] {
        if !table.is_empty() {
            save_table(
                &table_path(base, subject, kind, part),
                &variable_name(kind, part),
                &stats_table_to_value(table, part),
            )?;
        }
    }
    Ok(())
}

fn load_table(base: &Path, subject: &str, kind: ExperimentKind, part: TablePart) -> Result<Option<Value>> {
    let path = table_path(base, subject, kind, part);
    if !path.exists() {
        return Ok(None);
    }
    let name = variable_name(kind, part);
    container::read_mat(&path)?
        .remove(&name)
        .map(Some)
        .ok_or_else(|| PipelineError::Table {
            path,
            reason: format!("variable '{}' missing", name),
        })
}

/// Read back the tables of one experiment kind; absent files are empty tables
pub fn load_tables(base: &Path, subject: &str, kind: ExperimentKind) -> Result<SubjectTables> {
    let mut tables = SubjectTables::default();
    if let Some(value) = load_table(base, subject, kind, TablePart::Data)? {
        tables.data = trial_table_from_value(value)?;
    }
    if let Some(value) = load_table(base, subject, kind, TablePart::Stats)? {
        tables.stats = stats_table_from_value(value, TablePart::Stats)?;
    }
    if let Some(value) = load_table(base, subject, kind, TablePart::Diff)? {
        tables.diffs = stats_table_from_value(value, TablePart::Diff)?;
    }
    Ok(tables)
}
