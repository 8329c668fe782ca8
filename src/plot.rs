//! Per-subject figures of the persisted aggregates
//!
//! Three PNGs per subject, each a grid with one row per word and one column
//! per measure (F1, F2, pitch): condition means, every trial under its mean,
//! and shift-minus-baseline differences with a ±std band.

use std::collections::BTreeSet;
use std::error::Error;
use std::path::Path;

use plotters::coord::cartesian::Cartesian2d;
use plotters::coord::types::RangedCoordf64;
use plotters::coord::Shift;
use plotters::prelude::*;
use tracing::{info, warn};

use crate::aggregate::TrialTrack;
use crate::experiment::{Condition, ExperimentKind};
use crate::measure::Measure;
use crate::store::{load_tables, SubjectTables};
use crate::{PipelineError, Result, RunConfig};

type DrawResult<T> = std::result::Result<T, Box<dyn Error>>;
type Chart<'a, 'b> = ChartContext<'a, BitMapBackend<'b>, Cartesian2d<RangedCoordf64, RangedCoordf64>>;

const PANEL_WIDTH: u32 = 500;
const PANEL_HEIGHT: u32 = 500;

/// The three figure kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Figure {
    Means,
    Differences,
    Trials,
}

impl Figure {
    pub const ALL: [Figure; 3] = [Figure::Means, Figure::Differences, Figure::Trials];

    pub fn file_name(self, subject: &str) -> String {
        match self {
            Figure::Means => format!("plot_avg_{}.png", subject),
            Figure::Differences => format!("plot_diff_{}.png", subject),
            Figure::Trials => format!("plot_all_{}.png", subject),
        }
    }

    pub fn title(self, word: &str, measure: Measure) -> String {
        match self {
            Figure::Means => format!("{} - {}", word, measure.label()),
            Figure::Differences => format!("{} - {} diff", word, measure.label()),
            Figure::Trials => format!("{} - {} All Trials", word, measure.label()),
        }
    }
}

/// Formant and pitch tables of one subject
#[derive(Debug, Clone, Default)]
pub struct PlotData {
    pub formant: SubjectTables,
    pub pitch: SubjectTables,
}

impl PlotData {
    pub fn load(base: &Path, subject: &str) -> Result<Self> {
        Ok(Self {
            formant: load_tables(base, subject, ExperimentKind::F1)?,
            pitch: load_tables(base, subject, ExperimentKind::F0)?,
        })
    }

    pub fn tables(&self, measure: Measure) -> &SubjectTables {
        match measure.experiment() {
            ExperimentKind::F1 => &self.formant,
            ExperimentKind::F0 => &self.pitch,
        }
    }

    /// Words with aggregates in either table, sorted
    pub fn words(&self) -> Vec<String> {
        let words: BTreeSet<&String> = self.formant.stats.keys().chain(self.pitch.stats.keys()).collect();
        words.into_iter().cloned().collect()
    }
}

/// Runs of defined samples as (time, value) points; NaN breaks a run
pub fn segments(time: &[f64], values: &[f64]) -> Vec<Vec<(f64, f64)>> {
    let mut runs = Vec::new();
    let mut current = Vec::new();
    for (&t, &v) in time.iter().zip(values) {
        if v.is_nan() {
            if !current.is_empty() {
                runs.push(std::mem::take(&mut current));
            }
        } else {
            current.push((t, v));
        }
    }
    if !current.is_empty() {
        runs.push(current);
    }
    runs
}

/// Outline of mean ± std over each run where both are defined
pub fn band_polygons(time: &[f64], mean: &[f64], std: &[f64]) -> Vec<Vec<(f64, f64)>> {
    let n = time.len().min(mean.len()).min(std.len());
    let mut bands = Vec::new();
    let mut run: Vec<(f64, f64, f64)> = Vec::new();
    for i in 0..=n {
        if i < n && !mean[i].is_nan() && !std[i].is_nan() {
            run.push((time[i], mean[i], std[i]));
        } else if !run.is_empty() {
            let upper = run.iter().map(|&(t, m, s)| (t, m + s));
            let lower = run.iter().rev().map(|&(t, m, s)| (t, m - s));
            bands.push(upper.chain(lower).collect());
            run.clear();
        }
    }
    bands
}

/// Draw one track, split at NaN; returns whether a legend entry was added
fn draw_track(
    chart: &mut Chart<'_, '_>,
    time: &[f64],
    values: &[f64],
    style: ShapeStyle,
    label: Option<String>,
) -> DrawResult<bool> {
    let mut label = label;
    let mut labelled = false;
    for run in segments(time, values) {
        let anno = chart.draw_series(LineSeries::new(run, style))?;
        if let Some(text) = label.take() {
            anno.label(text)
                .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], style));
            labelled = true;
        }
    }
    Ok(labelled)
}

fn rgb(measure: Measure, condition: Condition) -> RGBColor {
    let (r, g, b) = measure.color(condition);
    RGBColor(r, g, b)
}

struct Axis {
    time: Vec<f64>,
    x_max: f64,
    window: usize,
}

/// First `window` samples of each trial track that covers the whole window
pub fn overlay_tracks(trials: &[TrialTrack], measure: Measure, window: usize) -> impl Iterator<Item = &[f64]> + '_ {
    trials
        .iter()
        .filter_map(move |t| t.tracks.get(&measure))
        .filter(move |track| track.len() >= window)
        .map(move |track| &track[..window])
}

fn draw_panel(
    area: &DrawingArea<BitMapBackend<'_>, Shift>,
    figure: Figure,
    word: &str,
    measure: Measure,
    data: &PlotData,
    axis: &Axis,
) -> DrawResult<()> {
    let (y_lo, y_hi) = match figure {
        Figure::Differences => measure.diff_range(),
        _ => measure.y_range(),
    };
    let y_desc = match figure {
        Figure::Differences => "Frequency Diff (Hz)",
        _ => "Frequency (Hz)",
    };

    let mut chart = ChartBuilder::on(area)
        .caption(figure.title(word, measure), ("sans-serif", 20))
        .margin(10)
        .x_label_area_size(40)
        .y_label_area_size(60)
        .build_cartesian_2d(0.0..axis.x_max, y_lo..y_hi)?;
    chart.configure_mesh().x_desc("Time (s)").y_desc(y_desc).draw()?;

    let tables = data.tables(measure);
    let mut labelled = false;
    match figure {
        Figure::Means => {
            if let Some(conditions) = tables.stats.get(word) {
                for cond in Condition::ALL {
                    if let Some(stats) = conditions.get(&cond).and_then(|m| m.get(&measure)) {
                        let style = rgb(measure, cond).stroke_width(2);
                        labelled |= draw_track(&mut chart, &axis.time, &stats.mean, style, Some(cond.to_string()))?;
                    }
                }
            }
        }
        Figure::Trials => {
            if let Some(conditions) = tables.data.get(word) {
                for (&cond, trials) in conditions {
                    let style = rgb(measure, cond).mix(0.3).stroke_width(1);
                    for track in overlay_tracks(trials, measure, axis.window) {
                        draw_track(&mut chart, &axis.time, track, style, None)?;
                    }
                }
                if let Some(stats) = tables.stats.get(word) {
                    for cond in Condition::ALL {
                        if let Some(s) = stats.get(&cond).and_then(|m| m.get(&measure)) {
                            let style = rgb(measure, cond).stroke_width(2);
                            let label = format!("{} (mean)", cond);
                            labelled |= draw_track(&mut chart, &axis.time, &s.mean, style, Some(label))?;
                        }
                    }
                }
            }
        }
        Figure::Differences => {
            chart.draw_series(DashedLineSeries::new(
                vec![(0.0, 0.0), (axis.x_max, 0.0)],
                6,
                4,
                BLACK.mix(0.7).stroke_width(1),
            ))?;
            if let Some(conditions) = tables.diffs.get(word) {
                for cond in Condition::SHIFTED {
                    let Some(diff) = conditions.get(&cond).and_then(|m| m.get(&measure)) else {
                        continue;
                    };
                    let color = rgb(measure, cond);
                    let label = format!("{} - {}", cond, Condition::NoShift);
                    labelled |= draw_track(&mut chart, &axis.time, &diff.mean, color.stroke_width(2), Some(label))?;
                    for outline in band_polygons(&axis.time, &diff.mean, &diff.std) {
                        chart.draw_series(std::iter::once(Polygon::new(outline, color.mix(0.2).filled())))?;
                    }
                }
            }
        }
    }

    if labelled {
        chart
            .configure_series_labels()
            .background_style(WHITE.mix(0.8))
            .border_style(BLACK)
            .draw()?;
    }
    Ok(())
}

fn render_figure(path: &Path, figure: Figure, words: &[String], data: &PlotData, axis: &Axis) -> DrawResult<()> {
    let columns = Measure::ALL.len();
    let size = (PANEL_WIDTH * columns as u32, PANEL_HEIGHT * words.len() as u32);
    let root = BitMapBackend::new(path, size).into_drawing_area();
    root.fill(&WHITE)?;
    let panels = root.split_evenly((words.len(), columns));

    for (row, word) in words.iter().enumerate() {
        for (col, &measure) in Measure::ALL.iter().enumerate() {
            draw_panel(&panels[row * columns + col], figure, word, measure, data, axis)?;
        }
    }
    root.present()?;
    Ok(())
}

/// Render the three figures of one subject; false when there is nothing to plot
pub fn plot_subject(config: &RunConfig, subject: &str) -> Result<bool> {
    let data = PlotData::load(&config.base_directory, subject)?;
    let words = data.words();
    if words.is_empty() {
        warn!("Subject {}: no aggregates to plot, skipping", subject);
        return Ok(false);
    }

    let axis = Axis {
        time: (0..config.window_sample_count)
            .map(|i| i as f64 * config.time_step)
            .collect(),
        x_max: config.window_sample_count as f64 * config.time_step,
        window: config.window_sample_count,
    };
    for figure in Figure::ALL {
        let path = config.base_directory.join(figure.file_name(subject));
        render_figure(&path, figure, &words, &data, &axis)
            .map_err(|e| PipelineError::Plot(format!("{}: {}", path.display(), e)))?;
    }
    info!("Plot: Subject {} complete!", subject);
    Ok(true)
}

/// Plot every configured subject
pub fn run(config: &RunConfig) -> Result<()> {
    for subject in config.subjects()? {
        plot_subject(config, &subject)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::{compute_diffs, compute_stats, MeanStd, TrialTable};
    use crate::store::save_tables;
    use std::collections::BTreeMap;

    fn pitch_trial(values: Vec<f64>) -> TrialTrack {
        TrialTrack {
            time: (0..values.len()).map(|i| i as f64 * 0.002).collect(),
            tracks: BTreeMap::from([(Measure::Pitch, values)]),
        }
    }

    #[test]
    fn test_nan_splits_segments() {
        let time = [0.0, 0.002, 0.004, 0.006, 0.008];
        let values = [1.0, f64::NAN, 3.0, 4.0, f64::NAN];
        let runs = segments(&time, &values);
        assert_eq!(runs, vec![vec![(0.0, 1.0)], vec![(0.004, 3.0), (0.006, 4.0)]]);
        assert!(segments(&time, &[f64::NAN; 5]).is_empty());
    }

    #[test]
    fn test_band_outline() {
        let time = [0.0, 0.002, 0.004];
        let outline = band_polygons(&time, &[10.0, 20.0, 30.0], &[1.0, 2.0, f64::NAN]);
        assert_eq!(outline.len(), 1);
        assert_eq!(
            outline[0],
            vec![(0.0, 11.0), (0.002, 22.0), (0.002, 18.0), (0.0, 9.0)]
        );
    }

    #[test]
    fn test_titles_and_files() {
        assert_eq!(Figure::Means.title("bed", Measure::F1), "bed - F1");
        assert_eq!(Figure::Differences.title("bed", Measure::Pitch), "bed - Pitch diff");
        assert_eq!(Figure::Trials.title("head", Measure::F2), "head - F2 All Trials");
        assert_eq!(Figure::Differences.file_name("110"), "plot_diff_110.png");
    }

    #[test]
    fn test_words_from_both_tables() {
        let entry = BTreeMap::from([(
            Condition::NoShift,
            BTreeMap::from([(
                Measure::Pitch,
                MeanStd {
                    mean: vec![200.0],
                    std: vec![1.0],
                },
            )]),
        )]);
        let mut data = PlotData::default();
        data.pitch.stats.insert("head".into(), entry.clone());
        data.formant.stats.insert("bed".into(), BTreeMap::new());
        data.formant.stats.insert("head".into(), entry);
        assert_eq!(data.words(), vec!["bed", "head"]);
        assert!(data.tables(Measure::Pitch).stats.contains_key("head"));
    }

    #[test]
    fn test_overlay_skips_short_trials() {
        let trials = vec![
            pitch_trial(vec![200.0; 100]),
            pitch_trial(vec![210.0; 150]),
            pitch_trial(vec![220.0; 260]),
        ];
        let drawn: Vec<&[f64]> = overlay_tracks(&trials, Measure::Pitch, 150).collect();
        assert_eq!(drawn.len(), 2);
        assert!(drawn.iter().all(|t| t.len() == 150));
        assert_eq!(drawn[0][0], 210.0);
        assert_eq!(drawn[1][149], 220.0);
        assert_eq!(overlay_tracks(&trials, Measure::F1, 150).count(), 0);
    }

    #[test]
    fn test_pitch_only_subject_renders_all_figures() {
        let dir = tempfile::tempdir().unwrap();
        let mut gappy: Vec<f64> = (0..200).map(|i| 200.0 + 0.1 * i as f64).collect();
        gappy[40..60].fill(f64::NAN);
        let mut data = TrialTable::new();
        data.entry("bed".into()).or_default().extend([
            (Condition::NoShift, vec![pitch_trial(gappy), pitch_trial(vec![198.0; 100])]),
            (Condition::ShiftUp, vec![pitch_trial(vec![225.0; 180])]),
        ]);
        // no baseline for this word
        data.entry("head".into())
            .or_default()
            .insert(Condition::ShiftDown, vec![pitch_trial(vec![185.0; 170])]);
        let stats = compute_stats(&data, 150);
        let diffs = compute_diffs(&stats);
        assert!(diffs["head"].is_empty());
        let tables = SubjectTables { data, stats, diffs };
        save_tables(dir.path(), "101", ExperimentKind::F0, &tables).unwrap();

        let config = RunConfig {
            base_directory: dir.path().to_path_buf(),
            ..RunConfig::default()
        };
        assert!(plot_subject(&config, "101").unwrap());
        for figure in Figure::ALL {
            let path = dir.path().join(figure.file_name("101"));
            let size = std::fs::metadata(&path).unwrap().len();
            assert!(size > 0, "{} is empty", path.display());
        }
    }

    #[test]
    fn test_nothing_to_plot() {
        let dir = tempfile::tempdir().unwrap();
        let config = RunConfig {
            base_directory: dir.path().to_path_buf(),
            ..RunConfig::default()
        };
        assert!(!plot_subject(&config, "101").unwrap());
        assert!(!dir.path().join("plot_avg_101.png").exists());
    }
}
