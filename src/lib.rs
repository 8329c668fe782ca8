//! perturb-tracks: speech analysis for auditory-feedback perturbation experiments
//!
//! The crate covers three batch stages that run per subject:
//!
//! - [`ceiling`] sweeps the formant ceiling and picks the value that minimises
//!   within-trial formant variability.
//! - [`extract`] detects speech onset, rejects unusable trials, and collects
//!   onset-aligned F1/F2 and pitch tracks, which [`aggregate`] reduces to
//!   per-condition mean/std tracks and shift-minus-baseline differences.
//! - [`plot`] renders the persisted aggregates.
//!
//! The acoustic analysis underneath ([`Sound`], [`Intensity`], [`Pitch`],
//! [`Formant`]) follows Praat's algorithms. Stage inputs and outputs are MAT
//! files handled by [`container`].

pub mod sound;
pub mod window;
pub mod interpolation;
pub mod intensity;
pub mod pitch;
pub mod formant;
pub mod utils;

pub mod container;
pub mod config;
pub mod logging;
pub mod experiment;
pub mod measure;
pub mod onset;
pub mod ceiling;
pub mod extract;
pub mod aggregate;
pub mod store;
pub mod plot;

// Re-export main types at crate root
pub use sound::Sound;
pub use interpolation::Interpolation;
pub use intensity::Intensity;
pub use pitch::Pitch;
pub use formant::Formant;
pub use config::RunConfig;
pub use container::Value;
pub use experiment::{Condition, ExperimentKind, Gender};
pub use measure::Measure;

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while running a pipeline stage
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Container error: {0}")]
    Container(#[from] container::ContainerError),

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Malformed table {path}: {reason}")]
    Table { path: PathBuf, reason: String },

    #[error("Plotting error: {0}")]
    Plot(String),
}

pub type Result<T> = std::result::Result<T, PipelineError>;
