//! Run configuration shared by the three pipeline stages
//!
//! Loaded from a TOML file; every field has a default so a missing file or a
//! partial file is fine. Unknown keys are an error.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

/// Configuration file looked up when no path is given
pub const DEFAULT_CONFIG_FILE: &str = "perturb.toml";

/// Errors raised while loading or validating a run configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Invalid config at {path}: {source}")]
    ParseToml {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("Failed to list subjects in {path}: {source}")]
    ListSubjects {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Invalid setting `{field}`: {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// Parameters of one pipeline run
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RunConfig {
    /// Directory holding one sub-directory per subject; outputs land here too
    pub base_directory: PathBuf,
    /// Subjects to process; empty means every sub-directory of the base
    pub subject_ids: Vec<String>,
    /// Formant ceilings tried by the sweep (Hz)
    pub candidate_ceilings: Vec<f64>,
    /// Frames at or below this intensity (dB) are left out of the sweep
    pub intensity_threshold: f64,
    /// Analysis step of the extracted tracks (s)
    pub time_step: f64,
    /// Samples per aggregated track
    pub window_sample_count: usize,
    /// Trials per subject used by the sweep
    pub max_sweep_trials: usize,
    /// Analysis step of the sweep (s)
    pub sweep_time_step: f64,
    pub formant_window_length: f64,
    pub pre_emphasis_from: f64,
    pub max_formants: usize,
    /// Onset threshold below the intensity peak (dB)
    pub onset_drop_db: f64,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            base_directory: PathBuf::from("."),
            subject_ids: Vec::new(),
            candidate_ceilings: (0..=11).map(|i| 4000.0 + 200.0 * i as f64).collect(),
            intensity_threshold: 60.0,
            time_step: 0.002,
            window_sample_count: 150,
            max_sweep_trials: 60,
            sweep_time_step: 0.025,
            formant_window_length: 0.025,
            pre_emphasis_from: 50.0,
            max_formants: 4,
            onset_drop_db: 10.0,
        }
    }
}

impl RunConfig {
    /// Load and validate; a missing file yields the defaults
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: RunConfig = toml::from_str(&text).map_err(|source| ConfigError::ParseToml {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Load from the first command-line argument, or from `perturb.toml`
    pub fn from_args() -> Result<Self, ConfigError> {
        let path = std::env::args_os()
            .nth(1)
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));
        Self::load(&path)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.candidate_ceilings.is_empty() {
            return Err(ConfigError::Invalid {
                field: "candidate_ceilings",
                reason: "at least one ceiling is required".into(),
            });
        }
        if let Some(bad) = self.candidate_ceilings.iter().find(|c| !(**c > 0.0)) {
            return Err(ConfigError::Invalid {
                field: "candidate_ceilings",
                reason: format!("ceiling {} is not positive", bad),
            });
        }
        for (field, value) in [
            ("time_step", self.time_step),
            ("sweep_time_step", self.sweep_time_step),
            ("formant_window_length", self.formant_window_length),
        ] {
            if !(value > 0.0) {
                return Err(ConfigError::Invalid {
                    field,
                    reason: format!("{} must be positive", value),
                });
            }
        }
        if self.window_sample_count == 0 {
            return Err(ConfigError::Invalid {
                field: "window_sample_count",
                reason: "window must hold at least one sample".into(),
            });
        }
        if self.max_formants == 0 {
            return Err(ConfigError::Invalid {
                field: "max_formants",
                reason: "at least one formant is required".into(),
            });
        }
        Ok(())
    }

    /// Directory of one subject's recordings
    pub fn subject_dir(&self, subject: &str) -> PathBuf {
        self.base_directory.join(subject)
    }

    /// Configured subjects, or every sub-directory of the base in name order
    pub fn subjects(&self) -> Result<Vec<String>, ConfigError> {
        if !self.subject_ids.is_empty() {
            return Ok(self.subject_ids.clone());
        }
        let entries = fs::read_dir(&self.base_directory).map_err(|source| ConfigError::ListSubjects {
            path: self.base_directory.clone(),
            source,
        })?;
        let mut subjects: Vec<String> = entries
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().map(|ft| ft.is_dir()).unwrap_or(false))
            .filter_map(|entry| entry.file_name().to_str().map(str::to_string))
            .collect();
        subjects.sort();
        Ok(subjects)
    }
}
