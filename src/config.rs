//! Configuration management for the scoring service

use crate::metrics::DEFAULT_HISTOGRAM_BINS;
use crate::models::loader::{ArtifactPaths, DEFAULT_MODEL_FILE};
use crate::pipeline::DEFAULT_TOP_K;
use anyhow::{Context, Result};
use config::{Config, Environment, File, FileFormat};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Config file read when `SCORING_CONFIG` is not set.
pub const DEFAULT_CONFIG_FILE: &str = "config/service.toml";

/// Environment variable naming an alternative config file.
pub const CONFIG_FILE_ENV: &str = "SCORING_CONFIG";

/// Log output format
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable lines
    #[default]
    Pretty,
    /// One JSON object per event
    Json,
}

/// Service configuration, read once at startup.
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
    /// Directory watched for new CSV batches
    pub input_dir: PathBuf,
    /// Directory receiving decision tables and diagnostics
    pub output_dir: PathBuf,
    /// Directory holding the classifier
    pub models_dir: PathBuf,
    /// Classifier file; defaults to `<models_dir>/logreg_model.json`
    #[serde(default)]
    pub model_path: Option<PathBuf>,
    /// Directory holding the four preprocessing artifacts
    pub preprocessors_dir: PathBuf,
    /// Probability at or above which a record is labelled positive
    pub score_threshold: f64,
    /// Entries in the importance ranking
    pub top_k: usize,
    /// Buckets in the score density histogram
    pub histogram_bins: usize,
    /// Log level for the service's own events
    pub log_level: String,
    #[serde(default)]
    pub log_format: LogFormat,
    /// Optional log file, appended to alongside stdout
    #[serde(default)]
    pub log_path: Option<PathBuf>,
}

impl ServiceConfig {
    /// Load configuration from defaults, the config file and the process
    /// environment.
    pub fn load() -> Result<Self> {
        let file = std::env::var(CONFIG_FILE_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_FILE.to_string());
        Self::load_from(Some(Path::new(&file)), None)
    }

    /// Load configuration from an optional file and an environment map.
    /// `env = None` reads the process environment.
    pub fn load_from(file: Option<&Path>, env: Option<config::Map<String, String>>) -> Result<Self> {
        let mut builder = Config::builder()
            .set_default("input_dir", "/app/input")?
            .set_default("output_dir", "/app/output")?
            .set_default("models_dir", "/app/models")?
            .set_default("preprocessors_dir", "/app/preprocessors")?
            .set_default("score_threshold", 0.5)?
            .set_default("top_k", DEFAULT_TOP_K as i64)?
            .set_default("histogram_bins", DEFAULT_HISTOGRAM_BINS as i64)?
            .set_default("log_level", "info")?;

        if let Some(path) = file {
            builder = builder.add_source(
                File::from(path)
                    .format(FileFormat::Toml)
                    .required(false),
            );
        }

        let config = builder
            .add_source(Environment::default().try_parsing(true).source(env))
            .build()
            .context("Failed to build configuration")?;

        config
            .try_deserialize()
            .context("Failed to deserialize configuration")
    }

    /// Classifier location, derived from `models_dir` when not set.
    pub fn resolved_model_path(&self) -> PathBuf {
        self.model_path
            .clone()
            .unwrap_or_else(|| self.models_dir.join(DEFAULT_MODEL_FILE))
    }

    pub fn artifact_paths(&self) -> ArtifactPaths {
        ArtifactPaths::new(&self.preprocessors_dir, self.resolved_model_path())
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            input_dir: PathBuf::from("/app/input"),
            output_dir: PathBuf::from("/app/output"),
            models_dir: PathBuf::from("/app/models"),
            model_path: None,
            preprocessors_dir: PathBuf::from("/app/preprocessors"),
            score_threshold: 0.5,
            top_k: DEFAULT_TOP_K,
            histogram_bins: DEFAULT_HISTOGRAM_BINS,
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            log_path: None,
        }
    }
}
