//! Error taxonomy for the scoring core

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while scoring one batch.
#[derive(Error, Debug)]
pub enum ScoringError {
    /// One or more required input columns are absent.
    #[error("malformed input: missing required columns [{}]", .0.join(", "))]
    MissingColumns(Vec<String>),

    /// A cell could not be parsed (bad timestamp, non-numeric amount, ...).
    #[error("malformed input at row {row}: {reason}")]
    MalformedRow { row: usize, reason: String },

    /// Fitted artifacts disagree with each other or with the batch schema.
    #[error("artifact mismatch: {0}")]
    ArtifactMismatch(String),

    /// A parameter object is missing or cannot be decoded.
    #[error("failed to load artifact '{name}' from {}: {reason}", .path.display())]
    ArtifactLoad {
        name: String,
        path: PathBuf,
        reason: String,
    },

    /// The input file could not be opened.
    #[error("failed to read input {}: {source}", .path.display())]
    Input {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// An output artifact could not be written.
    #[error("failed to write {}: {source}", .path.display())]
    Output {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl ScoringError {
    /// True for the malformed-input family (schema or cell errors).
    pub fn is_malformed_input(&self) -> bool {
        matches!(
            self,
            ScoringError::MissingColumns(_) | ScoringError::MalformedRow { .. }
        )
    }

    pub(crate) fn artifact_load(
        name: &str,
        path: impl Into<PathBuf>,
        reason: impl ToString,
    ) -> Self {
        ScoringError::ArtifactLoad {
            name: name.to_string(),
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, ScoringError>;
