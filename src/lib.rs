//! Fraud Scoring Service Library
//!
//! Batch scoring of transaction files: feature engineering, fitted
//! preprocessing, logistic inference and thresholding, with the decision
//! table and diagnostics written per input file.

pub mod config;
pub mod consumer;
pub mod error;
pub mod feature_extractor;
pub mod metrics;
pub mod models;
pub mod pipeline;
pub mod producer;
pub mod service;
pub mod types;

pub use config::ServiceConfig;
pub use consumer::InputWatcher;
pub use error::ScoringError;
pub use feature_extractor::FeatureEngineer;
pub use models::{ArtifactPaths, LogisticClassifier, PreprocessingArtifacts};
pub use pipeline::ScoringPipeline;
pub use producer::ArtifactWriter;
pub use service::{InputHandler, ScoringService};
pub use types::{transaction::TransactionRecord, ScoreResult};
