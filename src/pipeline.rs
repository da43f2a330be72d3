//! Scoring pipeline: feature engineering, preprocessing, inference and
//! thresholding over one batch.
//!
//! The pipeline owns its loaded artifacts. Construction loads and
//! cross-validates them once; [`ScoringPipeline::score`] reuses that state
//! and [`ScoringPipeline::reload`] swaps in a freshly loaded set.

use crate::error::{Result, ScoringError};
use crate::feature_extractor::{FeatureEngineer, CATEGORICAL_FEATURES, NUMERIC_FEATURES};
use crate::models::inference::LogisticClassifier;
use crate::models::loader::{ArtifactLoader, ArtifactPaths};
use crate::models::preprocess::{transform, PreprocessingArtifacts};
use crate::types::decision::{ImportanceRanking, ScoreResult};
use crate::types::transaction::TransactionRecord;
use tracing::{debug, info, warn};

/// Number of features reported in the importance ranking.
pub const DEFAULT_TOP_K: usize = 5;

/// Loaded, mutually consistent scoring state.
#[derive(Debug, Clone)]
struct LoadedState {
    artifacts: PreprocessingArtifacts,
    classifier: LogisticClassifier,
}

impl LoadedState {
    fn load(paths: &ArtifactPaths) -> Result<Self> {
        let artifacts = ArtifactLoader::load_preprocessing(paths)?;
        let classifier = ArtifactLoader::load_classifier(paths)?;
        check_consistency(&artifacts, &classifier)?;
        Ok(Self {
            artifacts,
            classifier,
        })
    }
}

/// Verify the preprocessing artifacts and the classifier describe the same
/// matrix, column for column.
pub fn check_consistency(
    artifacts: &PreprocessingArtifacts,
    classifier: &LogisticClassifier,
) -> Result<()> {
    artifacts.validate(&NUMERIC_FEATURES, &CATEGORICAL_FEATURES)?;
    classifier.check_shape()?;

    let expected = artifacts.output_names();
    if classifier.feature_names() != expected.as_slice() {
        let first_diff = expected
            .iter()
            .zip(classifier.feature_names())
            .position(|(a, b)| a != b)
            .unwrap_or_else(|| expected.len().min(classifier.n_features()));
        return Err(ScoringError::ArtifactMismatch(format!(
            "classifier expects {} columns, preprocessing produces {} (first difference at column {})",
            classifier.n_features(),
            expected.len(),
            first_diff
        )));
    }
    Ok(())
}

/// Batch scoring pipeline.
pub struct ScoringPipeline {
    paths: ArtifactPaths,
    engineer: FeatureEngineer,
    state: LoadedState,
}

impl ScoringPipeline {
    /// Load and validate all artifacts.
    pub fn load(paths: ArtifactPaths) -> Result<Self> {
        let state = LoadedState::load(&paths)?;
        info!(
            preprocessors = %paths.preprocessors_dir.display(),
            model = %paths.model_path.display(),
            columns = state.classifier.n_features(),
            "Scoring pipeline ready"
        );
        Ok(Self {
            paths,
            engineer: FeatureEngineer::new(),
            state,
        })
    }

    /// Re-read the artifacts from the same location. The current state is
    /// kept when the new set fails to load or validate.
    pub fn reload(&mut self) -> Result<()> {
        match LoadedState::load(&self.paths) {
            Ok(state) => {
                self.state = state;
                info!(columns = self.state.classifier.n_features(), "Artifacts reloaded");
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "Artifact reload failed, keeping previous artifacts");
                Err(e)
            }
        }
    }

    /// Score a batch. Labels use an inclusive threshold.
    pub fn score(&self, records: &[TransactionRecord], threshold: f64) -> Result<ScoreResult> {
        let features = self.engineer.derive_features(records)?;
        let matrix = transform(&features, &self.state.artifacts)?;
        let scores = self.state.classifier.predict_probability(&matrix)?;
        if let Some(row) = scores.iter().position(|p| !p.is_finite()) {
            return Err(ScoringError::MalformedRow {
                row,
                reason: "non-finite score from non-finite input values".to_string(),
            });
        }

        let result = ScoreResult::from_scores(scores, threshold);
        debug!(
            rows = result.len(),
            columns = matrix.n_cols(),
            positives = result.positives(),
            threshold = threshold,
            "Batch scored"
        );
        Ok(result)
    }

    pub fn top_influential_features(&self, k: usize) -> ImportanceRanking {
        self.state.classifier.top_influential_features(k)
    }

    /// Matrix column names, in classifier weight order.
    pub fn feature_names(&self) -> &[String] {
        self.state.classifier.feature_names()
    }

    pub fn column_count(&self) -> usize {
        self.state.classifier.n_features()
    }

    pub fn paths(&self) -> &ArtifactPaths {
        &self.paths
    }
}
