//! Fitted artifact loader

use crate::error::{Result, ScoringError};
use crate::models::inference::LogisticClassifier;
use crate::models::preprocess::{
    CategoricalEncoder, CategoricalImputer, NumericImputer, NumericScaler, PreprocessingArtifacts,
};
use serde::de::DeserializeOwned;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

pub const NUM_IMPUTER: &str = "num_imputer";
pub const NUM_SCALER: &str = "num_scaler";
pub const CAT_IMPUTER: &str = "cat_imputer";
pub const CAT_ENCODER: &str = "cat_encoder";
pub const CLASSIFIER: &str = "classifier";

/// File name of the classifier inside the models directory.
pub const DEFAULT_MODEL_FILE: &str = "logreg_model.json";

const ARTIFACT_EXTENSION: &str = "json";

/// Where the fitted parameter objects live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactPaths {
    /// Directory holding the four preprocessing artifacts
    pub preprocessors_dir: PathBuf,
    /// Classifier parameter file
    pub model_path: PathBuf,
}

impl ArtifactPaths {
    pub fn new(preprocessors_dir: impl Into<PathBuf>, model_path: impl Into<PathBuf>) -> Self {
        Self {
            preprocessors_dir: preprocessors_dir.into(),
            model_path: model_path.into(),
        }
    }

    /// Path of a named preprocessing artifact, e.g. `num_scaler.json`.
    pub fn preprocessor(&self, name: &str) -> PathBuf {
        self.preprocessors_dir
            .join(name)
            .with_extension(ARTIFACT_EXTENSION)
    }
}

/// Loader for the read-only parameter objects.
pub struct ArtifactLoader;

impl ArtifactLoader {
    /// Load one JSON parameter object. The file handle is released before
    /// returning, on success and on error.
    pub fn load_json<T: DeserializeOwned>(name: &str, path: &Path) -> Result<T> {
        debug!(artifact = %name, path = %path.display(), "Loading artifact");

        let file = File::open(path).map_err(|e| ScoringError::artifact_load(name, path, e))?;
        serde_json::from_reader(BufReader::new(file))
            .map_err(|e| ScoringError::artifact_load(name, path, e))
    }

    /// Load the four preprocessing artifacts.
    pub fn load_preprocessing(paths: &ArtifactPaths) -> Result<PreprocessingArtifacts> {
        let num_imputer: NumericImputer =
            Self::load_json(NUM_IMPUTER, &paths.preprocessor(NUM_IMPUTER))?;
        let num_scaler: NumericScaler =
            Self::load_json(NUM_SCALER, &paths.preprocessor(NUM_SCALER))?;
        let cat_imputer: CategoricalImputer =
            Self::load_json(CAT_IMPUTER, &paths.preprocessor(CAT_IMPUTER))?;
        let cat_encoder: CategoricalEncoder =
            Self::load_json(CAT_ENCODER, &paths.preprocessor(CAT_ENCODER))?;

        info!(
            dir = %paths.preprocessors_dir.display(),
            encoded_columns = cat_encoder.width(),
            "Preprocessing artifacts loaded"
        );

        Ok(PreprocessingArtifacts {
            num_imputer,
            num_scaler,
            cat_imputer,
            cat_encoder,
        })
    }

    /// Load the classifier and check its weight vector against its names.
    pub fn load_classifier(paths: &ArtifactPaths) -> Result<LogisticClassifier> {
        let model: LogisticClassifier = Self::load_json(CLASSIFIER, &paths.model_path)?;
        model.check_shape()?;

        info!(
            path = %paths.model_path.display(),
            features = model.n_features(),
            "Classifier loaded"
        );

        Ok(model)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_preprocessor_path() {
        let paths = ArtifactPaths::new("/app/preprocessors", "/app/models/logreg_model.json");
        assert_eq!(
            paths.preprocessor(NUM_SCALER),
            PathBuf::from("/app/preprocessors/num_scaler.json")
        );
    }

    #[test]
    fn test_missing_artifact_is_load_error() {
        let dir = tempfile::tempdir().unwrap();
        let paths = ArtifactPaths::new(dir.path(), dir.path().join("model.json"));

        let err = ArtifactLoader::load_preprocessing(&paths).unwrap_err();
        match err {
            ScoringError::ArtifactLoad { name, .. } => assert_eq!(name, NUM_IMPUTER),
            other => panic!("unexpected error: {other}"),
        }

        let err = ArtifactLoader::load_classifier(&paths).unwrap_err();
        assert!(matches!(err, ScoringError::ArtifactLoad { .. }));
    }

    #[test]
    fn test_undecodable_artifact_is_load_error() {
        let dir = tempfile::tempdir().unwrap();
        let model_path = dir.path().join("model.json");
        fs::write(&model_path, "{ not json").unwrap();

        let paths = ArtifactPaths::new(dir.path(), &model_path);
        let err = ArtifactLoader::load_classifier(&paths).unwrap_err();
        assert!(matches!(err, ScoringError::ArtifactLoad { .. }));
    }

    #[test]
    fn test_classifier_shape_checked_on_load() {
        let dir = tempfile::tempdir().unwrap();
        let model_path = dir.path().join("model.json");
        fs::write(
            &model_path,
            r#"{"feature_names": ["a", "b"], "coef": [1.0], "intercept": 0.0}"#,
        )
        .unwrap();

        let paths = ArtifactPaths::new(dir.path(), &model_path);
        let err = ArtifactLoader::load_classifier(&paths).unwrap_err();
        assert!(matches!(err, ScoringError::ArtifactMismatch(_)));
    }
}
