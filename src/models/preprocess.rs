//! Fitted preprocessing transform.
//!
//! Four parameter objects are fitted offline on the same feature subsets:
//! a numeric imputer and scaler, a categorical imputer and a one-hot
//! encoder. Applying them produces the fixed-width matrix the classifier
//! was trained on: scaled numeric block first, encoded categorical block
//! second.

use crate::error::{Result, ScoringError};
use crate::feature_extractor::{FeatureVector, CATEGORICAL_FEATURES, NUMERIC_FEATURES};
use serde::{Deserialize, Deserializer, Serialize};

/// Per-feature fill values for missing numeric cells.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NumericImputer {
    pub feature_names: Vec<String>,
    /// Learned fill value per feature (median, mean, ...)
    pub statistics: Vec<f64>,
    /// Fitting strategy, informational only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strategy: Option<String>,
}

impl NumericImputer {
    pub fn fill(&self, column: usize, value: Option<f64>) -> f64 {
        value.unwrap_or(self.statistics[column])
    }
}

/// Per-feature affine normalization `(x - center) / scale`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NumericScaler {
    pub feature_names: Vec<String>,
    #[serde(alias = "mean")]
    pub center: Vec<f64>,
    pub scale: Vec<f64>,
}

impl NumericScaler {
    pub fn apply(&self, column: usize, value: f64) -> f64 {
        let scale = self.scale[column];
        // constant features are fitted with a zero scale
        let scale = if scale == 0.0 { 1.0 } else { scale };
        (value - self.center[column]) / scale
    }
}

/// Per-feature fill values for missing categorical cells.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoricalImputer {
    pub feature_names: Vec<String>,
    #[serde(deserialize_with = "labels")]
    pub fill_values: Vec<String>,
}

impl CategoricalImputer {
    pub fn fill<'a>(&'a self, column: usize, value: Option<&'a str>) -> &'a str {
        value.unwrap_or(&self.fill_values[column])
    }
}

/// What the encoder does with a category it never saw while fitting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HandleUnknown {
    /// Emit an all-zero indicator block for the feature
    #[default]
    Ignore,
    /// Set a trailing `<feature>_other` indicator column
    Other,
}

/// One-hot encoder over the categories learned at fit time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoricalEncoder {
    pub feature_names: Vec<String>,
    #[serde(deserialize_with = "nested_labels")]
    pub categories: Vec<Vec<String>>,
    #[serde(default)]
    pub handle_unknown: HandleUnknown,
}

impl CategoricalEncoder {
    /// Indicator columns produced for one feature.
    fn block_width(&self, feature: usize) -> usize {
        let extra = match self.handle_unknown {
            HandleUnknown::Ignore => 0,
            HandleUnknown::Other => 1,
        };
        self.categories[feature].len() + extra
    }

    /// Total number of indicator columns.
    pub fn width(&self) -> usize {
        (0..self.categories.len()).map(|f| self.block_width(f)).sum()
    }

    /// Output column names, `<feature>_<category>` in fit order.
    pub fn output_names(&self) -> Vec<String> {
        let mut names = Vec::with_capacity(self.width());
        for (feature, categories) in self.feature_names.iter().zip(&self.categories) {
            for category in categories {
                names.push(format!("{}_{}", feature, category));
            }
            if self.handle_unknown == HandleUnknown::Other {
                names.push(format!("{}_other", feature));
            }
        }
        names
    }

    /// Append the indicator block for `value` of feature `feature`.
    pub fn encode_into(&self, feature: usize, value: &str, out: &mut Vec<f64>) {
        let categories = &self.categories[feature];
        let start = out.len();
        out.resize(start + self.block_width(feature), 0.0);

        match categories.iter().position(|c| c == value) {
            Some(pos) => out[start + pos] = 1.0,
            None => {
                if self.handle_unknown == HandleUnknown::Other {
                    out[start + categories.len()] = 1.0;
                }
            }
        }
    }
}

/// The four fitted preprocessing parameter objects.
#[derive(Debug, Clone, PartialEq)]
pub struct PreprocessingArtifacts {
    pub num_imputer: NumericImputer,
    pub num_scaler: NumericScaler,
    pub cat_imputer: CategoricalImputer,
    pub cat_encoder: CategoricalEncoder,
}

impl PreprocessingArtifacts {
    /// Check every artifact against the feature subsets it will be applied
    /// to, and each artifact's parameter vectors against its own names.
    pub fn validate(&self, numeric: &[&str], categorical: &[&str]) -> Result<()> {
        expect_names("num_imputer", &self.num_imputer.feature_names, numeric)?;
        expect_names("num_scaler", &self.num_scaler.feature_names, numeric)?;
        expect_names("cat_imputer", &self.cat_imputer.feature_names, categorical)?;
        expect_names("cat_encoder", &self.cat_encoder.feature_names, categorical)?;

        expect_len("num_imputer.statistics", self.num_imputer.statistics.len(), numeric.len())?;
        expect_len("num_scaler.center", self.num_scaler.center.len(), numeric.len())?;
        expect_len("num_scaler.scale", self.num_scaler.scale.len(), numeric.len())?;
        expect_len(
            "cat_imputer.fill_values",
            self.cat_imputer.fill_values.len(),
            categorical.len(),
        )?;
        expect_len(
            "cat_encoder.categories",
            self.cat_encoder.categories.len(),
            categorical.len(),
        )?;
        Ok(())
    }

    /// Matrix column names: numeric features, then encoder output names.
    pub fn output_names(&self) -> Vec<String> {
        self.num_scaler
            .feature_names
            .iter()
            .cloned()
            .chain(self.cat_encoder.output_names())
            .collect()
    }

    pub fn width(&self) -> usize {
        self.num_scaler.feature_names.len() + self.cat_encoder.width()
    }
}

fn expect_names(artifact: &str, actual: &[String], expected: &[&str]) -> Result<()> {
    if actual.iter().map(String::as_str).eq(expected.iter().copied()) {
        Ok(())
    } else {
        Err(ScoringError::ArtifactMismatch(format!(
            "{} was fitted on {:?}, batch provides {:?}",
            artifact, actual, expected
        )))
    }
}

fn expect_len(what: &str, actual: usize, expected: usize) -> Result<()> {
    if actual == expected {
        Ok(())
    } else {
        Err(ScoringError::ArtifactMismatch(format!(
            "{} has {} entries, expected {}",
            what, actual, expected
        )))
    }
}

/// Row-major numeric matrix with named columns.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureMatrix {
    columns: Vec<String>,
    rows: Vec<Vec<f64>>,
}

impl FeatureMatrix {
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<f64>] {
        &self.rows
    }

    pub fn n_rows(&self) -> usize {
        self.rows.len()
    }

    pub fn n_cols(&self) -> usize {
        self.columns.len()
    }
}

/// Apply the fitted artifacts to a batch of feature vectors.
pub fn transform(
    features: &[FeatureVector],
    artifacts: &PreprocessingArtifacts,
) -> Result<FeatureMatrix> {
    artifacts.validate(&NUMERIC_FEATURES, &CATEGORICAL_FEATURES)?;

    let width = artifacts.width();
    let rows = features
        .iter()
        .map(|fv| {
            let mut row = Vec::with_capacity(width);

            for (col, value) in fv.numeric().into_iter().enumerate() {
                let filled = artifacts.num_imputer.fill(col, value);
                row.push(artifacts.num_scaler.apply(col, filled));
            }

            for (col, value) in fv.categorical().into_iter().enumerate() {
                let filled = artifacts.cat_imputer.fill(col, value);
                artifacts.cat_encoder.encode_into(col, filled, &mut row);
            }

            row
        })
        .collect();

    Ok(FeatureMatrix {
        columns: artifacts.output_names(),
        rows,
    })
}

/// Category labels may be exported as strings or numbers.
#[derive(Deserialize)]
#[serde(untagged)]
enum Label {
    Text(String),
    Number(serde_json::Number),
}

impl From<Label> for String {
    fn from(label: Label) -> Self {
        match label {
            Label::Text(s) => s,
            Label::Number(n) => n.to_string(),
        }
    }
}

fn labels<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Vec<String>, D::Error> {
    let raw = Vec::<Label>::deserialize(deserializer)?;
    Ok(raw.into_iter().map(String::from).collect())
}

fn nested_labels<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> std::result::Result<Vec<Vec<String>>, D::Error> {
    let raw = Vec::<Vec<Label>>::deserialize(deserializer)?;
    Ok(raw
        .into_iter()
        .map(|labels| labels.into_iter().map(String::from).collect())
        .collect())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    pub(crate) fn toy_artifacts() -> PreprocessingArtifacts {
        PreprocessingArtifacts {
            num_imputer: NumericImputer {
                feature_names: strings(&NUMERIC_FEATURES),
                statistics: vec![50.0, 40.0, -74.0, 40.0, -74.0, 1000.0, 12.0, 3.0, 10.0],
                strategy: Some("median".to_string()),
            },
            num_scaler: NumericScaler {
                feature_names: strings(&NUMERIC_FEATURES),
                center: vec![100.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0],
                scale: vec![50.0, 1.0, 1.0, 1.0, 1.0, 1.0, 1.0, 1.0, 0.0],
            },
            cat_imputer: CategoricalImputer {
                feature_names: strings(&CATEGORICAL_FEATURES),
                fill_values: strings(&["food", "NY", "F"]),
            },
            cat_encoder: CategoricalEncoder {
                feature_names: strings(&CATEGORICAL_FEATURES),
                categories: vec![
                    strings(&["food", "travel"]),
                    strings(&["CA", "NY"]),
                    strings(&["F", "M"]),
                ],
                handle_unknown: HandleUnknown::Ignore,
            },
        }
    }

    fn vector(amount: Option<f64>, cat: Option<&str>) -> FeatureVector {
        FeatureVector {
            amount,
            lat: Some(1.0),
            lon: Some(2.0),
            merchant_lat: Some(3.0),
            merchant_lon: Some(4.0),
            population_city: Some(5.0),
            hour: 6,
            dow: 0,
            distance_km: None,
            cat_id: cat.map(str::to_string),
            us_state: Some("CA".to_string()),
            gender: Some("M".to_string()),
        }
    }

    #[test]
    fn test_numeric_impute_then_scale() {
        let artifacts = toy_artifacts();
        let matrix = transform(&[vector(None, Some("food"))], &artifacts).unwrap();
        let row = &matrix.rows()[0];

        // amount imputed to 50, then (50 - 100) / 50
        assert_eq!(row[0], -1.0);
        assert_eq!(row[6], 6.0);
        // distance imputed to 10; zero scale treated as 1
        assert_eq!(row[8], 10.0);
    }

    #[test]
    fn test_categorical_block_layout() {
        let artifacts = toy_artifacts();
        let matrix = transform(&[vector(Some(100.0), Some("travel"))], &artifacts).unwrap();

        assert_eq!(
            &matrix.columns()[9..],
            &strings(&[
                "cat_id_food",
                "cat_id_travel",
                "us_state_CA",
                "us_state_NY",
                "gender_F",
                "gender_M"
            ])[..]
        );
        assert_eq!(&matrix.rows()[0][9..], &[0.0, 1.0, 1.0, 0.0, 0.0, 1.0]);
    }

    #[test]
    fn test_missing_category_is_imputed() {
        let artifacts = toy_artifacts();
        let matrix = transform(&[vector(Some(100.0), None)], &artifacts).unwrap();
        assert_eq!(&matrix.rows()[0][9..11], &[1.0, 0.0]);
    }

    #[test]
    fn test_unseen_category_is_all_zero() {
        let artifacts = toy_artifacts();
        let matrix = transform(&[vector(Some(100.0), Some("casino"))], &artifacts).unwrap();
        assert_eq!(matrix.n_cols(), 15);
        assert_eq!(&matrix.rows()[0][9..11], &[0.0, 0.0]);
    }

    #[test]
    fn test_unseen_category_with_other_column() {
        let mut artifacts = toy_artifacts();
        artifacts.cat_encoder.handle_unknown = HandleUnknown::Other;
        let matrix = transform(&[vector(Some(100.0), Some("casino"))], &artifacts).unwrap();

        assert_eq!(matrix.n_cols(), 18);
        assert_eq!(matrix.columns()[11], "cat_id_other");
        assert_eq!(&matrix.rows()[0][9..12], &[0.0, 0.0, 1.0]);
    }

    #[test]
    fn test_column_order_stable_across_batch_sizes() {
        let artifacts = toy_artifacts();
        let small = transform(&[vector(Some(1.0), Some("food"))], &artifacts).unwrap();
        let large_batch: Vec<FeatureVector> = (0..7)
            .map(|i| vector(Some(i as f64), Some("travel")))
            .collect();
        let large = transform(&large_batch, &artifacts).unwrap();

        assert_eq!(small.columns(), large.columns());
        assert_eq!(small.n_cols(), large.n_cols());
        assert!(large.rows().iter().all(|r| r.len() == large.n_cols()));
    }

    #[test]
    fn test_mismatched_feature_set_is_rejected() {
        let mut artifacts = toy_artifacts();
        artifacts.num_scaler.feature_names.swap(0, 1);
        let err = transform(&[vector(Some(1.0), None)], &artifacts).unwrap_err();
        assert!(matches!(err, ScoringError::ArtifactMismatch(_)));

        let mut artifacts = toy_artifacts();
        artifacts.cat_imputer.fill_values.pop();
        let err = transform(&[], &artifacts).unwrap_err();
        assert!(matches!(err, ScoringError::ArtifactMismatch(_)));
    }

    #[test]
    fn test_encoder_accepts_numeric_categories() {
        let json = r#"{
            "feature_names": ["cat_id", "us_state", "gender"],
            "categories": [[1, 2], ["CA"], ["F", "M"]]
        }"#;
        let encoder: CategoricalEncoder = serde_json::from_str(json).unwrap();
        assert_eq!(encoder.categories[0], strings(&["1", "2"]));
        assert_eq!(encoder.handle_unknown, HandleUnknown::Ignore);
        assert_eq!(encoder.width(), 5);
    }
}
