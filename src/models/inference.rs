//! Logistic regression inference

use crate::error::{Result, ScoringError};
use crate::models::preprocess::FeatureMatrix;
use crate::types::decision::ImportanceRanking;
use serde::{Deserialize, Deserializer, Serialize};
use std::cmp::Ordering;

/// A fitted binary logistic regression model.
///
/// Weights are immutable once loaded; one weight per matrix column, in
/// the column order recorded in `feature_names`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogisticClassifier {
    feature_names: Vec<String>,
    #[serde(alias = "weights", deserialize_with = "coefficients")]
    coef: Vec<f64>,
    #[serde(alias = "bias", deserialize_with = "intercept")]
    intercept: f64,
}

impl LogisticClassifier {
    pub fn new(feature_names: Vec<String>, weights: Vec<f64>, bias: f64) -> Result<Self> {
        let model = Self {
            feature_names,
            coef: weights,
            intercept: bias,
        };
        model.check_shape()?;
        Ok(model)
    }

    /// Weight count must match the recorded feature names.
    pub fn check_shape(&self) -> Result<()> {
        if self.coef.len() != self.feature_names.len() {
            return Err(ScoringError::ArtifactMismatch(format!(
                "classifier has {} weights for {} feature names",
                self.coef.len(),
                self.feature_names.len()
            )));
        }
        Ok(())
    }

    pub fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    pub fn weights(&self) -> &[f64] {
        &self.coef
    }

    pub fn bias(&self) -> f64 {
        self.intercept
    }

    pub fn n_features(&self) -> usize {
        self.coef.len()
    }

    /// Pre-sigmoid score for one row.
    pub fn logit(&self, row: &[f64]) -> f64 {
        row.iter()
            .zip(&self.coef)
            .map(|(x, w)| x * w)
            .sum::<f64>()
            + self.intercept
    }

    /// Positive-class probability for every matrix row.
    pub fn predict_probability(&self, matrix: &FeatureMatrix) -> Result<Vec<f64>> {
        if matrix.n_cols() != self.n_features() {
            return Err(ScoringError::ArtifactMismatch(format!(
                "matrix has {} columns, classifier expects {}",
                matrix.n_cols(),
                self.n_features()
            )));
        }

        Ok(matrix
            .rows()
            .iter()
            .map(|row| sigmoid(self.logit(row)))
            .collect())
    }

    /// Up to `k` features ranked by absolute weight, largest first. Equal
    /// magnitudes keep their column order.
    pub fn top_influential_features(&self, k: usize) -> ImportanceRanking {
        let mut ranked: Vec<(usize, f64)> = self
            .coef
            .iter()
            .map(|w| w.abs())
            .enumerate()
            .collect();
        // stable sort: ties stay in column order
        ranked.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal));

        ImportanceRanking::new(
            ranked
                .into_iter()
                .take(k)
                .map(|(idx, magnitude)| (self.feature_names[idx].clone(), magnitude))
                .collect(),
        )
    }
}

/// Logistic function, evaluated without overflow for large |x|.
pub fn sigmoid(x: f64) -> f64 {
    if x >= 0.0 {
        1.0 / (1.0 + (-x).exp())
    } else {
        let e = x.exp();
        e / (1.0 + e)
    }
}

/// Coefficients may be exported flat or in the `[1, n_features]` layout of
/// a binary classifier.
#[derive(Deserialize)]
#[serde(untagged)]
enum Coefficients {
    Flat(Vec<f64>),
    Nested(Vec<Vec<f64>>),
}

fn coefficients<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Vec<f64>, D::Error> {
    match Coefficients::deserialize(deserializer)? {
        Coefficients::Flat(v) => Ok(v),
        Coefficients::Nested(mut rows) if rows.len() == 1 => Ok(rows.remove(0)),
        Coefficients::Nested(rows) => Err(serde::de::Error::custom(format!(
            "expected a single coefficient row, found {}",
            rows.len()
        ))),
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Intercept {
    Scalar(f64),
    Vector(Vec<f64>),
}

fn intercept<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<f64, D::Error> {
    match Intercept::deserialize(deserializer)? {
        Intercept::Scalar(v) => Ok(v),
        Intercept::Vector(v) if v.len() == 1 => Ok(v[0]),
        Intercept::Vector(v) => Err(serde::de::Error::custom(format!(
            "expected a single intercept, found {}",
            v.len()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("f{}", i)).collect()
    }

    #[test]
    fn test_sigmoid() {
        assert_eq!(sigmoid(0.0), 0.5);
        assert!((sigmoid(2.0) + sigmoid(-2.0) - 1.0).abs() < 1e-12);
        assert_eq!(sigmoid(-1000.0), 0.0);
        assert_eq!(sigmoid(1000.0), 1.0);
    }

    #[test]
    fn test_logit() {
        let model = LogisticClassifier::new(names(3), vec![1.0, -2.0, 0.5], 0.25).unwrap();
        assert_eq!(model.logit(&[1.0, 1.0, 2.0]), 0.25);
    }

    #[test]
    fn test_shape_mismatch_rejected() {
        let err = LogisticClassifier::new(names(2), vec![1.0], 0.0).unwrap_err();
        assert!(matches!(err, ScoringError::ArtifactMismatch(_)));
    }

    #[test]
    fn test_top_k_sorted_by_magnitude() {
        let model = LogisticClassifier::new(
            names(6),
            vec![0.1, -3.0, 2.0, -0.5, 1.0, 0.7],
            0.0,
        )
        .unwrap();
        let ranking = model.top_influential_features(5);

        assert_eq!(ranking.len(), 5);
        assert_eq!(ranking.names(), vec!["f1", "f2", "f4", "f5", "f3"]);
        assert_eq!(ranking.entries()[0].1, 3.0);
        assert!(ranking.entries().windows(2).all(|w| w[0].1 >= w[1].1));
    }

    #[test]
    fn test_top_k_ties_keep_column_order() {
        let model = LogisticClassifier::new(names(4), vec![1.0, -2.0, 2.0, -1.0], 0.0).unwrap();
        let ranking = model.top_influential_features(4);
        assert_eq!(ranking.names(), vec!["f1", "f2", "f0", "f3"]);
        assert_eq!(model.top_influential_features(4), ranking);
    }

    #[test]
    fn test_top_k_with_fewer_features() {
        let model = LogisticClassifier::new(names(3), vec![1.0, 2.0, 3.0], 0.0).unwrap();
        assert_eq!(model.top_influential_features(5).len(), 3);
    }

    #[test]
    fn test_deserialize_binary_layout() {
        let json = r#"{"feature_names": ["a", "b"], "coef": [[0.5, -1.5]], "intercept": [0.2]}"#;
        let model: LogisticClassifier = serde_json::from_str(json).unwrap();
        assert_eq!(model.weights(), &[0.5, -1.5]);
        assert_eq!(model.bias(), 0.2);

        let json = r#"{"feature_names": ["a"], "weights": [2.0], "bias": -1.0}"#;
        let model: LogisticClassifier = serde_json::from_str(json).unwrap();
        assert_eq!(model.weights(), &[2.0]);
        assert_eq!(model.bias(), -1.0);
    }
}
