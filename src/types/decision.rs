//! Scoring outputs: per-record scores, decisions and feature importances

use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};

/// Probabilities and thresholded labels for one batch, in input order.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoreResult {
    /// Fraud probability per record (0.0 - 1.0)
    pub scores: Vec<f64>,
    /// 1 when the probability reached the threshold, else 0
    pub labels: Vec<u8>,
}

impl ScoreResult {
    /// Apply an inclusive threshold to a score vector.
    pub fn from_scores(scores: Vec<f64>, threshold: f64) -> Self {
        let labels = scores.iter().map(|&p| label_for(p, threshold)).collect();
        Self { scores, labels }
    }

    pub fn len(&self) -> usize {
        self.scores.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scores.is_empty()
    }

    /// Number of records labelled positive.
    pub fn positives(&self) -> usize {
        self.labels.iter().filter(|&&l| l == 1).count()
    }

    /// Pair every label with its original row position.
    pub fn submission(&self) -> Submission {
        self.labels
            .iter()
            .enumerate()
            .map(|(index, &prediction)| Decision { index, prediction })
            .collect()
    }
}

/// `probability >= threshold` labels positive. Thresholds outside [0, 1]
/// are honoured as given and simply make every label the same.
pub fn label_for(probability: f64, threshold: f64) -> u8 {
    if probability >= threshold {
        1
    } else {
        0
    }
}

/// One row of the decision table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Decision {
    /// Original row position in the input file
    pub index: usize,
    /// Thresholded label (0 or 1)
    pub prediction: u8,
}

/// Decision table for one batch, in input order.
pub type Submission = Vec<Decision>;

/// Most influential model features with their absolute weight,
/// most influential first.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ImportanceRanking {
    entries: Vec<(String, f64)>,
}

impl ImportanceRanking {
    pub fn new(entries: Vec<(String, f64)>) -> Self {
        Self { entries }
    }

    pub fn entries(&self) -> &[(String, f64)] {
        &self.entries
    }

    pub fn names(&self) -> Vec<&str> {
        self.entries.iter().map(|(n, _)| n.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// Serialized as a JSON object whose key order is the ranking order.
impl Serialize for ImportanceRanking {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (name, magnitude) in &self.entries {
            map.serialize_entry(name, magnitude)?;
        }
        map.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_threshold_is_inclusive() {
        assert_eq!(label_for(0.5, 0.5), 1);
        assert_eq!(label_for(0.5 - 1e-12, 0.5), 0);
    }

    #[test]
    fn test_out_of_range_threshold_is_not_clamped() {
        let result = ScoreResult::from_scores(vec![0.0, 0.4, 1.0], 1.5);
        assert_eq!(result.labels, vec![0, 0, 0]);

        let result = ScoreResult::from_scores(vec![0.0, 0.4, 1.0], -0.1);
        assert_eq!(result.labels, vec![1, 1, 1]);
    }

    #[test]
    fn test_submission_preserves_row_order() {
        let result = ScoreResult::from_scores(vec![0.9, 0.1, 0.7], 0.5);
        let submission = result.submission();
        assert_eq!(
            submission,
            vec![
                Decision { index: 0, prediction: 1 },
                Decision { index: 1, prediction: 0 },
                Decision { index: 2, prediction: 1 },
            ]
        );
        assert_eq!(result.positives(), 2);
    }

    #[test]
    fn test_importance_serializes_in_rank_order() {
        let ranking = ImportanceRanking::new(vec![
            ("zeta".to_string(), 3.0),
            ("alpha".to_string(), 1.5),
        ]);
        let json = serde_json::to_string(&ranking).unwrap();
        assert_eq!(json, r#"{"zeta":3.0,"alpha":1.5}"#);
    }
}
