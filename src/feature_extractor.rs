//! Feature engineering for fraud model inference.
//!
//! Derives the model features from raw transaction records. The derived
//! columns and their order must match what the preprocessing artifacts
//! and the classifier were fitted on.

use crate::error::{Result, ScoringError};
use crate::types::transaction::TransactionRecord;
use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, Timelike};

/// Mean Earth radius used for great-circle distances, in kilometers.
pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// Numeric model inputs, in the order the numeric artifacts were fitted on.
pub const NUMERIC_FEATURES: [&str; 9] = [
    "amount",
    "lat",
    "lon",
    "merchant_lat",
    "merchant_lon",
    "population_city",
    "hour",
    "dow",
    "distance_km",
];

/// Categorical model inputs, in the order the categorical artifacts were fitted on.
pub const CATEGORICAL_FEATURES: [&str; 3] = ["cat_id", "us_state", "gender"];

const DATETIME_FORMATS: [&str; 5] = [
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%m/%d/%Y %H:%M:%S",
    "%m/%d/%Y %H:%M",
];

/// A transaction reduced to the columns the model consumes, plus the
/// derived temporal and geospatial features.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureVector {
    pub amount: Option<f64>,
    pub lat: Option<f64>,
    pub lon: Option<f64>,
    pub merchant_lat: Option<f64>,
    pub merchant_lon: Option<f64>,
    pub population_city: Option<f64>,
    /// Hour of day (0-23)
    pub hour: u32,
    /// Day of week, Monday = 0 through Sunday = 6
    pub dow: u32,
    /// Cardholder to merchant great-circle distance; `None` when any
    /// coordinate is missing
    pub distance_km: Option<f64>,
    pub cat_id: Option<String>,
    pub us_state: Option<String>,
    pub gender: Option<String>,
}

impl FeatureVector {
    /// Numeric values in [`NUMERIC_FEATURES`] order.
    pub fn numeric(&self) -> [Option<f64>; 9] {
        [
            self.amount,
            self.lat,
            self.lon,
            self.merchant_lat,
            self.merchant_lon,
            self.population_city,
            Some(self.hour as f64),
            Some(self.dow as f64),
            self.distance_km,
        ]
    }

    /// Categorical values in [`CATEGORICAL_FEATURES`] order.
    pub fn categorical(&self) -> [Option<&str>; 3] {
        [
            self.cat_id.as_deref(),
            self.us_state.as_deref(),
            self.gender.as_deref(),
        ]
    }
}

/// Stateless feature engineer.
#[derive(Debug, Clone, Copy, Default)]
pub struct FeatureEngineer;

impl FeatureEngineer {
    pub fn new() -> Self {
        Self
    }

    /// Derive features for a whole batch. Fails on the first record whose
    /// timestamp is missing or unparsable.
    pub fn derive_features(&self, records: &[TransactionRecord]) -> Result<Vec<FeatureVector>> {
        records
            .iter()
            .enumerate()
            .map(|(row, record)| self.derive(row, record))
            .collect()
    }

    /// Derive features for one record at position `row`.
    pub fn derive(&self, row: usize, record: &TransactionRecord) -> Result<FeatureVector> {
        let timestamp = parse_timestamp(&record.transaction_time).ok_or_else(|| {
            ScoringError::MalformedRow {
                row,
                reason: if record.transaction_time.trim().is_empty() {
                    "transaction_time is empty".to_string()
                } else {
                    format!("unparsable transaction_time '{}'", record.transaction_time)
                },
            }
        })?;

        let distance_km = match (
            record.lat,
            record.lon,
            record.merchant_lat,
            record.merchant_lon,
        ) {
            (Some(lat1), Some(lon1), Some(lat2), Some(lon2)) => {
                Some(haversine_km(lat1, lon1, lat2, lon2))
            }
            _ => None,
        };

        Ok(FeatureVector {
            amount: record.amount,
            lat: record.lat,
            lon: record.lon,
            merchant_lat: record.merchant_lat,
            merchant_lon: record.merchant_lon,
            population_city: record.population_city,
            hour: timestamp.hour(),
            dow: timestamp.weekday().num_days_from_monday(),
            distance_km,
            cat_id: record.cat_id.clone(),
            us_state: record.us_state.clone(),
            gender: record.gender.clone(),
        })
    }

    pub fn numeric_feature_names(&self) -> &'static [&'static str] {
        &NUMERIC_FEATURES
    }

    pub fn categorical_feature_names(&self) -> &'static [&'static str] {
        &CATEGORICAL_FEATURES
    }
}

/// Parse a timestamp into wall-clock time. Offsets are kept as written
/// (the hour is local to the recorded offset, not converted to UTC).
pub fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.naive_local());
    }

    for format in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(dt);
        }
    }

    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
}

/// Great-circle distance in kilometers between two points given in degrees.
pub fn haversine_km(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let phi1 = lat1.to_radians();
    let phi2 = lat2.to_radians();
    let d_phi = (lat2 - lat1).to_radians();
    let d_lambda = (lon2 - lon1).to_radians();

    let a = (d_phi / 2.0).sin().powi(2) + phi1.cos() * phi2.cos() * (d_lambda / 2.0).sin().powi(2);
    // rounding can push `a` a hair outside [0, 1] for antipodal points
    let a = a.clamp(0.0, 1.0);

    2.0 * EARTH_RADIUS_KM * a.sqrt().asin()
}
