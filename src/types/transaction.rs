//! Raw transaction records and batch input reading

use crate::error::{Result, ScoringError};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::HashSet;
use std::fs::File;
use std::io::Read;
use std::path::Path;

/// Columns every input batch must carry, in schema order.
pub const REQUIRED_COLUMNS: [&str; 10] = [
    "transaction_time",
    "amount",
    "lat",
    "lon",
    "merchant_lat",
    "merchant_lon",
    "population_city",
    "cat_id",
    "us_state",
    "gender",
];

/// One row of an input batch.
///
/// Numeric cells that are empty or `NaN` deserialize to `None` and are
/// filled later by the numeric imputer. Infinite values are rejected. Identity and free-text columns are
/// carried through untouched but never reach the model.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TransactionRecord {
    /// Transaction timestamp, parsed during feature engineering
    pub transaction_time: String,

    /// Transaction amount
    #[serde(deserialize_with = "nan_as_none")]
    pub amount: Option<f64>,

    /// Cardholder latitude
    #[serde(deserialize_with = "nan_as_none")]
    pub lat: Option<f64>,

    /// Cardholder longitude
    #[serde(deserialize_with = "nan_as_none")]
    pub lon: Option<f64>,

    /// Merchant latitude
    #[serde(deserialize_with = "nan_as_none")]
    pub merchant_lat: Option<f64>,

    /// Merchant longitude
    #[serde(deserialize_with = "nan_as_none")]
    pub merchant_lon: Option<f64>,

    /// Population of the cardholder's city
    #[serde(deserialize_with = "nan_as_none")]
    pub population_city: Option<f64>,

    /// Merchant category id
    pub cat_id: Option<String>,

    /// Region code
    pub us_state: Option<String>,

    /// Cardholder gender
    pub gender: Option<String>,

    #[serde(default)]
    pub name_1: Option<String>,
    #[serde(default)]
    pub name_2: Option<String>,
    #[serde(default)]
    pub street: Option<String>,
    #[serde(default)]
    pub one_city: Option<String>,
    #[serde(default)]
    pub jobs: Option<String>,
    #[serde(default)]
    pub merch: Option<String>,
    #[serde(default)]
    pub post_code: Option<String>,

    /// Ground-truth label when the batch is a labelled sample
    #[serde(default)]
    pub target: Option<String>,
}

fn nan_as_none<'de, D>(deserializer: D) -> std::result::Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<f64>::deserialize(deserializer)? {
        Some(v) if v.is_infinite() => Err(serde::de::Error::custom(format!(
            "non-finite numeric value {}",
            v
        ))),
        value => Ok(value.filter(|v| !v.is_nan())),
    }
}

/// Check a header row against [`REQUIRED_COLUMNS`], reporting every
/// missing column in one error.
pub fn validate_columns<'a, I>(columns: I) -> Result<()>
where
    I: IntoIterator<Item = &'a str>,
{
    let present: HashSet<&str> = columns.into_iter().collect();
    let missing: Vec<String> = REQUIRED_COLUMNS
        .iter()
        .filter(|c| !present.contains(*c))
        .map(|c| c.to_string())
        .collect();

    if missing.is_empty() {
        Ok(())
    } else {
        Err(ScoringError::MissingColumns(missing))
    }
}

/// Read a CSV batch from disk.
pub fn read_batch<P: AsRef<Path>>(path: P) -> Result<Vec<TransactionRecord>> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|source| ScoringError::Input {
        path: path.to_path_buf(),
        source,
    })?;
    read_batch_from(file)
}

/// Read a CSV batch from any reader. Rows keep their file order; the
/// position of a record in the returned vector is its row identity.
pub fn read_batch_from<R: Read>(reader: R) -> Result<Vec<TransactionRecord>> {
    let mut rdr = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(reader);

    let headers = rdr
        .headers()
        .map_err(|e| ScoringError::MalformedRow {
            row: 0,
            reason: format!("unreadable header: {}", e),
        })?
        .clone();
    validate_columns(headers.iter())?;

    let mut records = Vec::new();
    for (row, result) in rdr.deserialize::<TransactionRecord>().enumerate() {
        let record = result.map_err(|e| ScoringError::MalformedRow {
            row,
            reason: e.to_string(),
        })?;
        records.push(record);
    }

    Ok(records)
}
