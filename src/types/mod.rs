//! Type definitions for the scoring pipeline

pub mod decision;
pub mod transaction;

pub use decision::{Decision, ImportanceRanking, ScoreResult, Submission};
pub use transaction::{read_batch, TransactionRecord, REQUIRED_COLUMNS};
