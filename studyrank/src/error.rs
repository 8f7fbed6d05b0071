// studyrank/src/error.rs
//
// Error taxonomy. Validation rejections and malformed timestamps are not
// errors (they are structured results / silent drops); what lands here is
// dependency failure, write conflicts and bad configuration.

use thiserror::Error;

use crate::events::Period;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("store unavailable: {0}")] Unavailable(String),
    #[error("io: {0}")] Io(#[from] std::io::Error),
    #[error("serialization: {0}")] Serialization(#[from] serde_json::Error),
    #[error("etag mismatch on {key}: expected {expected:?}, found {found:?}")]
    Conflict { key: String, expected: Option<String>, found: Option<String> },
}

#[derive(Error, Debug)]
pub enum AggregationError {
    #[error("user directory unavailable: {0}")] DirectoryUnavailable(#[source] StoreError),
    #[error("no learner could be scored for period {period} ({failures} failures)")]
    PopulationFailed { period: Period, failures: usize },
    #[error("snapshot write failed for {key}: {source}")]
    WriteFailed { key: String, #[source] source: StoreError },
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("score weights must be finite and non-negative")] NegativeWeight,
    #[error("score weights must sum to 1.0, got {0:.4}")] WeightSum(f64),
    #[error("{0} must be greater than zero")] Zero(&'static str),
    #[error("{field} out of range: {value}")] OutOfRange { field: &'static str, value: f64 },
    #[error("keyword automaton: {0}")] Keywords(String),
}
