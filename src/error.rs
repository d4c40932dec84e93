//! Error types for the metrics core

use thiserror::Error;

/// Errors that can occur while computing or aggregating metrics
#[derive(Debug, Error)]
pub enum MetricsError {
    #[error("Failed to parse event batch: {0}")]
    ParseError(String),

    #[error("Invalid JSON: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Unknown grouping column: {0}")]
    UnknownColumn(String),

    #[error("Unsupported aggregation operator: {0}")]
    UnsupportedOperator(String),

    #[error("Unknown metric: {0}")]
    UnknownMetric(String),

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}
