//! Error types for datadiff operations

use thiserror::Error;

pub type Result<T> = std::result::Result<T, DatadiffError>;

#[derive(Error, Debug)]
pub enum DatadiffError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("DuckDB error: {0}")]
    DuckDb(#[from] duckdb::Error),

    #[error("Invalid input: {message}")]
    InvalidInput { message: String },

    #[error("Invalid bucket: {message}")]
    InvalidBucket { message: String },

    #[error("Invalid hash range: {message}")]
    InvalidHashRange { message: String },

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Data processing error: {message}")]
    DataProcessing { message: String },

    #[error("Comparison aborted")]
    Aborted,

    #[error("Generic error: {0}")]
    Generic(#[from] anyhow::Error),
}

impl DatadiffError {
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: msg.into(),
        }
    }

    pub fn invalid_bucket(msg: impl Into<String>) -> Self {
        Self::InvalidBucket {
            message: msg.into(),
        }
    }

    pub fn invalid_hash_range(msg: impl Into<String>) -> Self {
        Self::InvalidHashRange {
            message: msg.into(),
        }
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    pub fn data_processing(msg: impl Into<String>) -> Self {
        Self::DataProcessing {
            message: msg.into(),
        }
    }

    /// True when the run was stopped through its cancellation token rather than failing
    pub fn is_aborted(&self) -> bool {
        matches!(self, Self::Aborted)
    }
}
