//! Error types for the newsbar dataset pipeline.

use thiserror::Error;

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the newsbar pipeline.
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error (missing key, invalid value).
    #[error("Configuration error: {0}")]
    Config(String),

    /// Schema error (required column absent or of the wrong kind).
    #[error("Schema error: {0}")]
    Schema(String),

    /// Cardinality error (e.g. zero or several tickers where one is expected).
    #[error("Cardinality error: {0}")]
    Cardinality(String),

    /// Data error (malformed values).
    #[error("Data error: {0}")]
    Data(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// CSV read/write error.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Dataframe engine error.
    #[error("Polars error: {0}")]
    Polars(#[from] polars::prelude::PolarsError),

    /// Generic error with message.
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Error::Config(msg.into())
    }

    /// Create a schema error.
    pub fn schema(msg: impl Into<String>) -> Self {
        Error::Schema(msg.into())
    }

    /// Create a cardinality error.
    pub fn cardinality(msg: impl Into<String>) -> Self {
        Error::Cardinality(msg.into())
    }

    /// Create a data error.
    pub fn data(msg: impl Into<String>) -> Self {
        Error::Data(msg.into())
    }

    /// Schema error for a column that is not present.
    pub fn missing_column(name: &str) -> Self {
        Error::Schema(format!("missing required column '{name}'"))
    }
}
