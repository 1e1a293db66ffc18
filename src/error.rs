//! Error types for the extraction engine.
//!
//! Loader failures (missing or malformed DIR archives, bad molds) are typed;
//! predictor-internal failures are caught per column by the prophet and never
//! escape a prediction run.

/// Result type alias for engine operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error types that can occur while loading documents or running predictions.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Referenced DIR archive does not exist
    #[error("DIR not found: {0}")]
    DirNotFound(String),

    /// DIR archive exists but cannot be decoded
    #[error("Invalid DIR: {0}")]
    InvalidDir(String),

    /// Mold (schema definition) cannot be parsed
    #[error("Invalid schema: {0}")]
    InvalidSchema(String),

    /// Mold and dataset disagree on a column
    #[error("Schema mismatch for column '{column}': {reason}")]
    SchemaMismatch {
        /// Column (field) name
        column: String,
        /// Reason for the mismatch
        reason: String,
    },

    /// A predictor failed internally; caught at the column boundary
    #[error("Predictor '{model}' failed: {reason}")]
    Predictor {
        /// Model name from the registry
        model: String,
        /// Failure description
        reason: String,
    },

    /// Remote extraction service unavailable or timed out
    #[error("Remote call failed: {0}")]
    Remote(String),

    /// Invalid pattern in predictor configuration
    #[error("Invalid pattern '{pattern}': {source}")]
    Pattern {
        /// The offending pattern text
        pattern: String,
        /// Underlying regex error
        source: regex::Error,
    },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON decoding error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Zip container error
    #[error("Archive error: {0}")]
    Zip(#[from] zip::result::ZipError),
}
