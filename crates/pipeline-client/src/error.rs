//! Error types for the sync client and persistence services

use pipeline_engine::{PipelineError, ValidationError};
use thiserror::Error;

/// Result type alias using ClientError
pub type Result<T> = std::result::Result<T, ClientError>;

/// Top-level client error
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Persistence error: {0}")]
    Persistence(#[from] PersistenceError),

    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),
}

/// Configuration load/save errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse config: {0}")]
    Parse(serde_json::Error),
    #[error("Failed to serialize config: {0}")]
    Serialize(serde_json::Error),
}

/// Failure to open or use the execution channel
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Failed to connect to {endpoint}: {source}")]
    Connect {
        endpoint: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Timed out connecting to {0}")]
    Timeout(String),
}

/// Failure of a remote persistence call
///
/// The local graph store is never modified when one of these is returned.
#[derive(Debug, Error)]
pub enum PersistenceError {
    /// The service answered with a non-success status
    #[error("Remote error {status}: {message}")]
    Remote { status: u16, message: String },

    /// The request never produced a response
    #[error("Request failed: {0}")]
    Request(String),

    #[error("Not found: {0}")]
    NotFound(String),

    /// Id cannot be used as a storage key
    #[error("Invalid id: {0}")]
    InvalidId(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The service returned data that does not validate locally
    #[error("Rejected invalid data: {}", format_validation(.0))]
    Invalid(Vec<ValidationError>),

    #[error(transparent)]
    Pipeline(#[from] PipelineError),
}

impl From<reqwest::Error> for PersistenceError {
    fn from(e: reqwest::Error) -> Self {
        Self::Request(e.to_string())
    }
}

fn format_validation(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}
