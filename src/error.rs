//! Error types for the OpenStack cluster operator

use thiserror::Error;

/// Result type alias using the operator's Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Operator error types
#[derive(Error, Debug)]
pub enum Error {
    /// Invalid user-authored spec (unknown group name, unwired optional group, bad selector)
    #[error("Validation error: {0}")]
    Validation(String),

    /// Wrong concrete version pair handed to the converter
    #[error("Conversion contract violated: {0}")]
    ConversionContract(String),

    /// A call against the remote networking API failed
    #[error("Remote operation '{operation}' failed: {message}")]
    RemoteOperation { operation: String, message: String },

    /// Remote object does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// CRD manifest generation error
    #[error("CRD generation error: {0}")]
    Crd(String),

    /// Metrics encoding error
    #[error("Metrics error: {0}")]
    Metrics(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Create a validation error
    pub fn validation(msg: impl Into<String>) -> Self {
        Error::Validation(msg.into())
    }

    /// Create a conversion contract error
    pub fn conversion_contract(msg: impl Into<String>) -> Self {
        Error::ConversionContract(msg.into())
    }

    /// Wrap a failed remote call, keeping the cause's message
    pub fn remote_operation(operation: impl Into<String>, cause: impl std::fmt::Display) -> Self {
        Error::RemoteOperation {
            operation: operation.into(),
            message: cause.to_string(),
        }
    }

    /// Whether the error is a user-facing validation failure
    pub fn is_validation(&self) -> bool {
        matches!(self, Error::Validation(_))
    }
}

/// Failure of a pass that may already have changed remote state
///
/// `status` describes what exists after the operations that succeeded, so the
/// caller can persist it and the next pass starts from the truth.
#[derive(Debug)]
pub struct PartialStatus<T> {
    pub status: T,
    pub error: Error,
}

impl<T> PartialStatus<T> {
    pub fn new(status: T, error: Error) -> Self {
        Self { status, error }
    }
}

impl<T> std::fmt::Display for PartialStatus<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.error.fmt(f)
    }
}

impl<T: std::fmt::Debug> std::error::Error for PartialStatus<T> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}

/// Result of a pass that reports partial progress on failure
pub type PartialResult<T> = std::result::Result<T, PartialStatus<T>>;
