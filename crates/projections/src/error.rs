//! Projection error types.

use thiserror::Error;

/// Errors raised while folding an event history.
#[derive(Debug, Error)]
pub enum ProjectionError {
    /// A stored event of a known type could not be decoded.
    #[error("Event decoding error: {0}")]
    Decoding(#[from] domain::DomainError),

    /// The history is not ordered by version or mixes aggregates.
    #[error("Malformed history: {0}")]
    MalformedHistory(String),
}

/// Result type for projection operations.
pub type Result<T> = std::result::Result<T, ProjectionError>;
