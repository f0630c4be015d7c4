//! Saga error types.

use common::AggregateId;
use domain::{DomainError, OrderError};
use event_store::EventStoreError;
use projections::ProjectionError;
use thiserror::Error;

/// Failure categories used by callers to decide between retrying,
/// dead-lettering and reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Programmer or data error. Never retried.
    InvariantViolation,
    /// The order or its history does not exist. Permanent for the message.
    NotFound,
    /// Optimistic version mismatch. Reload and retry the whole handler.
    ConcurrencyConflict,
    /// Connectivity, aborted transactions, broker failures.
    Infrastructure,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::InvariantViolation => "invariant_violation",
            ErrorKind::NotFound => "not_found",
            ErrorKind::ConcurrencyConflict => "concurrency_conflict",
            ErrorKind::Infrastructure => "infrastructure",
        }
    }
}

/// Errors that can occur while handling notifications or use cases.
#[derive(Debug, Error)]
pub enum SagaError {
    #[error("Order not found: {0}")]
    OrderNotFound(AggregateId),

    /// The order exists but its event log is empty.
    #[error("No state found for order {0}")]
    NoStateFound(AggregateId),

    #[error("Unsupported event type: {0}")]
    UnsupportedEvent(String),

    /// The notification payload is missing or has a malformed field.
    #[error("Invalid notification: {0}")]
    InvalidNotification(String),

    #[error("Order error: {0}")]
    Order(#[from] OrderError),

    #[error("Domain error: {0}")]
    Domain(#[from] DomainError),

    #[error("Event store error: {0}")]
    EventStore(#[from] EventStoreError),

    #[error("Projection error: {0}")]
    Projection(#[from] ProjectionError),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Publish failed: {0}")]
    Publish(String),
}

impl SagaError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SagaError::OrderNotFound(_) | SagaError::NoStateFound(_) => ErrorKind::NotFound,
            SagaError::UnsupportedEvent(_)
            | SagaError::InvalidNotification(_)
            | SagaError::Order(_)
            | SagaError::Projection(_)
            | SagaError::Serialization(_) => ErrorKind::InvariantViolation,
            SagaError::Domain(DomainError::EventStore(err)) | SagaError::EventStore(err) => {
                store_error_kind(err)
            }
            SagaError::Domain(_) => ErrorKind::InvariantViolation,
            SagaError::Database(_) | SagaError::Publish(_) => ErrorKind::Infrastructure,
        }
    }

    /// Only conflicts and infrastructure failures are worth retrying.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::ConcurrencyConflict | ErrorKind::Infrastructure
        )
    }
}

fn store_error_kind(err: &EventStoreError) -> ErrorKind {
    if err.is_concurrency_conflict() {
        ErrorKind::ConcurrencyConflict
    } else if err.is_infrastructure() {
        ErrorKind::Infrastructure
    } else {
        ErrorKind::InvariantViolation
    }
}

/// Convenience type alias for saga results.
pub type Result<T> = std::result::Result<T, SagaError>;
