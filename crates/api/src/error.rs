//! API error types with HTTP response mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use domain::{DomainError, OrderError};
use saga::{ErrorKind, SagaError};

/// API-level error type that maps to HTTP responses.
#[derive(Debug)]
pub enum ApiError {
    /// Malformed request from the client.
    BadRequest(String),
    /// Failure reported by the order core.
    Saga(SagaError),
}

impl ApiError {
    fn status_and_message(&self) -> (StatusCode, String) {
        match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            ApiError::Saga(err) => saga_error_to_response(err),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = self.status_and_message();
        if status.is_server_error()
            && let ApiError::Saga(err) = &self
        {
            tracing::error!(error = %err, kind = err.kind().as_str(), "request failed");
        }

        let body = serde_json::json!({ "error": message });
        (status, axum::Json(body)).into_response()
    }
}

fn saga_error_to_response(err: &SagaError) -> (StatusCode, String) {
    if let Some(order_err) = order_error(err)
        && !order_err.is_invariant_violation()
    {
        return (StatusCode::BAD_REQUEST, err.to_string());
    }

    match err {
        SagaError::InvalidNotification(_) => (StatusCode::BAD_REQUEST, err.to_string()),
        SagaError::UnsupportedEvent(_) => (StatusCode::UNPROCESSABLE_ENTITY, err.to_string()),
        _ => match err.kind() {
            ErrorKind::NotFound => (StatusCode::NOT_FOUND, err.to_string()),
            ErrorKind::InvariantViolation | ErrorKind::ConcurrencyConflict => {
                (StatusCode::CONFLICT, err.to_string())
            }
            ErrorKind::Infrastructure => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal server error".to_string(),
            ),
        },
    }
}

fn order_error(err: &SagaError) -> Option<&OrderError> {
    match err {
        SagaError::Order(order_err) | SagaError::Domain(DomainError::Order(order_err)) => {
            Some(order_err)
        }
        _ => None,
    }
}

impl From<SagaError> for ApiError {
    fn from(err: SagaError) -> Self {
        ApiError::Saga(err)
    }
}
