//! Collaborator notification intake.
//!
//! Inventory and payment services report outcomes here; each notification
//! is handed to the process manager as one step of the order's saga.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use saga::{IncomingIntegrationEvent, TransactionManager};
use serde::Serialize;

use crate::AppState;
use crate::error::ApiError;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationResponse {
    pub order_id: String,
    pub status: String,
    pub timed_out: bool,
}

/// POST /notifications
#[tracing::instrument(skip(state, notification), fields(event_type = %notification.event_type))]
pub async fn receive<T: TransactionManager + 'static>(
    State(state): State<Arc<AppState<T>>>,
    Json(notification): Json<IncomingIntegrationEvent>,
) -> Result<Json<NotificationResponse>, ApiError> {
    let outcome = state.manager.handle(&notification).await?;

    Ok(Json(NotificationResponse {
        order_id: outcome.order_id.to_string(),
        status: outcome.status.as_str().to_string(),
        timed_out: outcome.timed_out,
    }))
}
