//! Order endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use common::AggregateId;
use domain::{CustomerId, Money, OrderItem, OrderSnapshot};
use projections::OrderState;
use saga::TransactionManager;
use serde::{Deserialize, Serialize};

use crate::AppState;
use crate::error::ApiError;

/// Header carrying the caller's correlation id into the outbox.
pub const CORRELATION_ID_HEADER: &str = "x-correlation-id";

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrderRequest {
    pub customer_id: Option<String>,
    pub items: Vec<OrderItemRequest>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderItemRequest {
    pub product_id: String,
    pub quantity: u32,
    /// Minor currency units.
    pub unit_price: i64,
}

impl From<OrderItemRequest> for OrderItem {
    fn from(item: OrderItemRequest) -> Self {
        OrderItem::new(item.product_id, item.quantity, Money::from_cents(item.unit_price))
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EventEnvelopeResponse {
    pub event_id: String,
    pub event_type: String,
    pub aggregate_id: String,
    pub version: i64,
    pub timestamp: String,
    pub payload: serde_json::Value,
}

/// POST /orders: place an order and start the fulfillment saga.
#[tracing::instrument(skip(state, headers, req))]
pub async fn create<T: TransactionManager + 'static>(
    State(state): State<Arc<AppState<T>>>,
    headers: HeaderMap,
    Json(req): Json<CreateOrderRequest>,
) -> Result<(StatusCode, Json<OrderSnapshot>), ApiError> {
    let customer_id = match req.customer_id.as_deref() {
        Some(raw) => CustomerId::from_uuid(parse_uuid(raw, "customerId")?),
        None => CustomerId::new(),
    };
    let items = req.items.into_iter().map(OrderItem::from).collect();
    let correlation_id = headers
        .get(CORRELATION_ID_HEADER)
        .and_then(|value| value.to_str().ok());

    let order = state
        .service
        .create_order(customer_id, items, correlation_id)
        .await?;
    Ok((StatusCode::CREATED, Json(order)))
}

/// GET /orders/{id}: stored order snapshot.
#[tracing::instrument(skip(state))]
pub async fn get<T: TransactionManager + 'static>(
    State(state): State<Arc<AppState<T>>>,
    Path(id): Path<String>,
) -> Result<Json<OrderSnapshot>, ApiError> {
    let order_id = parse_aggregate_id(&id)?;
    Ok(Json(state.service.get_order(order_id).await?))
}

/// GET /orders/{id}/state: decision state folded from the event log.
#[tracing::instrument(skip(state))]
pub async fn order_state<T: TransactionManager + 'static>(
    State(state): State<Arc<AppState<T>>>,
    Path(id): Path<String>,
) -> Result<Json<OrderState>, ApiError> {
    let order_id = parse_aggregate_id(&id)?;
    Ok(Json(state.service.get_order_state(order_id).await?))
}

/// POST /orders/{id}/complete: close a confirmed order.
#[tracing::instrument(skip(state))]
pub async fn complete<T: TransactionManager + 'static>(
    State(state): State<Arc<AppState<T>>>,
    Path(id): Path<String>,
) -> Result<Json<OrderSnapshot>, ApiError> {
    let order_id = parse_aggregate_id(&id)?;
    Ok(Json(state.service.complete_order(order_id).await?))
}

/// GET /orders/{id}/events: the order's full event history.
#[tracing::instrument(skip(state))]
pub async fn events<T: TransactionManager + 'static>(
    State(state): State<Arc<AppState<T>>>,
    Path(id): Path<String>,
) -> Result<Json<Vec<EventEnvelopeResponse>>, ApiError> {
    let order_id = parse_aggregate_id(&id)?;

    let responses = state
        .service
        .get_order_events(order_id)
        .await?
        .into_iter()
        .map(|e| EventEnvelopeResponse {
            event_id: e.event_id.to_string(),
            event_type: e.event_type,
            aggregate_id: e.aggregate_id.to_string(),
            version: e.version.as_i64(),
            timestamp: e.timestamp.to_rfc3339(),
            payload: e.payload,
        })
        .collect();

    Ok(Json(responses))
}

fn parse_uuid(raw: &str, field: &str) -> Result<uuid::Uuid, ApiError> {
    uuid::Uuid::parse_str(raw).map_err(|e| ApiError::BadRequest(format!("Invalid {field}: {e}")))
}

pub(crate) fn parse_aggregate_id(id: &str) -> Result<AggregateId, ApiError> {
    parse_uuid(id, "order id").map(AggregateId::from_uuid)
}
