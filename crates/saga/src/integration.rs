//! Wire schema shared with the message bus, and the mapping from domain
//! events to outbound messages.

use chrono::{DateTime, Utc};
use common::AggregateId;
use domain::{DomainEvent, OrderEvent};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Result, SagaError};

pub const ORDER_EVENTS_EXCHANGE: &str = "order_events";
pub const ORDER_SERVICE_SOURCE: &str = "order-service";
pub const INTEGRATION_EVENT_VERSION: &str = "1.0";

/// Message published to the bus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutgoingIntegrationEvent {
    pub event_id: Uuid,
    pub event_type: String,
    pub payload: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
    pub version: String,
    pub occurred_at: DateTime<Utc>,
    pub exchange: String,
    pub routing_key: String,
    pub source: String,
}

/// Notification delivered by a collaborator (inventory, payment).
///
/// Everything except `eventType` and `payload` is optional on the way in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IncomingIntegrationEvent {
    #[serde(default)]
    pub event_id: Option<String>,
    pub event_type: String,
    pub payload: serde_json::Value,
    #[serde(default)]
    pub correlation_id: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub occurred_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub exchange: Option<String>,
    #[serde(default)]
    pub routing_key: Option<String>,
    #[serde(default)]
    pub source: Option<String>,
}

impl IncomingIntegrationEvent {
    pub fn new(event_type: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            event_id: Some(Uuid::now_v7().to_string()),
            event_type: event_type.into(),
            payload,
            correlation_id: None,
            version: Some(INTEGRATION_EVENT_VERSION.to_string()),
            occurred_at: Some(Utc::now()),
            exchange: None,
            routing_key: None,
            source: None,
        }
    }

    pub fn with_correlation_id(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = Some(correlation_id.into());
        self
    }

    /// The `payload.orderId` field.
    pub fn order_id(&self) -> Result<AggregateId> {
        let raw = self
            .payload
            .get("orderId")
            .and_then(serde_json::Value::as_str)
            .ok_or_else(|| SagaError::InvalidNotification("payload.orderId is missing".into()))?;
        raw.parse()
            .map_err(|_| SagaError::InvalidNotification(format!("invalid orderId '{raw}'")))
    }

    /// Failure reason reported by the collaborator: `payload.reason`, then `payload.error`.
    pub fn reason(&self) -> Option<&str> {
        ["reason", "error"]
            .into_iter()
            .find_map(|key| self.payload.get(key).and_then(serde_json::Value::as_str))
    }
}

/// Collaborator notifications the process manager reacts to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollaboratorEvent {
    InventoryReservationCompleted,
    InventoryReservationFailed,
    PaymentDeductionCompleted,
    PaymentDeductionFailed,
    InventoryRollbackCompleted,
    PaymentRollbackCompleted,
}

impl CollaboratorEvent {
    pub const ALL: [CollaboratorEvent; 6] = [
        CollaboratorEvent::InventoryReservationCompleted,
        CollaboratorEvent::InventoryReservationFailed,
        CollaboratorEvent::PaymentDeductionCompleted,
        CollaboratorEvent::PaymentDeductionFailed,
        CollaboratorEvent::InventoryRollbackCompleted,
        CollaboratorEvent::PaymentRollbackCompleted,
    ];

    pub fn from_event_type(event_type: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == event_type)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CollaboratorEvent::InventoryReservationCompleted => "INVENTORY_RESERVATION_COMPLETED",
            CollaboratorEvent::InventoryReservationFailed => "INVENTORY_RESERVATION_FAILED",
            CollaboratorEvent::PaymentDeductionCompleted => "PAYMENT_DEDUCTION_COMPLETED",
            CollaboratorEvent::PaymentDeductionFailed => "PAYMENT_DEDUCTION_FAILED",
            CollaboratorEvent::InventoryRollbackCompleted => "INVENTORY_ROLLBACK_COMPLETED",
            CollaboratorEvent::PaymentRollbackCompleted => "PAYMENT_ROLLBACK_COMPLETED",
        }
    }
}

/// Translates domain events into outbound messages.
///
/// `Ok(None)` means the event is internal and is not published.
pub trait IntegrationEventMapper: Send + Sync {
    fn map(
        &self,
        event: &OrderEvent,
        correlation_id: Option<&str>,
    ) -> Result<Option<OutgoingIntegrationEvent>>;
}

/// Mapper for the `order_events` exchange.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultIntegrationEventMapper;

impl DefaultIntegrationEventMapper {
    pub fn routing_key(event: &OrderEvent) -> Option<&'static str> {
        match event {
            OrderEvent::OrderCreated(_) => Some("status.created"),
            OrderEvent::OrderConfirmed(_) => Some("status.confirmed"),
            OrderEvent::OrderCompleted(_) => Some("status.completed"),
            OrderEvent::OrderCancelled(_) => Some("status.cancelled"),
            OrderEvent::OrderCompensationStarted(_) => Some("status.compensation.started"),
            OrderEvent::OrderPaymentRollbackRequested(_) => Some("payment.rollback"),
            OrderEvent::OrderInventoryRollbackRequested(_) => Some("inventory.rollback"),
            OrderEvent::OrderPaymentVerificationFailed(_) => {
                Some("payment.verification.order.failed")
            }
            OrderEvent::OrderInventoryReservationFailed(_) => {
                Some("inventory.reservation.order.failed")
            }
            OrderEvent::OrderPaymentDeductionCompleted(_) => Some("payment.deduction.completed"),
            OrderEvent::OrderInventoryReservationCompleted(_) => {
                Some("inventory.reservation.completed")
            }
            OrderEvent::OrderPaymentRollbackCompleted(_)
            | OrderEvent::OrderInventoryRollbackCompleted(_)
            | OrderEvent::OrderCompensationCompleted(_) => None,
        }
    }
}

impl IntegrationEventMapper for DefaultIntegrationEventMapper {
    fn map(
        &self,
        event: &OrderEvent,
        correlation_id: Option<&str>,
    ) -> Result<Option<OutgoingIntegrationEvent>> {
        let Some(routing_key) = Self::routing_key(event) else {
            return Ok(None);
        };

        Ok(Some(OutgoingIntegrationEvent {
            event_id: Uuid::now_v7(),
            event_type: event.event_type().to_string(),
            payload: event.data_json()?,
            correlation_id: Some(
                correlation_id
                    .map(str::to_string)
                    .unwrap_or_else(|| event.order_id().to_string()),
            ),
            version: INTEGRATION_EVENT_VERSION.to_string(),
            occurred_at: event.occurred_at(),
            exchange: ORDER_EVENTS_EXCHANGE.to_string(),
            routing_key: routing_key.to_string(),
            source: ORDER_SERVICE_SOURCE.to_string(),
        }))
    }
}
