//! Order domain events.
//!
//! Every event is serialized as `{"type": "ORDER_…", "data": {…}}`. The
//! `type` tag doubles as the event log's `event_type` column.

use chrono::{DateTime, Utc};
use common::AggregateId;
use serde::{Deserialize, Serialize};

use crate::aggregate::DomainEvent;

use super::{CancellationReason, CustomerId, Money, OrderItem, OrderStatus};

/// Facts recorded about an order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderEvent {
    OrderCreated(OrderCreatedData),
    OrderConfirmed(OrderConfirmedData),
    OrderCompleted(StepCompletedData),
    OrderCancelled(OrderCancelledData),
    OrderInventoryReservationCompleted(StepCompletedData),
    OrderInventoryReservationFailed(StepFailedData),
    OrderPaymentDeductionCompleted(StepCompletedData),
    OrderPaymentVerificationFailed(StepFailedData),
    OrderCompensationStarted(CompensationStartedData),
    OrderPaymentRollbackRequested(PaymentRollbackRequestedData),
    OrderInventoryRollbackRequested(InventoryRollbackRequestedData),
    OrderPaymentRollbackCompleted(StepCompletedData),
    OrderInventoryRollbackCompleted(StepCompletedData),
    OrderCompensationCompleted(StepCompletedData),
}

impl OrderEvent {
    /// Wire names of every variant, in declaration order.
    pub const EVENT_TYPES: [&'static str; 14] = [
        "ORDER_CREATED",
        "ORDER_CONFIRMED",
        "ORDER_COMPLETED",
        "ORDER_CANCELLED",
        "ORDER_INVENTORY_RESERVATION_COMPLETED",
        "ORDER_INVENTORY_RESERVATION_FAILED",
        "ORDER_PAYMENT_DEDUCTION_COMPLETED",
        "ORDER_PAYMENT_VERIFICATION_FAILED",
        "ORDER_COMPENSATION_STARTED",
        "ORDER_PAYMENT_ROLLBACK_REQUESTED",
        "ORDER_INVENTORY_ROLLBACK_REQUESTED",
        "ORDER_PAYMENT_ROLLBACK_COMPLETED",
        "ORDER_INVENTORY_ROLLBACK_COMPLETED",
        "ORDER_COMPENSATION_COMPLETED",
    ];

    pub fn order_id(&self) -> AggregateId {
        match self {
            OrderEvent::OrderCreated(data) => data.order_id,
            OrderEvent::OrderConfirmed(data) => data.order_id,
            OrderEvent::OrderCancelled(data) => data.order_id,
            OrderEvent::OrderInventoryReservationFailed(data)
            | OrderEvent::OrderPaymentVerificationFailed(data) => data.order_id,
            OrderEvent::OrderCompensationStarted(data) => data.order_id,
            OrderEvent::OrderPaymentRollbackRequested(data) => data.order_id,
            OrderEvent::OrderInventoryRollbackRequested(data) => data.order_id,
            OrderEvent::OrderCompleted(data)
            | OrderEvent::OrderInventoryReservationCompleted(data)
            | OrderEvent::OrderPaymentDeductionCompleted(data)
            | OrderEvent::OrderPaymentRollbackCompleted(data)
            | OrderEvent::OrderInventoryRollbackCompleted(data)
            | OrderEvent::OrderCompensationCompleted(data) => data.order_id,
        }
    }

    /// The `data` part of the serialized event.
    pub fn data_json(&self) -> Result<serde_json::Value, serde_json::Error> {
        let mut value = serde_json::to_value(self)?;
        Ok(value
            .get_mut("data")
            .map(serde_json::Value::take)
            .unwrap_or_default())
    }
}

impl DomainEvent for OrderEvent {
    fn event_type(&self) -> &'static str {
        match self {
            OrderEvent::OrderCreated(_) => "ORDER_CREATED",
            OrderEvent::OrderConfirmed(_) => "ORDER_CONFIRMED",
            OrderEvent::OrderCompleted(_) => "ORDER_COMPLETED",
            OrderEvent::OrderCancelled(_) => "ORDER_CANCELLED",
            OrderEvent::OrderInventoryReservationCompleted(_) => {
                "ORDER_INVENTORY_RESERVATION_COMPLETED"
            }
            OrderEvent::OrderInventoryReservationFailed(_) => "ORDER_INVENTORY_RESERVATION_FAILED",
            OrderEvent::OrderPaymentDeductionCompleted(_) => "ORDER_PAYMENT_DEDUCTION_COMPLETED",
            OrderEvent::OrderPaymentVerificationFailed(_) => "ORDER_PAYMENT_VERIFICATION_FAILED",
            OrderEvent::OrderCompensationStarted(_) => "ORDER_COMPENSATION_STARTED",
            OrderEvent::OrderPaymentRollbackRequested(_) => "ORDER_PAYMENT_ROLLBACK_REQUESTED",
            OrderEvent::OrderInventoryRollbackRequested(_) => "ORDER_INVENTORY_ROLLBACK_REQUESTED",
            OrderEvent::OrderPaymentRollbackCompleted(_) => "ORDER_PAYMENT_ROLLBACK_COMPLETED",
            OrderEvent::OrderInventoryRollbackCompleted(_) => "ORDER_INVENTORY_ROLLBACK_COMPLETED",
            OrderEvent::OrderCompensationCompleted(_) => "ORDER_COMPENSATION_COMPLETED",
        }
    }

    fn is_known_type(event_type: &str) -> bool {
        Self::EVENT_TYPES.contains(&event_type)
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            OrderEvent::OrderCreated(data) => data.created_at,
            OrderEvent::OrderConfirmed(data) => data.confirmed_at,
            OrderEvent::OrderCancelled(data) => data.cancelled_at,
            OrderEvent::OrderInventoryReservationFailed(data)
            | OrderEvent::OrderPaymentVerificationFailed(data) => data.failed_at,
            OrderEvent::OrderCompensationStarted(data) => data.started_at,
            OrderEvent::OrderPaymentRollbackRequested(data) => data.requested_at,
            OrderEvent::OrderInventoryRollbackRequested(data) => data.requested_at,
            OrderEvent::OrderCompleted(data)
            | OrderEvent::OrderInventoryReservationCompleted(data)
            | OrderEvent::OrderPaymentDeductionCompleted(data)
            | OrderEvent::OrderPaymentRollbackCompleted(data)
            | OrderEvent::OrderInventoryRollbackCompleted(data)
            | OrderEvent::OrderCompensationCompleted(data) => data.completed_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderCreatedData {
    pub order_id: AggregateId,
    pub customer_id: CustomerId,
    pub items: Vec<OrderItem>,
    pub total_amount: Money,
    pub currency: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderConfirmedData {
    pub order_id: AggregateId,
    pub customer_id: CustomerId,
    pub total_amount: Money,
    pub confirmed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderCancelledData {
    pub order_id: AggregateId,
    pub cancelled_by: String,
    pub reasons: Vec<CancellationReason>,
    pub previous_status: OrderStatus,
    pub requires_refund: bool,
    pub requires_inventory_rollback: bool,
    pub cancelled_at: DateTime<Utc>,
}

/// Payload shared by events that only record that a step finished.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepCompletedData {
    pub order_id: AggregateId,
    pub completed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepFailedData {
    pub order_id: AggregateId,
    pub reason: CancellationReason,
    pub failed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompensationStartedData {
    pub order_id: AggregateId,
    pub requires_refund: bool,
    pub requires_inventory_rollback: bool,
    pub started_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRollbackRequestedData {
    pub order_id: AggregateId,
    pub customer_id: CustomerId,
    pub amount: Money,
    pub currency: String,
    pub reasons: Vec<CancellationReason>,
    pub requested_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InventoryRollbackRequestedData {
    pub order_id: AggregateId,
    pub items: Vec<OrderItem>,
    pub reasons: Vec<CancellationReason>,
    pub requested_at: DateTime<Utc>,
}

impl StepCompletedData {
    pub fn now(order_id: AggregateId) -> Self {
        Self {
            order_id,
            completed_at: Utc::now(),
        }
    }
}

impl StepFailedData {
    pub fn now(order_id: AggregateId, reason: CancellationReason) -> Self {
        Self {
            order_id,
            reason,
            failed_at: Utc::now(),
        }
    }
}
