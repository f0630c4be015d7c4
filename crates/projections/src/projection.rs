//! Folding an order's event log into [`OrderState`].

use domain::{InventoryStatus, OrderEvent, OrderStatus, PaymentStatus, RollbackStatus, decode_event};
use event_store::{EventEnvelope, Version};

use crate::{OrderState, ProjectionError, Result};

/// Pure projection of an order's history.
///
/// Unknown event types are skipped but still advance the version, so the
/// folded state always carries the expected version for the next append.
pub struct OrderProjection;

impl OrderProjection {
    /// Folds a full history. Returns `None` for an empty history or one
    /// that never created the order.
    pub fn fold(events: &[EventEnvelope]) -> Result<Option<OrderState>> {
        Self::fold_from(None, events)
    }

    /// Continues a fold from a previously computed state.
    ///
    /// `fold_from(fold(prefix), suffix)` equals `fold(prefix ++ suffix)`.
    pub fn fold_from(
        mut state: Option<OrderState>,
        events: &[EventEnvelope],
    ) -> Result<Option<OrderState>> {
        let mut last = state.as_ref().map(|s| s.version).unwrap_or(Version::initial());

        for envelope in events {
            if envelope.version <= last {
                return Err(ProjectionError::MalformedHistory(format!(
                    "version {} follows {} for {}",
                    envelope.version, last, envelope.aggregate_id
                )));
            }
            if let Some(current) = &state
                && current.order_id != envelope.aggregate_id
            {
                return Err(ProjectionError::MalformedHistory(format!(
                    "event for {} in history of {}",
                    envelope.aggregate_id, current.order_id
                )));
            }
            last = envelope.version;

            let Some(event) = decode_event::<OrderEvent>(envelope)? else {
                tracing::debug!(
                    event_type = %envelope.event_type,
                    aggregate_id = %envelope.aggregate_id,
                    "skipping unknown event type"
                );
                if let Some(current) = state.as_mut() {
                    current.version = envelope.version;
                }
                continue;
            };

            match state.as_mut() {
                Some(current) => {
                    Self::apply(current, &event);
                    current.version = envelope.version;
                }
                None => {
                    if let OrderEvent::OrderCreated(data) = &event {
                        state = Some(OrderState::new(
                            data.order_id,
                            data.customer_id,
                            data.created_at,
                            envelope.version,
                        ));
                    }
                }
            }
        }

        Ok(state)
    }

    /// Applies one decoded event to an existing state. Does not touch `version`.
    pub fn apply(state: &mut OrderState, event: &OrderEvent) {
        match event {
            // A second creation event carries nothing new.
            OrderEvent::OrderCreated(_) => {}
            OrderEvent::OrderConfirmed(_) => state.status = OrderStatus::Confirmed,
            OrderEvent::OrderCompleted(_) => state.status = OrderStatus::Completed,
            OrderEvent::OrderCancelled(_) => state.status = OrderStatus::Cancelled,
            OrderEvent::OrderCompensationStarted(_) => {
                state.status = OrderStatus::CompensationPending
            }
            OrderEvent::OrderCompensationCompleted(_) => state.status = OrderStatus::Compensated,
            OrderEvent::OrderInventoryReservationCompleted(_) => {
                state.set_inventory(InventoryStatus::Reserved, None)
            }
            OrderEvent::OrderInventoryReservationFailed(data) => {
                state.set_inventory(InventoryStatus::Unavailable, Some(data.reason))
            }
            OrderEvent::OrderPaymentDeductionCompleted(_) => {
                state.set_payment(PaymentStatus::Approved, None)
            }
            OrderEvent::OrderPaymentVerificationFailed(data) => {
                state.set_payment(PaymentStatus::Rejected, Some(data.reason))
            }
            OrderEvent::OrderPaymentRollbackRequested(_) => {
                state.payment_rollback = RollbackStatus::Requested
            }
            OrderEvent::OrderInventoryRollbackRequested(_) => {
                state.inventory_rollback = RollbackStatus::Requested
            }
            OrderEvent::OrderPaymentRollbackCompleted(_) => {
                state.payment_rollback = RollbackStatus::Completed
            }
            OrderEvent::OrderInventoryRollbackCompleted(_) => {
                state.inventory_rollback = RollbackStatus::Completed
            }
        }
    }
}
