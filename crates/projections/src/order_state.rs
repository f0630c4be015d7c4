//! Current decision-relevant state of one order.

use chrono::{DateTime, Duration, Utc};
use common::AggregateId;
use domain::{
    CancellationReason, CustomerId, InventoryStatus, OrderStatus, PaymentStatus, RollbackStatus,
};
use event_store::Version;
use serde::{Deserialize, Serialize};

/// What the saga needs to know about an order to decide its next step.
///
/// Invariant: `has_pending == payment.is_pending() || inventory.is_pending()`.
/// Every mutator below keeps it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderState {
    pub order_id: AggregateId,
    pub customer_id: CustomerId,
    pub status: OrderStatus,
    pub payment: PaymentStatus,
    pub inventory: InventoryStatus,
    pub payment_reason: Option<CancellationReason>,
    pub inventory_reason: Option<CancellationReason>,
    pub payment_rollback: RollbackStatus,
    pub inventory_rollback: RollbackStatus,
    pub created_at: DateTime<Utc>,
    /// Version of the last folded event; the expected version of the next append.
    pub version: Version,
    pub has_pending: bool,
}

impl OrderState {
    /// State right after `ORDER_CREATED`.
    pub fn new(
        order_id: AggregateId,
        customer_id: CustomerId,
        created_at: DateTime<Utc>,
        version: Version,
    ) -> Self {
        Self {
            order_id,
            customer_id,
            status: OrderStatus::Pending,
            payment: PaymentStatus::Pending,
            inventory: InventoryStatus::Pending,
            payment_reason: None,
            inventory_reason: None,
            payment_rollback: RollbackStatus::NotRequired,
            inventory_rollback: RollbackStatus::NotRequired,
            created_at,
            version,
            has_pending: true,
        }
    }

    pub fn set_payment(&mut self, payment: PaymentStatus, reason: Option<CancellationReason>) {
        self.payment = payment;
        self.payment_reason = reason;
        self.refresh_pending();
    }

    pub fn set_inventory(&mut self, inventory: InventoryStatus, reason: Option<CancellationReason>) {
        self.inventory = inventory;
        self.inventory_reason = reason;
        self.refresh_pending();
    }

    fn refresh_pending(&mut self) {
        self.has_pending = self.payment.is_pending() || self.inventory.is_pending();
    }

    /// True once a side has stayed pending for at least `timeout` since creation.
    pub fn is_expired(&self, now: DateTime<Utc>, timeout: Duration) -> bool {
        self.has_pending && now - self.created_at >= timeout
    }

    pub fn both_succeeded(&self) -> bool {
        self.payment == PaymentStatus::Approved && self.inventory == InventoryStatus::Reserved
    }

    pub fn any_failed(&self) -> bool {
        self.payment == PaymentStatus::Rejected || self.inventory == InventoryStatus::Unavailable
    }

    /// A rollback was requested and has not been reported complete.
    pub fn compensation_outstanding(&self) -> bool {
        self.payment_rollback.is_outstanding() || self.inventory_rollback.is_outstanding()
    }

    /// Failure reasons recorded on either side, payment first.
    pub fn failure_reasons(&self) -> Vec<CancellationReason> {
        let mut reasons = Vec::with_capacity(2);
        for reason in [self.payment_reason, self.inventory_reason]
            .into_iter()
            .flatten()
        {
            if !reasons.contains(&reason) {
                reasons.push(reason);
            }
        }
        reasons
    }
}
