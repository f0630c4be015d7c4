//! Order aggregate implementation.

use chrono::{DateTime, Utc};
use common::AggregateId;
use serde::{Deserialize, Serialize};

use crate::aggregate::Aggregate;

use super::{
    CANCELLED_BY_SYSTEM, CancelContext, CancellationReason, CompensationPlan, CustomerId,
    DEFAULT_CURRENCY, InventoryStatus, Money, OrderError, OrderEvent, OrderItem, OrderStatus,
    PaymentStatus, Transition,
    events::{
        CompensationStartedData, InventoryRollbackRequestedData, OrderCancelledData,
        OrderConfirmedData, OrderCreatedData, PaymentRollbackRequestedData, StepCompletedData,
        StepFailedData,
    },
};

/// Order aggregate root.
///
/// State only changes through the methods below. Each of them appends the
/// events it emits to an internal buffer which the persistence step reads
/// through [`Aggregate::pending_events`] and drains once the events are
/// stored.
#[derive(Debug, Clone)]
pub struct Order {
    id: AggregateId,
    customer_id: CustomerId,
    items: Vec<OrderItem>,
    status: OrderStatus,
    currency: String,
    /// Insertion-ordered set.
    cancellation_reasons: Vec<CancellationReason>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    /// Set when the stored snapshot is stale.
    was_updated: bool,
    pending_events: Vec<OrderEvent>,
}

/// Stored form of an order, as kept by the order repository.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderSnapshot {
    pub id: AggregateId,
    pub customer_id: CustomerId,
    pub items: Vec<OrderItem>,
    pub status: OrderStatus,
    pub currency: String,
    pub cancellation_reasons: Vec<CancellationReason>,
    pub total_amount: Money,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Aggregate for Order {
    type Event = OrderEvent;

    fn aggregate_type() -> &'static str {
        "Order"
    }

    fn id(&self) -> AggregateId {
        self.id
    }

    fn pending_events(&self) -> &[OrderEvent] {
        &self.pending_events
    }

    fn clear_pending_events(&mut self) {
        self.pending_events.clear();
    }
}

// Construction
impl Order {
    /// Places a new order in `PENDING` and records `ORDER_CREATED`.
    pub fn create(customer_id: CustomerId, items: Vec<OrderItem>) -> Result<Self, OrderError> {
        Self::create_at(customer_id, items, Utc::now())
    }

    /// Same as [`Order::create`], stamped with `now` instead of the system
    /// time. The pending timeout is measured from this instant.
    pub fn create_at(
        customer_id: CustomerId,
        items: Vec<OrderItem>,
        now: DateTime<Utc>,
    ) -> Result<Self, OrderError> {
        if items.is_empty() {
            return Err(OrderError::NoItems);
        }
        for item in &items {
            if item.quantity == 0 {
                return Err(OrderError::InvalidQuantity {
                    product_id: item.product_id.to_string(),
                    quantity: item.quantity,
                });
            }
            if item.unit_price.is_negative() {
                return Err(OrderError::InvalidPrice {
                    product_id: item.product_id.to_string(),
                    price: item.unit_price.cents(),
                });
            }
        }
        items
            .iter()
            .try_fold(Money::zero(), |total, item| {
                item.checked_line_total()
                    .and_then(|line| total.checked_add(line))
            })
            .ok_or(OrderError::AmountOverflow)?;

        let mut order = Self {
            id: AggregateId::new(),
            customer_id,
            items,
            status: OrderStatus::Pending,
            currency: DEFAULT_CURRENCY.to_string(),
            cancellation_reasons: Vec::new(),
            created_at: now,
            updated_at: now,
            was_updated: false,
            pending_events: Vec::new(),
        };

        order.pending_events.push(OrderEvent::OrderCreated(OrderCreatedData {
            order_id: order.id,
            customer_id,
            items: order.items.clone(),
            total_amount: order.total_amount(),
            currency: order.currency.clone(),
            created_at: now,
        }));

        Ok(order)
    }

    /// Rebuilds an order from its stored snapshot. No events are emitted.
    pub fn restore(snapshot: OrderSnapshot) -> Self {
        Self {
            id: snapshot.id,
            customer_id: snapshot.customer_id,
            items: snapshot.items,
            status: snapshot.status,
            currency: snapshot.currency,
            cancellation_reasons: snapshot.cancellation_reasons,
            created_at: snapshot.created_at,
            updated_at: snapshot.updated_at,
            was_updated: false,
            pending_events: Vec::new(),
        }
    }

    pub fn snapshot(&self) -> OrderSnapshot {
        OrderSnapshot {
            id: self.id,
            customer_id: self.customer_id,
            items: self.items.clone(),
            status: self.status,
            currency: self.currency.clone(),
            cancellation_reasons: self.cancellation_reasons.clone(),
            total_amount: self.total_amount(),
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

// Query methods
impl Order {
    pub fn customer_id(&self) -> CustomerId {
        self.customer_id
    }

    pub fn items(&self) -> &[OrderItem] {
        &self.items
    }

    pub fn status(&self) -> OrderStatus {
        self.status
    }

    pub fn currency(&self) -> &str {
        &self.currency
    }

    /// Sum of the line totals.
    pub fn total_amount(&self) -> Money {
        self.items.iter().map(OrderItem::line_total).sum()
    }

    pub fn cancellation_reasons(&self) -> &[CancellationReason] {
        &self.cancellation_reasons
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// True if the stored snapshot no longer matches this instance.
    pub fn was_updated(&self) -> bool {
        self.was_updated
    }

    /// Approved payment must be refunded when the inventory side failed, or
    /// when the order is already cancelled.
    pub fn needs_payment_rollback(&self, payment: PaymentStatus, inventory: InventoryStatus) -> bool {
        payment == PaymentStatus::Approved
            && (inventory == InventoryStatus::Unavailable || self.status == OrderStatus::Cancelled)
    }

    /// Reserved stock must be released when the payment side failed, or
    /// when the order is already cancelled.
    pub fn needs_inventory_rollback(
        &self,
        payment: PaymentStatus,
        inventory: InventoryStatus,
    ) -> bool {
        inventory == InventoryStatus::Reserved
            && (payment == PaymentStatus::Rejected || self.status == OrderStatus::Cancelled)
    }
}

// Transitions
impl Order {
    /// Moves the order along one edge of the status graph.
    ///
    /// A no-op if the order is already in the target status. Fails with
    /// `InvalidTransition`, leaving the order untouched, if the edge does
    /// not exist.
    pub fn transition_to(&mut self, transition: Transition) -> Result<(), OrderError> {
        let target = transition.target();
        if self.status == target {
            return Ok(());
        }
        if !self.status.can_transition_to(target) {
            return Err(OrderError::InvalidTransition {
                from: self.status,
                to: target,
            });
        }

        let previous = self.status;
        let now = Utc::now();
        let mut emitted = Vec::with_capacity(2);

        match transition {
            Transition::Confirm => {
                emitted.push(OrderEvent::OrderConfirmed(OrderConfirmedData {
                    order_id: self.id,
                    customer_id: self.customer_id,
                    total_amount: self.total_amount(),
                    confirmed_at: now,
                }));
            }
            Transition::Complete => {
                emitted.push(OrderEvent::OrderCompleted(StepCompletedData {
                    order_id: self.id,
                    completed_at: now,
                }));
            }
            Transition::Cancel(context) => {
                emitted.push(OrderEvent::OrderCancelled(OrderCancelledData {
                    order_id: self.id,
                    cancelled_by: CANCELLED_BY_SYSTEM.to_string(),
                    reasons: self.cancellation_reasons.clone(),
                    previous_status: previous,
                    requires_refund: self.needs_payment_rollback(context.payment, context.inventory),
                    requires_inventory_rollback: self
                        .needs_inventory_rollback(context.payment, context.inventory),
                    cancelled_at: now,
                }));
            }
            Transition::StartCompensation(plan) => {
                emitted.push(OrderEvent::OrderCompensationStarted(CompensationStartedData {
                    order_id: self.id,
                    requires_refund: plan.requires_refund(),
                    requires_inventory_rollback: plan.requires_inventory_rollback(),
                    started_at: now,
                }));
                if plan.requires_refund() {
                    emitted.push(OrderEvent::OrderPaymentRollbackRequested(
                        PaymentRollbackRequestedData {
                            order_id: self.id,
                            customer_id: self.customer_id,
                            amount: self.total_amount(),
                            currency: self.currency.clone(),
                            reasons: self.cancellation_reasons.clone(),
                            requested_at: now,
                        },
                    ));
                }
                if plan.requires_inventory_rollback() {
                    emitted.push(OrderEvent::OrderInventoryRollbackRequested(
                        InventoryRollbackRequestedData {
                            order_id: self.id,
                            items: self.items.clone(),
                            reasons: self.cancellation_reasons.clone(),
                            requested_at: now,
                        },
                    ));
                }
            }
            Transition::CompleteCompensation => {
                emitted.push(OrderEvent::OrderCompensationCompleted(StepCompletedData {
                    order_id: self.id,
                    completed_at: now,
                }));
            }
        }

        self.status = target;
        self.touch(now);
        self.pending_events.extend(emitted);
        Ok(())
    }

    pub fn confirm(&mut self) -> Result<(), OrderError> {
        self.transition_to(Transition::Confirm)
    }

    pub fn complete(&mut self) -> Result<(), OrderError> {
        self.transition_to(Transition::Complete)
    }

    /// Cancels the order and, if anything already succeeded on either side,
    /// starts compensating it.
    ///
    /// Returns the compensation plan that was started, if any.
    pub fn cancel(
        &mut self,
        payment: PaymentStatus,
        inventory: InventoryStatus,
    ) -> Result<Option<CompensationPlan>, OrderError> {
        let plan = CompensationPlan::required(
            self.needs_payment_rollback(payment, inventory),
            self.needs_inventory_rollback(payment, inventory),
        );

        self.transition_to(Transition::Cancel(CancelContext::new(payment, inventory)))?;
        if let Some(plan) = plan {
            self.transition_to(Transition::StartCompensation(plan))?;
        }
        Ok(plan)
    }

    pub fn complete_compensation(&mut self) -> Result<(), OrderError> {
        self.transition_to(Transition::CompleteCompensation)
    }

    /// Adds a reason unless it is already recorded. Returns true if added.
    pub fn add_cancellation_reason(&mut self, reason: CancellationReason) -> bool {
        if self.cancellation_reasons.contains(&reason) {
            return false;
        }
        self.cancellation_reasons.push(reason);
        self.touch(Utc::now());
        true
    }
}

// Collaborator outcomes. None of these change `status`.
impl Order {
    pub fn mark_inventory_reservation_completed(&mut self) {
        self.pending_events
            .push(OrderEvent::OrderInventoryReservationCompleted(
                StepCompletedData::now(self.id),
            ));
    }

    pub fn mark_inventory_reservation_failed(&mut self, reason: CancellationReason) {
        self.add_cancellation_reason(reason);
        self.pending_events
            .push(OrderEvent::OrderInventoryReservationFailed(
                StepFailedData::now(self.id, reason),
            ));
    }

    pub fn mark_payment_deduction_completed(&mut self) {
        self.pending_events
            .push(OrderEvent::OrderPaymentDeductionCompleted(
                StepCompletedData::now(self.id),
            ));
    }

    pub fn mark_payment_verification_failed(&mut self, reason: CancellationReason) {
        self.add_cancellation_reason(reason);
        self.pending_events
            .push(OrderEvent::OrderPaymentVerificationFailed(
                StepFailedData::now(self.id, reason),
            ));
    }

    pub fn mark_inventory_rollback_completed(&mut self) {
        self.pending_events
            .push(OrderEvent::OrderInventoryRollbackCompleted(
                StepCompletedData::now(self.id),
            ));
    }

    pub fn mark_payment_rollback_completed(&mut self) {
        self.pending_events
            .push(OrderEvent::OrderPaymentRollbackCompleted(
                StepCompletedData::now(self.id),
            ));
    }

    /// Called once the snapshot has been written.
    pub fn mark_saved(&mut self) {
        self.was_updated = false;
    }

    fn touch(&mut self, now: DateTime<Utc>) {
        self.updated_at = now;
        self.was_updated = true;
    }
}
