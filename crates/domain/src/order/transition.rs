//! Requested status changes and the context they carry.

use super::{InventoryStatus, OrderError, OrderStatus, PaymentStatus};

/// Collaborator outcomes that led to a cancellation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CancelContext {
    pub payment: PaymentStatus,
    pub inventory: InventoryStatus,
}

impl CancelContext {
    pub fn new(payment: PaymentStatus, inventory: InventoryStatus) -> Self {
        Self { payment, inventory }
    }
}

/// Which compensating actions a cancelled order needs.
///
/// At least one flag is always set; construct through [`CompensationPlan::new`]
/// or [`CompensationPlan::required`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompensationPlan {
    requires_refund: bool,
    requires_inventory_rollback: bool,
}

impl CompensationPlan {
    pub fn new(requires_refund: bool, requires_inventory_rollback: bool) -> Result<Self, OrderError> {
        Self::required(requires_refund, requires_inventory_rollback)
            .ok_or(OrderError::MissingCompensationFlags)
    }

    /// Returns a plan only if there is something to compensate.
    pub fn required(requires_refund: bool, requires_inventory_rollback: bool) -> Option<Self> {
        (requires_refund || requires_inventory_rollback).then_some(Self {
            requires_refund,
            requires_inventory_rollback,
        })
    }

    pub fn requires_refund(&self) -> bool {
        self.requires_refund
    }

    pub fn requires_inventory_rollback(&self) -> bool {
        self.requires_inventory_rollback
    }
}

/// A status change together with whatever data its target needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Confirm,
    Complete,
    Cancel(CancelContext),
    StartCompensation(CompensationPlan),
    CompleteCompensation,
}

impl Transition {
    pub fn target(&self) -> OrderStatus {
        match self {
            Transition::Confirm => OrderStatus::Confirmed,
            Transition::Complete => OrderStatus::Completed,
            Transition::Cancel(_) => OrderStatus::Cancelled,
            Transition::StartCompensation(_) => OrderStatus::CompensationPending,
            Transition::CompleteCompensation => OrderStatus::Compensated,
        }
    }
}
