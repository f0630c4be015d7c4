//! Completion evaluation over the two collaborator sub-statuses.

use domain::{InventoryStatus, PaymentStatus};

/// Outcome of evaluating an order once both sides may have answered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    /// At least one side has not answered yet.
    Pending,
    /// Payment approved and stock reserved.
    Confirm,
    /// At least one side failed.
    Cancel,
}

/// Decides the next order transition from the sub-statuses.
///
/// Exactly one outcome per pair: a pending side always wins, then any
/// failure cancels.
pub fn evaluate_completion(payment: PaymentStatus, inventory: InventoryStatus) -> Completion {
    match (payment, inventory) {
        (PaymentStatus::Pending, _) | (_, InventoryStatus::Pending) => Completion::Pending,
        (PaymentStatus::Approved, InventoryStatus::Reserved) => Completion::Confirm,
        (PaymentStatus::Rejected, _) | (_, InventoryStatus::Unavailable) => Completion::Cancel,
    }
}
