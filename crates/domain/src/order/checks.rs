//! Outcome of the two collaborator checks an order waits on.

use serde::{Deserialize, Serialize};

/// Result of payment verification/deduction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    #[default]
    Pending,
    Approved,
    Rejected,
}

impl PaymentStatus {
    pub const ALL: [PaymentStatus; 3] = [
        PaymentStatus::Pending,
        PaymentStatus::Approved,
        PaymentStatus::Rejected,
    ];

    pub fn is_pending(&self) -> bool {
        matches!(self, PaymentStatus::Pending)
    }
}

/// Result of the inventory reservation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InventoryStatus {
    #[default]
    Pending,
    Reserved,
    Unavailable,
}

impl InventoryStatus {
    pub const ALL: [InventoryStatus; 3] = [
        InventoryStatus::Pending,
        InventoryStatus::Reserved,
        InventoryStatus::Unavailable,
    ];

    pub fn is_pending(&self) -> bool {
        matches!(self, InventoryStatus::Pending)
    }
}

/// Progress of one compensating action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RollbackStatus {
    #[default]
    NotRequired,
    Requested,
    Completed,
}

impl RollbackStatus {
    /// Requested but not yet reported back.
    pub fn is_outstanding(&self) -> bool {
        matches!(self, RollbackStatus::Requested)
    }
}
