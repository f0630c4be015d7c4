//! Why an order was cancelled.

use serde::{Deserialize, Serialize};

/// Who cancels orders in the saga; there is no customer-initiated path.
pub const CANCELLED_BY_SYSTEM: &str = "system";

/// Normalized cancellation cause.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CancellationReason {
    InsufficientFunds,
    PaymentDeclined,
    InventoryUnavailable,
    /// A collaborator did not answer within the pending window.
    Timeout,
    /// Anything a collaborator reported that has no mapping.
    SystemError,
}

impl CancellationReason {
    /// Maps a reason string reported by a collaborator.
    ///
    /// Total: missing and unrecognized values become `SystemError`.
    pub fn from_collaborator(raw: Option<&str>) -> Self {
        let Some(raw) = raw else {
            return CancellationReason::SystemError;
        };

        match raw.trim().to_ascii_uppercase().as_str() {
            "INSUFFICIENT_FUNDS" => CancellationReason::InsufficientFunds,
            "PAYMENT_DECLINED" | "CARD_DECLINED" => CancellationReason::PaymentDeclined,
            "INVENTORY_UNAVAILABLE" | "OUT_OF_STOCK" | "INSUFFICIENT_STOCK" => {
                CancellationReason::InventoryUnavailable
            }
            "TIMEOUT" => CancellationReason::Timeout,
            _ => CancellationReason::SystemError,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CancellationReason::InsufficientFunds => "INSUFFICIENT_FUNDS",
            CancellationReason::PaymentDeclined => "PAYMENT_DECLINED",
            CancellationReason::InventoryUnavailable => "INVENTORY_UNAVAILABLE",
            CancellationReason::Timeout => "TIMEOUT",
            CancellationReason::SystemError => "SYSTEM_ERROR",
        }
    }
}

impl std::fmt::Display for CancellationReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
