//! Order lifecycle status and its transition graph.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::OrderError;

/// Lifecycle status of an order.
///
/// ```text
/// PENDING ──► CONFIRMED ──► COMPLETED
///    │            │
///    └────────────┴──► CANCELLED ──► COMPENSATION_PENDING ──► COMPENSATED
///                          │                                      ▲
///                          └──────────────────────────────────────┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    /// Waiting for the payment and inventory outcomes.
    #[default]
    Pending,
    Confirmed,
    Cancelled,
    /// Cancelled with refunds or inventory releases still outstanding.
    CompensationPending,
    Compensated,
    Completed,
}

impl OrderStatus {
    pub const ALL: [OrderStatus; 6] = [
        OrderStatus::Pending,
        OrderStatus::Confirmed,
        OrderStatus::Cancelled,
        OrderStatus::CompensationPending,
        OrderStatus::Compensated,
        OrderStatus::Completed,
    ];

    /// Returns true if `target` is a direct successor in the graph.
    pub fn can_transition_to(&self, target: OrderStatus) -> bool {
        use OrderStatus::*;

        matches!(
            (self, target),
            (Pending, Confirmed)
                | (Pending, Cancelled)
                | (Confirmed, Completed)
                | (Confirmed, Cancelled)
                | (Cancelled, CompensationPending)
                | (Cancelled, Compensated)
                | (CompensationPending, Compensated)
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Completed | OrderStatus::Compensated)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "PENDING",
            OrderStatus::Confirmed => "CONFIRMED",
            OrderStatus::Cancelled => "CANCELLED",
            OrderStatus::CompensationPending => "COMPENSATION_PENDING",
            OrderStatus::Compensated => "COMPENSATED",
            OrderStatus::Completed => "COMPLETED",
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderStatus {
    type Err = OrderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        OrderStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| OrderError::UnknownStatus(s.to_string()))
    }
}
