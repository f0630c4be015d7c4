//! Order aggregate and related types.

mod aggregate;
mod checks;
mod events;
mod reason;
mod state;
mod transition;
mod value_objects;

pub use aggregate::{Order, OrderSnapshot};
pub use checks::{InventoryStatus, PaymentStatus, RollbackStatus};
pub use events::{
    CompensationStartedData, InventoryRollbackRequestedData, OrderCancelledData,
    OrderConfirmedData, OrderCreatedData, OrderEvent, PaymentRollbackRequestedData,
    StepCompletedData, StepFailedData,
};
pub use reason::{CANCELLED_BY_SYSTEM, CancellationReason};
pub use state::OrderStatus;
pub use transition::{CancelContext, CompensationPlan, Transition};
pub use value_objects::{CustomerId, DEFAULT_CURRENCY, Money, OrderItem, ProductId};

use thiserror::Error;

/// Errors raised by the order aggregate.
#[derive(Debug, Error)]
pub enum OrderError {
    #[error("Invalid transition from {from} to {to}")]
    InvalidTransition { from: OrderStatus, to: OrderStatus },

    #[error("Compensation requires a refund or an inventory rollback")]
    MissingCompensationFlags,

    #[error("Order has no items")]
    NoItems,

    #[error("Invalid quantity for {product_id}: {quantity} (must be greater than 0)")]
    InvalidQuantity { product_id: String, quantity: u32 },

    #[error("Invalid price for {product_id}: {price} (must not be negative)")]
    InvalidPrice { product_id: String, price: i64 },

    #[error("Order total exceeds the largest representable amount")]
    AmountOverflow,

    #[error("Unknown order status: {0}")]
    UnknownStatus(String),
}

impl OrderError {
    /// Broken state-machine or aggregate invariant, as opposed to bad input.
    pub fn is_invariant_violation(&self) -> bool {
        matches!(
            self,
            OrderError::InvalidTransition { .. }
                | OrderError::MissingCompensationFlags
                | OrderError::UnknownStatus(_)
        )
    }
}
