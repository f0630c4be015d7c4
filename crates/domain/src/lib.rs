//! Order domain for the fulfillment saga.
//!
//! - [`Order`]: the aggregate root with its status graph and event buffer
//! - [`OrderEvent`]: the closed catalog of facts recorded about an order
//! - [`build_envelopes`] / [`decode_event`]: the bridge to the event log

pub mod aggregate;
pub mod error;
pub mod order;

pub use aggregate::{Aggregate, CORRELATION_ID_KEY, DomainEvent, build_envelopes, decode_event};
pub use error::DomainError;
pub use order::{
    CANCELLED_BY_SYSTEM, CancelContext, CancellationReason, CompensationPlan, CustomerId,
    DEFAULT_CURRENCY, InventoryStatus, Money, Order, OrderError, OrderEvent, OrderItem,
    OrderSnapshot, OrderStatus, PaymentStatus, ProductId, RollbackStatus, Transition,
};
