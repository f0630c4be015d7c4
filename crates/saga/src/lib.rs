//! Order fulfillment saga.
//!
//! The [`OrderProcessManager`] reacts to inventory and payment notifications.
//! For each one it locks the order, folds its event log into an
//! [`OrderState`](projections::OrderState), decides the next transition and
//! persists the resulting events, snapshot and outbox entries in a single
//! unit of work. The [`OutboxRelay`] publishes those entries afterwards.
//!
//! The happy path confirms an order once payment is approved and stock is
//! reserved. Any failure cancels it, and whatever already succeeded on the
//! other side is compensated with a refund or an inventory rollback.

pub mod clock;
pub mod completion;
pub mod error;
pub mod integration;
pub mod outbox;
mod persistence;
pub mod ports;
pub mod process_manager;
pub mod relay;
pub mod service;
pub mod storage;

#[cfg(any(test, feature = "test-util"))]
pub use clock::ManualClock;
pub use clock::{Clock, SystemClock};
pub use completion::{Completion, evaluate_completion};
pub use error::{ErrorKind, Result, SagaError};
pub use integration::{
    CollaboratorEvent, DefaultIntegrationEventMapper, IncomingIntegrationEvent,
    IntegrationEventMapper, OutgoingIntegrationEvent,
};
pub use outbox::{DEFAULT_MAX_RETRIES, OutboxEntry};
pub use ports::{
    EventRepository, MessagePublisher, OrderRepository, OutboxRepository, TransactionManager,
    UnitOfWork,
};
pub use process_manager::{HandleOutcome, OrderProcessManager, SagaConfig};
pub use relay::{DrainReport, InMemoryPublisher, OutboxRelay, OutboxRelayConfig};
pub use service::OrderService;
pub use storage::{InMemoryStore, PostgresStore};
