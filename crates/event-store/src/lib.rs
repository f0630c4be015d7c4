//! Append-only event log with per-aggregate optimistic concurrency.
//!
//! Two backends share the same contract: [`InMemoryEventStore`] for tests
//! and single-process runs, and [`PostgresEventStore`] backed by the
//! `events` table. The connection-level helpers in [`postgres`] are public
//! so transactional units of work can append inside their own transaction.

pub mod error;
pub mod event;
pub mod memory;
pub mod postgres;
pub mod store;

pub use common::AggregateId;
pub use error::{EventStoreError, Result};
pub use event::{EventEnvelope, EventEnvelopeBuilder, EventId, Version};
pub use memory::InMemoryEventStore;
pub use postgres::PostgresEventStore;
pub use store::{AppendOptions, EventStore, EventStoreExt, check_append, validate_events_for_append};
