//! Storage and transport capabilities the saga core depends on.
//!
//! A unit of work implements all three repositories over one transaction.
//! Dropping it without calling [`UnitOfWork::commit`] discards every write.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::AggregateId;
use domain::{Order, OrderStatus};
use event_store::{EventEnvelope, Version};
use uuid::Uuid;

use crate::error::Result;
use crate::integration::OutgoingIntegrationEvent;
use crate::outbox::OutboxEntry;

/// Append-only event log scoped to the current unit of work.
#[async_trait]
pub trait EventRepository: Send {
    /// Appends `events` if the stored version equals `expected`, otherwise
    /// fails with a concurrency conflict. Returns the new version.
    async fn append(&mut self, events: Vec<EventEnvelope>, expected: Version) -> Result<Version>;

    /// Full history ordered by version. Empty when the aggregate is unknown.
    async fn get_by_aggregate_id(&mut self, id: AggregateId) -> Result<Vec<EventEnvelope>>;

    async fn get_last_event(&mut self, id: AggregateId) -> Result<Option<EventEnvelope>>;

    async fn exists(&mut self, id: AggregateId) -> Result<bool> {
        Ok(self.get_last_event(id).await?.is_some())
    }
}

/// Current snapshot of each order.
#[async_trait]
pub trait OrderRepository: Send {
    /// Loads the order and holds it exclusively until the unit of work ends.
    async fn find_by_id(&mut self, id: AggregateId) -> Result<Option<Order>>;

    async fn save(&mut self, order: &Order) -> Result<()>;

    async fn update(&mut self, order: &Order) -> Result<()>;

    /// Oldest first.
    async fn find_ids_by_status(
        &mut self,
        status: OrderStatus,
        limit: usize,
    ) -> Result<Vec<AggregateId>>;
}

/// Publish-intent queue.
#[async_trait]
pub trait OutboxRepository: Send {
    async fn save(&mut self, entry: &OutboxEntry) -> Result<()>;

    async fn save_many(&mut self, entries: &[OutboxEntry]) -> Result<()> {
        for entry in entries {
            OutboxRepository::save(&mut *self, entry).await?;
        }
        Ok(())
    }

    /// Claims up to `limit` pending entries, oldest first. Entries claimed
    /// by another open unit of work are skipped.
    async fn get_pending(&mut self, limit: usize, max_retries: u32) -> Result<Vec<OutboxEntry>>;

    async fn mark_as_processed(&mut self, event_id: Uuid, at: DateTime<Utc>) -> Result<()>;

    async fn increment_retry(&mut self, event_id: Uuid, error: Option<&str>) -> Result<()>;
}

/// One atomic scope over the event log, order snapshots and outbox.
#[async_trait]
pub trait UnitOfWork: EventRepository + OrderRepository + OutboxRepository + Sized {
    async fn commit(self) -> Result<()>;
}

/// Opens units of work.
#[async_trait]
pub trait TransactionManager: Send + Sync {
    type UnitOfWork: UnitOfWork + 'static;

    async fn begin(&self) -> Result<Self::UnitOfWork>;
}

/// Delivers outbox messages to the bus.
#[async_trait]
pub trait MessagePublisher: Send + Sync {
    async fn publish(&self, message: &OutgoingIntegrationEvent) -> Result<()>;
}
