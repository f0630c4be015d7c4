//! In-memory storage adapter.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::AggregateId;
use domain::{Aggregate, Order, OrderSnapshot, OrderStatus};
use event_store::{AppendOptions, EventEnvelope, Version, check_append};
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

use crate::error::Result;
use crate::outbox::OutboxEntry;
use crate::ports::{
    EventRepository, OrderRepository, OutboxRepository, TransactionManager, UnitOfWork,
};

#[derive(Debug, Default)]
struct Tables {
    events: HashMap<AggregateId, Vec<EventEnvelope>>,
    orders: HashMap<AggregateId, OrderSnapshot>,
    /// Insertion order is creation order.
    outbox: Vec<OutboxEntry>,
}

impl Tables {
    fn upsert_outbox(&mut self, entry: OutboxEntry) {
        match self.outbox.iter_mut().find(|e| e.event_id == entry.event_id) {
            Some(existing) => *existing = entry,
            None => self.outbox.push(entry),
        }
    }
}

/// Store whose units of work run one at a time.
///
/// A unit of work holds the store-wide lock from `begin` until it is
/// committed or dropped, and stages its writes until `commit`.
#[derive(Debug, Clone, Default)]
pub struct InMemoryStore {
    tables: Arc<Mutex<Tables>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Committed outbox entries, oldest first.
    pub async fn outbox_entries(&self) -> Vec<OutboxEntry> {
        self.tables.lock().await.outbox.clone()
    }

    /// Committed history of one aggregate.
    pub async fn events_for(&self, id: AggregateId) -> Vec<EventEnvelope> {
        self.tables
            .lock()
            .await
            .events
            .get(&id)
            .cloned()
            .unwrap_or_default()
    }

    pub async fn order_snapshot(&self, id: AggregateId) -> Option<OrderSnapshot> {
        self.tables.lock().await.orders.get(&id).cloned()
    }
}

#[async_trait]
impl TransactionManager for InMemoryStore {
    type UnitOfWork = InMemoryUnitOfWork;

    async fn begin(&self) -> Result<InMemoryUnitOfWork> {
        Ok(InMemoryUnitOfWork {
            tables: self.tables.clone().lock_owned().await,
            staged: Tables::default(),
        })
    }
}

/// Writes staged over a locked view of the store.
pub struct InMemoryUnitOfWork {
    tables: OwnedMutexGuard<Tables>,
    staged: Tables,
}

impl InMemoryUnitOfWork {
    fn history(&self, id: AggregateId) -> Vec<EventEnvelope> {
        let committed = self.tables.events.get(&id).into_iter().flatten();
        let staged = self.staged.events.get(&id).into_iter().flatten();
        committed.chain(staged).cloned().collect()
    }

    fn outbox_view(&self) -> Vec<OutboxEntry> {
        let mut view = self.tables.outbox.clone();
        for entry in &self.staged.outbox {
            match view.iter_mut().find(|e| e.event_id == entry.event_id) {
                Some(existing) => *existing = entry.clone(),
                None => view.push(entry.clone()),
            }
        }
        view
    }

    fn outbox_entry(&self, event_id: Uuid) -> Option<OutboxEntry> {
        self.staged
            .outbox
            .iter()
            .chain(self.tables.outbox.iter())
            .find(|e| e.event_id == event_id)
            .cloned()
    }

    fn stage_order(&mut self, order: &Order) {
        self.staged.orders.insert(order.id(), order.snapshot());
    }
}

#[async_trait]
impl EventRepository for InMemoryUnitOfWork {
    async fn append(&mut self, events: Vec<EventEnvelope>, expected: Version) -> Result<Version> {
        let Some(aggregate_id) = events.first().map(|e| e.aggregate_id) else {
            return Ok(check_append(
                expected,
                &events,
                AppendOptions::expect_version(expected),
            )?);
        };
        let current = self
            .history(aggregate_id)
            .last()
            .map(|e| e.version)
            .unwrap_or_default();
        let version = check_append(current, &events, AppendOptions::expect_version(expected))
            .inspect_err(|err| {
                if err.is_concurrency_conflict() {
                    metrics::counter!("event_store_conflicts_total").increment(1);
                }
            })?;

        metrics::counter!("event_store_appends_total").increment(events.len() as u64);
        self.staged
            .events
            .entry(aggregate_id)
            .or_default()
            .extend(events);
        Ok(version)
    }

    async fn get_by_aggregate_id(&mut self, id: AggregateId) -> Result<Vec<EventEnvelope>> {
        Ok(self.history(id))
    }

    async fn get_last_event(&mut self, id: AggregateId) -> Result<Option<EventEnvelope>> {
        Ok(self.history(id).pop())
    }
}

#[async_trait]
impl OrderRepository for InMemoryUnitOfWork {
    async fn find_by_id(&mut self, id: AggregateId) -> Result<Option<Order>> {
        let snapshot = self
            .staged
            .orders
            .get(&id)
            .or_else(|| self.tables.orders.get(&id))
            .cloned();
        Ok(snapshot.map(Order::restore))
    }

    async fn save(&mut self, order: &Order) -> Result<()> {
        self.stage_order(order);
        Ok(())
    }

    async fn update(&mut self, order: &Order) -> Result<()> {
        self.stage_order(order);
        Ok(())
    }

    async fn find_ids_by_status(
        &mut self,
        status: OrderStatus,
        limit: usize,
    ) -> Result<Vec<AggregateId>> {
        let mut matching: Vec<_> = self
            .tables
            .orders
            .values()
            .filter(|o| !self.staged.orders.contains_key(&o.id))
            .chain(self.staged.orders.values())
            .filter(|o| o.status == status)
            .map(|o| (o.created_at, o.id))
            .collect();
        matching.sort();
        Ok(matching.into_iter().take(limit).map(|(_, id)| id).collect())
    }
}

#[async_trait]
impl OutboxRepository for InMemoryUnitOfWork {
    async fn save(&mut self, entry: &OutboxEntry) -> Result<()> {
        self.staged.upsert_outbox(entry.clone());
        Ok(())
    }

    async fn get_pending(&mut self, limit: usize, max_retries: u32) -> Result<Vec<OutboxEntry>> {
        Ok(self
            .outbox_view()
            .into_iter()
            .filter(|e| e.is_pending(max_retries))
            .take(limit)
            .collect())
    }

    async fn mark_as_processed(&mut self, event_id: Uuid, at: DateTime<Utc>) -> Result<()> {
        if let Some(mut entry) = self.outbox_entry(event_id) {
            entry.mark_as_processed(at);
            self.staged.upsert_outbox(entry);
        }
        Ok(())
    }

    async fn increment_retry(&mut self, event_id: Uuid, error: Option<&str>) -> Result<()> {
        if let Some(mut entry) = self.outbox_entry(event_id) {
            entry.increment_retry(error.map(str::to_string));
            self.staged.upsert_outbox(entry);
        }
        Ok(())
    }
}

#[async_trait]
impl UnitOfWork for InMemoryUnitOfWork {
    async fn commit(mut self) -> Result<()> {
        let staged = std::mem::take(&mut self.staged);
        for (id, events) in staged.events {
            self.tables.events.entry(id).or_default().extend(events);
        }
        self.tables.orders.extend(staged.orders);
        for entry in staged.outbox {
            self.tables.upsert_outbox(entry);
        }
        Ok(())
    }
}
