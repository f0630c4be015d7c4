use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::{
    AggregateId, EventEnvelope, Result, Version,
    store::{AppendOptions, EventStore, check_append},
};

/// Event log held in process memory.
///
/// Behaves like the PostgreSQL store, including the version checks, so it
/// can stand in for it in tests and single-process runs. Cloning shares the
/// underlying log.
#[derive(Clone, Default)]
pub struct InMemoryEventStore {
    streams: Arc<RwLock<HashMap<AggregateId, Vec<EventEnvelope>>>>,
}

impl InMemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of events across all aggregates.
    pub async fn event_count(&self) -> usize {
        self.streams.read().await.values().map(Vec::len).sum()
    }

    pub async fn clear(&self) {
        self.streams.write().await.clear();
    }
}

fn current_version(stream: Option<&Vec<EventEnvelope>>) -> Version {
    stream
        .and_then(|events| events.last())
        .map(|event| event.version)
        .unwrap_or_default()
}

#[async_trait]
impl EventStore for InMemoryEventStore {
    async fn append(&self, events: Vec<EventEnvelope>, options: AppendOptions) -> Result<Version> {
        let mut streams = self.streams.write().await;
        let Some(aggregate_id) = events.first().map(|event| event.aggregate_id) else {
            return check_append(Version::initial(), &events, options);
        };

        let current = current_version(streams.get(&aggregate_id));
        let new_version = match check_append(current, &events, options) {
            Ok(version) => version,
            Err(err) => {
                if err.is_concurrency_conflict() {
                    metrics::counter!("event_store_conflicts_total").increment(1);
                }
                return Err(err);
            }
        };

        metrics::counter!("event_store_appends_total").increment(events.len() as u64);
        streams.entry(aggregate_id).or_default().extend(events);
        Ok(new_version)
    }

    async fn get_events_for_aggregate(
        &self,
        aggregate_id: AggregateId,
    ) -> Result<Vec<EventEnvelope>> {
        let streams = self.streams.read().await;
        Ok(streams.get(&aggregate_id).cloned().unwrap_or_default())
    }

    async fn get_last_event(&self, aggregate_id: AggregateId) -> Result<Option<EventEnvelope>> {
        let streams = self.streams.read().await;
        Ok(streams
            .get(&aggregate_id)
            .and_then(|events| events.last())
            .cloned())
    }

    async fn get_aggregate_version(&self, aggregate_id: AggregateId) -> Result<Option<Version>> {
        let streams = self.streams.read().await;
        Ok(streams
            .get(&aggregate_id)
            .and_then(|events| events.last())
            .map(|event| event.version))
    }
}
