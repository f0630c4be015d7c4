use async_trait::async_trait;

use crate::{AggregateId, EventEnvelope, EventStoreError, Result, Version};

/// Options for appending events to the log.
#[derive(Debug, Clone, Copy, Default)]
pub struct AppendOptions {
    /// Version the caller last observed for the aggregate.
    ///
    /// When set, the append fails with `ConcurrencyConflict` unless the
    /// stored version still equals it. `None` skips the check.
    pub expected_version: Option<Version>,
}

impl AppendOptions {
    /// No version check.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn expect_version(version: Version) -> Self {
        Self {
            expected_version: Some(version),
        }
    }

    /// Expects the aggregate to have no events yet.
    pub fn expect_new() -> Self {
        Self::expect_version(Version::initial())
    }
}

/// Append-only event log shared across the process.
///
/// Implementations must be thread-safe. Appends are atomic: either every
/// envelope in the batch is stored or none is.
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Appends a batch of events for one aggregate.
    ///
    /// Returns the aggregate's version after the append.
    async fn append(&self, events: Vec<EventEnvelope>, options: AppendOptions) -> Result<Version>;

    /// Returns all events of an aggregate in ascending version order.
    ///
    /// An empty result means the aggregate is unknown to the log.
    async fn get_events_for_aggregate(
        &self,
        aggregate_id: AggregateId,
    ) -> Result<Vec<EventEnvelope>>;

    /// Returns the highest-versioned event of an aggregate.
    async fn get_last_event(&self, aggregate_id: AggregateId) -> Result<Option<EventEnvelope>>;

    /// Returns the current version, or `None` if the aggregate has no events.
    async fn get_aggregate_version(&self, aggregate_id: AggregateId) -> Result<Option<Version>>;
}

#[async_trait]
pub trait EventStoreExt: EventStore {
    async fn append_event(&self, event: EventEnvelope, options: AppendOptions) -> Result<Version> {
        self.append(vec![event], options).await
    }

    /// Checks for at least one event without loading the history.
    async fn aggregate_exists(&self, aggregate_id: AggregateId) -> Result<bool> {
        Ok(self.get_aggregate_version(aggregate_id).await?.is_some())
    }
}

impl<T: EventStore + ?Sized> EventStoreExt for T {}

/// Checks the shape of a batch before it reaches a backend.
///
/// The batch must be non-empty, belong to a single aggregate and carry
/// consecutive versions.
pub fn validate_events_for_append(events: &[EventEnvelope]) -> Result<()> {
    let Some(first) = events.first() else {
        return Err(EventStoreError::InvalidAppend(
            "cannot append an empty event list".to_string(),
        ));
    };

    let mut expected_version = first.version;
    for event in events.iter().skip(1) {
        if event.aggregate_id != first.aggregate_id || event.aggregate_type != first.aggregate_type
        {
            return Err(EventStoreError::InvalidAppend(
                "all events must belong to the same aggregate".to_string(),
            ));
        }
        expected_version = expected_version.next();
        if event.version != expected_version {
            return Err(EventStoreError::InvalidAppend(format!(
                "event versions must be sequential: expected {expected_version}, got {}",
                event.version
            )));
        }
    }

    Ok(())
}

/// Decides whether a validated batch may be appended on top of `current`.
///
/// Enforces the caller's expected version and the contiguity of the log:
/// the batch has to start exactly one past the stored version. Returns the
/// version the aggregate will have once the batch is stored.
pub fn check_append(
    current: Version,
    events: &[EventEnvelope],
    options: AppendOptions,
) -> Result<Version> {
    validate_events_for_append(events)?;
    let (Some(first), Some(last)) = (events.first(), events.last()) else {
        return Err(EventStoreError::InvalidAppend(
            "cannot append an empty event list".to_string(),
        ));
    };

    if let Some(expected) = options.expected_version
        && expected != current
    {
        return Err(EventStoreError::ConcurrencyConflict {
            aggregate_id: first.aggregate_id,
            expected,
            actual: current,
        });
    }

    if first.version != current.next() {
        return Err(EventStoreError::ConcurrencyConflict {
            aggregate_id: first.aggregate_id,
            expected: options.expected_version.unwrap_or(current),
            actual: current,
        });
    }

    Ok(last.version)
}
