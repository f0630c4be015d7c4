//! Aggregate and domain event traits, plus the bridge to the event log.

use chrono::{DateTime, Utc};
use common::AggregateId;
use event_store::{EventEnvelope, Version};
use serde::{Serialize, de::DeserializeOwned};

use crate::DomainError;

/// Metadata key under which the causing message's correlation id is stored.
pub const CORRELATION_ID_KEY: &str = "correlation_id";

/// An immutable fact about an aggregate.
pub trait DomainEvent: Serialize + DeserializeOwned + Send + Sync + Clone {
    /// Wire name, stored as the log's `event_type`.
    fn event_type(&self) -> &'static str;

    /// Returns true if this event type can decode `event_type`.
    fn is_known_type(event_type: &str) -> bool;

    fn occurred_at(&self) -> DateTime<Utc>;
}

/// A consistency boundary that buffers the events its operations emit.
///
/// The buffer is drained by the persistence step after a successful
/// append; operations never write to storage themselves.
pub trait Aggregate: Send + Sync {
    type Event: DomainEvent;

    fn aggregate_type() -> &'static str;

    fn id(&self) -> AggregateId;

    /// Events emitted since the last `clear_pending_events`.
    fn pending_events(&self) -> &[Self::Event];

    fn clear_pending_events(&mut self);
}

/// Wraps the aggregate's pending events into envelopes that continue the
/// log after `current_version`.
pub fn build_envelopes<A: Aggregate>(
    aggregate: &A,
    current_version: Version,
    correlation_id: Option<&str>,
) -> Result<Vec<EventEnvelope>, DomainError> {
    let mut envelopes = Vec::with_capacity(aggregate.pending_events().len());
    let mut version = current_version;

    for event in aggregate.pending_events() {
        version = version.next();
        let mut builder = EventEnvelope::builder()
            .aggregate_id(aggregate.id())
            .aggregate_type(A::aggregate_type())
            .event_type(event.event_type())
            .version(version)
            .timestamp(event.occurred_at())
            .payload(event)?;
        if let Some(correlation_id) = correlation_id {
            builder = builder.metadata(CORRELATION_ID_KEY, serde_json::json!(correlation_id));
        }
        envelopes.push(builder.build()?);
    }

    Ok(envelopes)
}

/// Decodes a stored envelope.
///
/// Returns `Ok(None)` for event types this build does not know, so that
/// readers tolerate events written by newer code.
pub fn decode_event<E: DomainEvent>(envelope: &EventEnvelope) -> Result<Option<E>, DomainError> {
    if !E::is_known_type(&envelope.event_type) {
        return Ok(None);
    }
    Ok(Some(serde_json::from_value(envelope.payload.clone())?))
}
