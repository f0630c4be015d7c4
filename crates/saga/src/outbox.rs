//! Outbox entries: messages staged for publication in the same unit of
//! work as the state change that produced them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::integration::OutgoingIntegrationEvent;

/// Entries that failed this many times are parked for an operator.
pub const DEFAULT_MAX_RETRIES: u32 = 5;

/// A message waiting to be published.
///
/// After creation only [`mark_as_processed`](Self::mark_as_processed) and
/// [`increment_retry`](Self::increment_retry) change it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutboxEntry {
    pub event_id: Uuid,
    pub event_type: String,
    pub payload: serde_json::Value,
    pub correlation_id: Option<String>,
    pub version: String,
    pub occurred_at: DateTime<Utc>,
    pub exchange: String,
    pub routing_key: String,
    pub source: String,
    pub retry_count: u32,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
}

impl OutboxEntry {
    pub fn new(message: OutgoingIntegrationEvent, created_at: DateTime<Utc>) -> Self {
        Self {
            event_id: message.event_id,
            event_type: message.event_type,
            payload: message.payload,
            correlation_id: message.correlation_id,
            version: message.version,
            occurred_at: message.occurred_at,
            exchange: message.exchange,
            routing_key: message.routing_key,
            source: message.source,
            retry_count: 0,
            error: None,
            created_at,
            processed_at: None,
        }
    }

    /// The message to hand to the publisher.
    pub fn message(&self) -> OutgoingIntegrationEvent {
        OutgoingIntegrationEvent {
            event_id: self.event_id,
            event_type: self.event_type.clone(),
            payload: self.payload.clone(),
            correlation_id: self.correlation_id.clone(),
            version: self.version.clone(),
            occurred_at: self.occurred_at,
            exchange: self.exchange.clone(),
            routing_key: self.routing_key.clone(),
            source: self.source.clone(),
        }
    }

    pub fn is_processed(&self) -> bool {
        self.processed_at.is_some()
    }

    /// Unprocessed and still below the retry ceiling.
    pub fn is_pending(&self, max_retries: u32) -> bool {
        !self.is_processed() && self.retry_count < max_retries
    }

    /// Unprocessed but out of retries.
    pub fn is_parked(&self, max_retries: u32) -> bool {
        !self.is_processed() && self.retry_count >= max_retries
    }

    pub fn mark_as_processed(&mut self, at: DateTime<Utc>) {
        self.processed_at = Some(at);
    }

    pub fn increment_retry(&mut self, error: Option<String>) {
        self.retry_count = self.retry_count.saturating_add(1);
        if error.is_some() {
            self.error = error;
        }
    }
}
