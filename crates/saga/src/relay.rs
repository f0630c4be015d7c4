//! Outbox relay: drains pending outbox entries to the message bus.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Mutex, watch};

use crate::clock::{Clock, SystemClock};
use crate::error::{Result, SagaError};
use crate::integration::OutgoingIntegrationEvent;
use crate::outbox::DEFAULT_MAX_RETRIES;
use crate::ports::{MessagePublisher, OutboxRepository, TransactionManager, UnitOfWork};

#[derive(Debug, Clone)]
pub struct OutboxRelayConfig {
    /// Entries claimed per drain.
    pub batch_size: usize,
    /// Entries that failed this many times are skipped.
    pub max_retries: u32,
}

impl Default for OutboxRelayConfig {
    fn default() -> Self {
        Self {
            batch_size: 100,
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }
}

/// Result of one drain.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainReport {
    pub published: usize,
    pub failed: usize,
}

/// Publishes outbox entries and records the outcome of each attempt.
///
/// Delivery is at-least-once: an entry published just before a crash is
/// published again on the next drain.
pub struct OutboxRelay<T: TransactionManager, P: MessagePublisher> {
    transactions: T,
    publisher: P,
    clock: Arc<dyn Clock>,
    config: OutboxRelayConfig,
}

impl<T: TransactionManager, P: MessagePublisher> OutboxRelay<T, P> {
    pub fn new(transactions: T, publisher: P, config: OutboxRelayConfig) -> Self {
        Self {
            transactions,
            publisher,
            clock: Arc::new(SystemClock),
            config,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn publisher(&self) -> &P {
        &self.publisher
    }

    /// Claims one batch of pending entries, publishes them and commits the
    /// outcome. A publish failure bumps the entry's retry count; it does not
    /// abort the batch.
    #[tracing::instrument(skip(self))]
    pub async fn drain_once(&self) -> Result<DrainReport> {
        let mut uow = self.transactions.begin().await?;
        let entries = uow
            .get_pending(self.config.batch_size, self.config.max_retries)
            .await?;

        let mut report = DrainReport::default();
        for entry in &entries {
            match self.publisher.publish(&entry.message()).await {
                Ok(()) => {
                    uow.mark_as_processed(entry.event_id, self.clock.now())
                        .await?;
                    metrics::counter!("outbox_published_total").increment(1);
                    report.published += 1;
                }
                Err(err) => {
                    tracing::warn!(
                        event_id = %entry.event_id,
                        routing_key = %entry.routing_key,
                        retry_count = entry.retry_count + 1,
                        error = %err,
                        "outbox publish failed"
                    );
                    uow.increment_retry(entry.event_id, Some(&err.to_string()))
                        .await?;
                    metrics::counter!("outbox_publish_failures_total").increment(1);
                    report.failed += 1;
                }
            }
        }
        uow.commit().await?;

        if !entries.is_empty() {
            tracing::debug!(
                published = report.published,
                failed = report.failed,
                "outbox drained"
            );
        }
        Ok(report)
    }

    /// Drains every `interval` until `shutdown` turns true or its sender drops.
    pub async fn run(&self, interval: Duration, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(err) = self.drain_once().await {
                        tracing::error!(error = %err, retryable = err.is_retryable(), "outbox drain failed");
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        tracing::info!("outbox relay stopped");
    }
}

/// Publisher that keeps messages in memory, for tests and local runs.
#[derive(Debug, Clone, Default)]
pub struct InMemoryPublisher {
    published: Arc<Mutex<Vec<OutgoingIntegrationEvent>>>,
    failing: Arc<AtomicBool>,
}

impl InMemoryPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every following publish fail until reset.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub async fn published(&self) -> Vec<OutgoingIntegrationEvent> {
        self.published.lock().await.clone()
    }
}

#[async_trait]
impl MessagePublisher for InMemoryPublisher {
    async fn publish(&self, message: &OutgoingIntegrationEvent) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(SagaError::Publish(format!(
                "broker unavailable for {}",
                message.routing_key
            )));
        }
        tracing::debug!(
            exchange = %message.exchange,
            routing_key = %message.routing_key,
            event_id = %message.event_id,
            "message published"
        );
        self.published.lock().await.push(message.clone());
        Ok(())
    }
}

#[async_trait]
impl<P: MessagePublisher + ?Sized> MessagePublisher for Arc<P> {
    async fn publish(&self, message: &OutgoingIntegrationEvent) -> Result<()> {
        (**self).publish(message).await
    }
}
