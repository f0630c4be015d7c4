//! The persistence step shared by every state-changing operation.

use chrono::{DateTime, Utc};
use domain::{Aggregate, Order, build_envelopes};
use event_store::Version;

use crate::error::Result;
use crate::integration::IntegrationEventMapper;
use crate::outbox::OutboxEntry;
use crate::ports::{EventRepository, OrderRepository, OutboxRepository, UnitOfWork};

/// Appends the order's buffered events on top of `expected`, refreshes its
/// snapshot, stages the mapped outbox entries and drains the buffer.
///
/// Nothing is visible until the caller commits `uow`. Returns the version
/// after the append, or `expected` when there was nothing to write.
pub(crate) async fn persist_order<U: UnitOfWork>(
    uow: &mut U,
    order: &mut Order,
    expected: Version,
    correlation_id: Option<&str>,
    mapper: &dyn IntegrationEventMapper,
    now: DateTime<Utc>,
) -> Result<Version> {
    if order.pending_events().is_empty() {
        return Ok(expected);
    }

    let envelopes = build_envelopes(order, expected, correlation_id)?;
    let version = EventRepository::append(uow, envelopes, expected).await?;

    if order.was_updated() {
        OrderRepository::update(uow, order).await?;
        order.mark_saved();
    }

    let mut entries = Vec::new();
    for event in order.pending_events() {
        if let Some(message) = mapper.map(event, correlation_id)? {
            entries.push(OutboxEntry::new(message, now));
        }
    }
    if !entries.is_empty() {
        OutboxRepository::save_many(uow, &entries).await?;
    }

    tracing::debug!(
        order_id = %order.id(),
        %version,
        outbox = entries.len(),
        "order persisted"
    );
    order.clear_pending_events();
    Ok(version)
}
