//! Integration tests for the Order aggregate against the event log.
//!
//! These cover envelope building, decoding stored history, and the
//! optimistic-concurrency guarantees the saga relies on.

use domain::{
    Aggregate, CORRELATION_ID_KEY, CancellationReason, CustomerId, DomainEvent, InventoryStatus,
    Money, Order, OrderEvent, OrderItem, OrderStatus, PaymentStatus, build_envelopes,
    decode_event,
};
use event_store::{
    AppendOptions, EventEnvelope, EventStore, EventStoreError, InMemoryEventStore, Version,
};

fn create_order() -> Order {
    Order::create(
        CustomerId::new(),
        vec![OrderItem::new("SKU-001", 2, Money::from_cents(1000))],
    )
    .unwrap()
}

async fn persist(store: &InMemoryEventStore, order: &mut Order, expected: Version) -> Version {
    let envelopes = build_envelopes(order, expected, Some("corr-1")).unwrap();
    let version = store
        .append(envelopes, AppendOptions::expect_version(expected))
        .await
        .unwrap();
    order.clear_pending_events();
    version
}

mod persistence {
    use super::*;

    #[tokio::test]
    async fn envelopes_continue_the_stream() {
        let store = InMemoryEventStore::new();
        let mut order = create_order();

        let version = persist(&store, &mut order, Version::initial()).await;
        assert_eq!(version, Version::first());

        order.mark_inventory_reservation_completed();
        order.mark_payment_deduction_completed();
        order.confirm().unwrap();
        let version = persist(&store, &mut order, version).await;
        assert_eq!(version, Version::new(4));

        let stored = store.get_events_for_aggregate(order.id()).await.unwrap();
        let types: Vec<_> = stored.iter().map(|e| e.event_type.as_str()).collect();
        assert_eq!(
            types,
            vec![
                "ORDER_CREATED",
                "ORDER_INVENTORY_RESERVATION_COMPLETED",
                "ORDER_PAYMENT_DEDUCTION_COMPLETED",
                "ORDER_CONFIRMED",
            ]
        );
        assert!(stored.iter().all(|e| e.aggregate_type == "Order"));
        assert!(
            stored
                .iter()
                .all(|e| e.metadata_str(CORRELATION_ID_KEY) == Some("corr-1"))
        );
    }

    #[tokio::test]
    async fn stored_history_decodes_back_to_events() {
        let store = InMemoryEventStore::new();
        let mut order = create_order();
        order.mark_payment_verification_failed(CancellationReason::InsufficientFunds);
        order
            .cancel(PaymentStatus::Rejected, InventoryStatus::Pending)
            .unwrap();
        let emitted = order.pending_events().to_vec();
        persist(&store, &mut order, Version::initial()).await;

        let stored = store.get_events_for_aggregate(order.id()).await.unwrap();
        let decoded: Vec<OrderEvent> = stored
            .iter()
            .map(|envelope| decode_event::<OrderEvent>(envelope).unwrap().unwrap())
            .collect();
        assert_eq!(decoded, emitted);
        assert_eq!(stored[0].timestamp, emitted[0].occurred_at());
    }

    #[tokio::test]
    async fn unknown_event_types_decode_to_none() {
        let envelope = EventEnvelope::builder()
            .aggregate_id(common::AggregateId::new())
            .aggregate_type("Order")
            .event_type("ORDER_GIFT_WRAPPED")
            .version(Version::first())
            .payload_raw(serde_json::json!({"type": "ORDER_GIFT_WRAPPED", "data": {}}))
            .build()
            .unwrap();

        assert!(decode_event::<OrderEvent>(&envelope).unwrap().is_none());
    }
}

mod concurrency {
    use super::*;

    #[tokio::test]
    async fn duplicate_append_with_stale_version_keeps_first_batch_only() {
        let store = InMemoryEventStore::new();
        let mut order = create_order();
        persist(&store, &mut order, Version::initial()).await;

        order.mark_inventory_reservation_completed();
        let stale = Version::first();

        let first = build_envelopes(&order, stale, None).unwrap();
        store
            .append(first, AppendOptions::expect_version(stale))
            .await
            .unwrap();

        // Buffer was never cleared, so the same events are offered again.
        let second = build_envelopes(&order, stale, None).unwrap();
        let result = store
            .append(second, AppendOptions::expect_version(stale))
            .await;
        assert!(matches!(
            result,
            Err(EventStoreError::ConcurrencyConflict { .. })
        ));

        let stored = store.get_events_for_aggregate(order.id()).await.unwrap();
        let versions: Vec<_> = stored.iter().map(|e| e.version.as_i64()).collect();
        assert_eq!(versions, vec![1, 2]);
    }

    #[tokio::test]
    async fn two_writers_from_the_same_snapshot_admit_one() {
        let store = InMemoryEventStore::new();
        let mut order = create_order();
        let version = persist(&store, &mut order, Version::initial()).await;

        let mut confirming = order.clone();
        confirming.confirm().unwrap();
        let mut cancelling = order.clone();
        cancelling
            .cancel(PaymentStatus::Rejected, InventoryStatus::Unavailable)
            .unwrap();

        let a = store.append(
            build_envelopes(&confirming, version, None).unwrap(),
            AppendOptions::expect_version(version),
        );
        let b = store.append(
            build_envelopes(&cancelling, version, None).unwrap(),
            AppendOptions::expect_version(version),
        );
        let (a, b) = tokio::join!(a, b);
        assert!(a.is_ok() ^ b.is_ok());

        let stored = store.get_events_for_aggregate(order.id()).await.unwrap();
        assert_eq!(stored.len(), 2);
        assert_eq!(stored[1].version, Version::new(2));
    }
}

mod lifecycle {
    use super::*;

    #[test]
    fn compensation_runs_to_compensated() {
        let mut order = create_order();
        order.mark_inventory_reservation_completed();
        order.mark_payment_verification_failed(CancellationReason::PaymentDeclined);
        order
            .cancel(PaymentStatus::Rejected, InventoryStatus::Reserved)
            .unwrap();
        assert_eq!(order.status(), OrderStatus::CompensationPending);

        order.mark_inventory_rollback_completed();
        order.complete_compensation().unwrap();
        assert_eq!(order.status(), OrderStatus::Compensated);
        assert!(order.status().is_terminal());
        assert!(order.complete_compensation().is_ok());
        assert!(order.confirm().is_err());
    }
}
