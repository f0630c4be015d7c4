//! Integration tests for the process manager, order service and outbox
//! relay over the in-memory store.

use std::sync::Arc;

use chrono::Duration;
use common::AggregateId;
use domain::{
    CancellationReason, CustomerId, InventoryStatus, Money, Order, OrderError, OrderItem,
    OrderStatus, PaymentStatus,
};
use event_store::{EventEnvelope, Version};
use saga::{
    DefaultIntegrationEventMapper, ErrorKind, InMemoryPublisher, InMemoryStore,
    IncomingIntegrationEvent, ManualClock, OrderProcessManager, OrderRepository, OrderService,
    OutboxRelay, OutboxRelayConfig, SagaConfig, SagaError, TransactionManager, UnitOfWork,
};
use serde_json::json;

struct TestHarness {
    store: InMemoryStore,
    clock: ManualClock,
    manager: OrderProcessManager<InMemoryStore>,
    service: OrderService<InMemoryStore>,
}

impl TestHarness {
    fn new() -> Self {
        let store = InMemoryStore::new();
        let clock = ManualClock::default();
        let mapper = Arc::new(DefaultIntegrationEventMapper);

        let manager = OrderProcessManager::new(
            store.clone(),
            mapper.clone(),
            Arc::new(clock.clone()),
            SagaConfig::default(),
        );
        let service = OrderService::new(store.clone(), mapper, Arc::new(clock.clone()));

        Self {
            store,
            clock,
            manager,
            service,
        }
    }

    async fn place_order(&self) -> AggregateId {
        self.service
            .create_order(
                CustomerId::new(),
                vec![
                    OrderItem::new("SKU-001", 2, Money::from_cents(1500)),
                    OrderItem::new("SKU-002", 1, Money::from_cents(4000)),
                ],
                Some("corr-1"),
            )
            .await
            .unwrap()
            .id
    }

    async fn notify(&self, event_type: &str, order_id: AggregateId) -> saga::Result<OrderStatus> {
        self.notify_with(event_type, json!({"orderId": order_id.to_string()}))
            .await
    }

    async fn notify_with(
        &self,
        event_type: &str,
        payload: serde_json::Value,
    ) -> saga::Result<OrderStatus> {
        let notification =
            IncomingIntegrationEvent::new(event_type, payload).with_correlation_id("corr-1");
        self.manager
            .handle(&notification)
            .await
            .map(|outcome| outcome.status)
    }

    async fn event_types(&self, order_id: AggregateId) -> Vec<String> {
        self.store
            .events_for(order_id)
            .await
            .into_iter()
            .map(|e| e.event_type)
            .collect()
    }

    async fn routing_keys(&self) -> Vec<String> {
        self.store
            .outbox_entries()
            .await
            .into_iter()
            .map(|e| e.routing_key)
            .collect()
    }

    async fn cancelled_reasons(&self, order_id: AggregateId) -> serde_json::Value {
        let events: Vec<EventEnvelope> = self.store.events_for(order_id).await;
        events
            .iter()
            .find(|e| e.event_type == "ORDER_CANCELLED")
            .map(|e| e.payload["data"]["reasons"].clone())
            .unwrap_or_default()
    }
}

mod creation {
    use super::*;

    #[tokio::test]
    async fn create_order_writes_snapshot_event_and_outbox() {
        let h = TestHarness::new();
        let order_id = h.place_order().await;

        let events = h.store.events_for(order_id).await;
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type, "ORDER_CREATED");
        assert_eq!(events[0].version, Version::first());

        let snapshot = h.store.order_snapshot(order_id).await.unwrap();
        assert_eq!(snapshot.status, OrderStatus::Pending);
        assert_eq!(snapshot.total_amount, Money::from_cents(7000));
        assert_eq!(snapshot.currency, "COP");

        let outbox = h.store.outbox_entries().await;
        assert_eq!(outbox.len(), 1);
        assert_eq!(outbox[0].routing_key, "status.created");
        assert_eq!(outbox[0].correlation_id.as_deref(), Some("corr-1"));
    }

    #[tokio::test]
    async fn invalid_items_are_rejected_without_writes() {
        let h = TestHarness::new();
        let result = h
            .service
            .create_order(
                CustomerId::new(),
                vec![OrderItem::new("SKU-001", 0, Money::from_cents(100))],
                None,
            )
            .await;

        let err = result.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvariantViolation);
        assert!(h.store.outbox_entries().await.is_empty());
    }
}

mod happy_path {
    use super::*;

    #[tokio::test]
    async fn both_successes_confirm_the_order() {
        let h = TestHarness::new();
        let order_id = h.place_order().await;

        let status = h
            .notify("INVENTORY_RESERVATION_COMPLETED", order_id)
            .await
            .unwrap();
        assert_eq!(status, OrderStatus::Pending);

        let status = h
            .notify("PAYMENT_DEDUCTION_COMPLETED", order_id)
            .await
            .unwrap();
        assert_eq!(status, OrderStatus::Confirmed);

        let types = h.event_types(order_id).await;
        assert_eq!(
            types.iter().filter(|t| *t == "ORDER_CONFIRMED").count(),
            1
        );
        assert!(!types.iter().any(|t| t == "ORDER_CANCELLED"));

        let keys = h.routing_keys().await;
        assert!(keys.contains(&"status.confirmed".to_string()));
        assert!(!keys.iter().any(|k| k.ends_with(".rollback")));

        let state = h.service.get_order_state(order_id).await.unwrap();
        assert_eq!(state.status, OrderStatus::Confirmed);
        assert_eq!(state.version, Version::new(4));
        assert!(!state.has_pending);

        let completed = h.service.complete_order(order_id).await.unwrap();
        assert_eq!(completed.status, OrderStatus::Completed);
        assert!(h.routing_keys().await.contains(&"status.completed".to_string()));
    }

    #[tokio::test]
    async fn concurrent_outcomes_for_one_order_serialize() {
        let h = TestHarness::new();
        let order_id = h.place_order().await;

        let (inventory, payment) = tokio::join!(
            h.notify("INVENTORY_RESERVATION_COMPLETED", order_id),
            h.notify("PAYMENT_DEDUCTION_COMPLETED", order_id),
        );
        inventory.unwrap();
        payment.unwrap();

        let events = h.store.events_for(order_id).await;
        let versions: Vec<_> = events.iter().map(|e| e.version.as_i64()).collect();
        assert_eq!(versions, vec![1, 2, 3, 4]);
        assert_eq!(events[3].event_type, "ORDER_CONFIRMED");
    }

    #[tokio::test]
    async fn completing_a_pending_order_is_rejected() {
        let h = TestHarness::new();
        let order_id = h.place_order().await;

        let err = h.service.complete_order(order_id).await.unwrap_err();
        assert!(matches!(err, SagaError::Order(_)));
        assert!(!err.is_retryable());
        assert_eq!(h.event_types(order_id).await, vec!["ORDER_CREATED"]);
    }
}

mod compensation {
    use super::*;

    #[tokio::test]
    async fn payment_failure_after_reservation_rolls_back_inventory() {
        let h = TestHarness::new();
        let order_id = h.place_order().await;

        h.notify("INVENTORY_RESERVATION_COMPLETED", order_id)
            .await
            .unwrap();
        let status = h
            .notify_with(
                "PAYMENT_DEDUCTION_FAILED",
                json!({"orderId": order_id.to_string(), "reason": "INSUFFICIENT_FUNDS"}),
            )
            .await
            .unwrap();
        assert_eq!(status, OrderStatus::CompensationPending);

        let types = h.event_types(order_id).await;
        assert_eq!(
            &types[2..],
            &[
                "ORDER_PAYMENT_VERIFICATION_FAILED",
                "ORDER_CANCELLED",
                "ORDER_COMPENSATION_STARTED",
                "ORDER_INVENTORY_ROLLBACK_REQUESTED",
            ]
        );
        assert_eq!(h.cancelled_reasons(order_id).await, json!(["INSUFFICIENT_FUNDS"]));

        let keys = h.routing_keys().await;
        assert!(keys.contains(&"inventory.rollback".to_string()));
        assert!(!keys.contains(&"payment.rollback".to_string()));

        let status = h
            .notify("INVENTORY_ROLLBACK_COMPLETED", order_id)
            .await
            .unwrap();
        assert_eq!(status, OrderStatus::Compensated);
        assert_eq!(
            h.store.order_snapshot(order_id).await.unwrap().status,
            OrderStatus::Compensated
        );
    }

    #[tokio::test]
    async fn inventory_failure_after_payment_refunds() {
        let h = TestHarness::new();
        let order_id = h.place_order().await;

        h.notify("PAYMENT_DEDUCTION_COMPLETED", order_id)
            .await
            .unwrap();
        h.notify_with(
            "INVENTORY_RESERVATION_FAILED",
            json!({"orderId": order_id.to_string(), "error": "out_of_stock"}),
        )
        .await
        .unwrap();

        let state = h.service.get_order_state(order_id).await.unwrap();
        assert_eq!(state.status, OrderStatus::CompensationPending);
        assert_eq!(
            state.inventory_reason,
            Some(CancellationReason::InventoryUnavailable)
        );
        assert!(h.routing_keys().await.contains(&"payment.rollback".to_string()));

        let status = h
            .notify("PAYMENT_ROLLBACK_COMPLETED", order_id)
            .await
            .unwrap();
        assert_eq!(status, OrderStatus::Compensated);
    }

    #[tokio::test]
    async fn both_failures_cancel_without_compensation() {
        let h = TestHarness::new();
        let order_id = h.place_order().await;

        h.notify_with(
            "PAYMENT_DEDUCTION_FAILED",
            json!({"orderId": order_id.to_string(), "reason": "something odd"}),
        )
        .await
        .unwrap();
        let status = h
            .notify("INVENTORY_RESERVATION_FAILED", order_id)
            .await
            .unwrap();
        assert_eq!(status, OrderStatus::Cancelled);
        assert_eq!(h.cancelled_reasons(order_id).await, json!(["SYSTEM_ERROR"]));
        assert!(
            !h.event_types(order_id)
                .await
                .contains(&"ORDER_COMPENSATION_STARTED".to_string())
        );
    }
}

mod timeout {
    use super::*;

    #[tokio::test]
    async fn sweep_forces_missing_payment_to_rejected() {
        let h = TestHarness::new();
        let order_id = h.place_order().await;
        h.notify("INVENTORY_RESERVATION_COMPLETED", order_id)
            .await
            .unwrap();

        assert_eq!(h.manager.expire_stale_orders(100).await.unwrap(), 0);

        h.clock.advance(Duration::seconds(61));
        assert_eq!(h.manager.expire_stale_orders(100).await.unwrap(), 1);

        let state = h.service.get_order_state(order_id).await.unwrap();
        assert_eq!(state.payment, PaymentStatus::Rejected);
        assert_eq!(state.payment_reason, Some(CancellationReason::Timeout));
        assert_eq!(state.status, OrderStatus::CompensationPending);
        assert_eq!(h.cancelled_reasons(order_id).await, json!(["TIMEOUT"]));

        // Already resolved orders are left alone by later sweeps.
        assert_eq!(h.manager.expire_stale_orders(100).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn late_notification_evaluates_the_timeout_first() {
        let h = TestHarness::new();
        let order_id = h.place_order().await;

        h.clock.advance(Duration::seconds(90));
        let status = h
            .notify("PAYMENT_DEDUCTION_COMPLETED", order_id)
            .await
            .unwrap();

        // Payment arrived, inventory never did: refund what was taken.
        assert_eq!(status, OrderStatus::CompensationPending);
        let state = h.service.get_order_state(order_id).await.unwrap();
        assert_eq!(state.payment, PaymentStatus::Approved);
        assert_eq!(state.inventory, InventoryStatus::Unavailable);
        assert!(h.routing_keys().await.contains(&"payment.rollback".to_string()));
    }

    #[tokio::test]
    async fn pending_window_is_measured_on_the_injected_clock() {
        let h = TestHarness::new();
        let start = chrono::DateTime::from_timestamp(1_600_000_000, 0).unwrap();
        h.clock.set(start);
        let order_id = h.place_order().await;

        let snapshot = h.store.order_snapshot(order_id).await.unwrap();
        assert_eq!(snapshot.created_at, start);
        let state = h.service.get_order_state(order_id).await.unwrap();
        assert_eq!(state.created_at, start);

        h.clock.advance(Duration::seconds(59));
        assert_eq!(h.manager.expire_stale_orders(100).await.unwrap(), 0);

        h.clock.advance(Duration::seconds(1));
        assert_eq!(h.manager.expire_stale_orders(100).await.unwrap(), 1);
        assert_eq!(
            h.store.order_snapshot(order_id).await.unwrap().status,
            OrderStatus::Cancelled
        );
    }
}

mod failures {
    use super::*;

    #[tokio::test]
    async fn unknown_order_is_not_found() {
        let h = TestHarness::new();
        let err = h
            .notify("PAYMENT_DEDUCTION_COMPLETED", AggregateId::new())
            .await
            .unwrap_err();
        assert!(matches!(err, SagaError::OrderNotFound(_)));
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn order_without_history_has_no_state() {
        let h = TestHarness::new();
        let order = Order::create(
            CustomerId::new(),
            vec![OrderItem::new("SKU-001", 1, Money::from_cents(100))],
        )
        .unwrap();
        let mut uow = h.store.begin().await.unwrap();
        OrderRepository::save(&mut uow, &order).await.unwrap();
        uow.commit().await.unwrap();

        let err = h
            .notify("INVENTORY_RESERVATION_COMPLETED", domain::Aggregate::id(&order))
            .await
            .unwrap_err();
        assert!(matches!(err, SagaError::NoStateFound(_)));
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn unsupported_event_types_are_not_retryable() {
        let h = TestHarness::new();
        let order_id = h.place_order().await;
        let err = h.notify("SHIPMENT_DISPATCHED", order_id).await.unwrap_err();
        assert!(matches!(err, SagaError::UnsupportedEvent(_)));
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn late_failure_for_completed_order_changes_nothing_but_the_log() {
        let h = TestHarness::new();
        let order_id = h.place_order().await;
        h.notify("INVENTORY_RESERVATION_COMPLETED", order_id)
            .await
            .unwrap();
        h.notify("PAYMENT_DEDUCTION_COMPLETED", order_id)
            .await
            .unwrap();
        h.service.complete_order(order_id).await.unwrap();

        let status = h
            .notify("PAYMENT_DEDUCTION_FAILED", order_id)
            .await
            .unwrap();
        assert_eq!(status, OrderStatus::Completed);
        assert_eq!(
            h.event_types(order_id).await.last().map(String::as_str),
            Some("ORDER_PAYMENT_VERIFICATION_FAILED")
        );
    }

    #[tokio::test]
    async fn invalid_transition_writes_nothing() {
        let h = TestHarness::new();
        let order_id = h.place_order().await;
        h.notify("PAYMENT_DEDUCTION_FAILED", order_id).await.unwrap();
        h.notify("INVENTORY_RESERVATION_FAILED", order_id)
            .await
            .unwrap();
        let before = h.store.events_for(order_id).await.len();
        let outbox_before = h.store.outbox_entries().await.len();

        let err = h.service.complete_order(order_id).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvariantViolation);
        assert_eq!(h.store.events_for(order_id).await.len(), before);
        assert_eq!(h.store.outbox_entries().await.len(), outbox_before);
    }

    #[tokio::test]
    async fn rollback_completion_without_compensation_is_rejected() {
        let h = TestHarness::new();
        let order_id = h.place_order().await;

        for event_type in ["INVENTORY_ROLLBACK_COMPLETED", "PAYMENT_ROLLBACK_COMPLETED"] {
            let err = h.notify(event_type, order_id).await.unwrap_err();
            assert!(matches!(
                err,
                SagaError::Order(OrderError::InvalidTransition {
                    from: OrderStatus::Pending,
                    to: OrderStatus::Compensated,
                })
            ));
            assert_eq!(err.kind(), ErrorKind::InvariantViolation);
            assert!(!err.is_retryable());
        }
        assert_eq!(h.event_types(order_id).await, ["ORDER_CREATED"]);
        assert_eq!(h.store.outbox_entries().await.len(), 1);

        h.notify("INVENTORY_RESERVATION_COMPLETED", order_id)
            .await
            .unwrap();
        h.notify("PAYMENT_DEDUCTION_COMPLETED", order_id)
            .await
            .unwrap();
        let before = h.event_types(order_id).await;

        let err = h
            .notify("PAYMENT_ROLLBACK_COMPLETED", order_id)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            SagaError::Order(OrderError::InvalidTransition {
                from: OrderStatus::Confirmed,
                ..
            })
        ));
        assert_eq!(h.event_types(order_id).await, before);
        assert_eq!(
            h.store.order_snapshot(order_id).await.unwrap().status,
            OrderStatus::Confirmed
        );
    }
}

mod relay {
    use super::*;

    fn relay(h: &TestHarness, max_retries: u32) -> OutboxRelay<InMemoryStore, InMemoryPublisher> {
        OutboxRelay::new(
            h.store.clone(),
            InMemoryPublisher::new(),
            OutboxRelayConfig {
                batch_size: 10,
                max_retries,
            },
        )
        .with_clock(Arc::new(h.clock.clone()))
    }

    #[tokio::test]
    async fn drain_publishes_each_entry_once() {
        let h = TestHarness::new();
        h.place_order().await;
        h.place_order().await;
        let relay = relay(&h, 5);

        let report = relay.drain_once().await.unwrap();
        assert_eq!(report.published, 2);
        assert_eq!(relay.drain_once().await.unwrap().published, 0);

        let published = relay.publisher().published().await;
        assert_eq!(published.len(), 2);
        assert!(published.iter().all(|m| m.exchange == "order_events"));
        assert!(
            h.store
                .outbox_entries()
                .await
                .iter()
                .all(|e| e.processed_at.is_some())
        );
    }

    #[tokio::test]
    async fn failures_are_retried_then_parked() {
        let h = TestHarness::new();
        h.place_order().await;
        let relay = relay(&h, 2);
        relay.publisher().set_failing(true);

        assert_eq!(relay.drain_once().await.unwrap().failed, 1);
        assert_eq!(relay.drain_once().await.unwrap().failed, 1);
        assert_eq!(relay.drain_once().await.unwrap(), Default::default());

        let entry = &h.store.outbox_entries().await[0];
        assert_eq!(entry.retry_count, 2);
        assert!(entry.is_parked(2));
        assert!(entry.error.as_deref().unwrap().contains("broker unavailable"));

        relay.publisher().set_failing(false);
        assert_eq!(relay.drain_once().await.unwrap().published, 0);
    }
}
