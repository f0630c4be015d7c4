use common::AggregateId;
use criterion::{Criterion, criterion_group, criterion_main};
use event_store::{AppendOptions, EventEnvelope, EventStore, InMemoryEventStore, Version};

fn make_event(aggregate_id: AggregateId, version: i64) -> EventEnvelope {
    EventEnvelope::builder()
        .aggregate_id(aggregate_id)
        .aggregate_type("Order")
        .event_type("ORDER_INVENTORY_RESERVATION_COMPLETED")
        .version(Version::new(version))
        .payload_raw(serde_json::json!({
            "type": "ORDER_INVENTORY_RESERVATION_COMPLETED",
            "data": { "orderId": aggregate_id.to_string() }
        }))
        .build()
        .unwrap()
}

fn bench_append_with_version_check(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();

    c.bench_function("event_store/append_expect_new", |b| {
        b.iter(|| {
            rt.block_on(async {
                let store = InMemoryEventStore::new();
                let agg_id = AggregateId::new();
                store
                    .append(vec![make_event(agg_id, 1)], AppendOptions::expect_new())
                    .await
                    .unwrap();
            });
        });
    });
}

fn bench_append_batch_10(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();

    c.bench_function("event_store/append_batch_10", |b| {
        b.iter(|| {
            rt.block_on(async {
                let store = InMemoryEventStore::new();
                let agg_id = AggregateId::new();
                let events: Vec<EventEnvelope> = (1..=10).map(|v| make_event(agg_id, v)).collect();
                store.append(events, AppendOptions::expect_new()).await.unwrap();
            });
        });
    });
}

fn bench_load_history_and_last_event(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let store = InMemoryEventStore::new();
    let agg_id = AggregateId::new();

    rt.block_on(async {
        let events: Vec<EventEnvelope> = (1..=100).map(|v| make_event(agg_id, v)).collect();
        store.append(events, AppendOptions::new()).await.unwrap();
    });

    c.bench_function("event_store/get_events_100", |b| {
        b.iter(|| {
            rt.block_on(async {
                store.get_events_for_aggregate(agg_id).await.unwrap();
            });
        });
    });

    c.bench_function("event_store/get_last_event_of_100", |b| {
        b.iter(|| {
            rt.block_on(async {
                store.get_last_event(agg_id).await.unwrap();
            });
        });
    });
}

criterion_group!(
    benches,
    bench_append_with_version_check,
    bench_append_batch_10,
    bench_load_history_and_last_event,
);
criterion_main!(benches);
