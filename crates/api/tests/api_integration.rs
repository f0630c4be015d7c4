//! Integration tests for the API server.

use std::sync::{Arc, OnceLock};

use api::AppState;
use api::config::Config;
use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use metrics_exporter_prometheus::PrometheusHandle;
use saga::{InMemoryPublisher, InMemoryStore, OutboxRelay, OutboxRelayConfig};
use serde_json::{Value, json};
use tower::ServiceExt;

static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

fn get_metrics_handle() -> PrometheusHandle {
    METRICS_HANDLE
        .get_or_init(|| {
            metrics_exporter_prometheus::PrometheusBuilder::new()
                .install_recorder()
                .expect("failed to install Prometheus recorder")
        })
        .clone()
}

fn setup() -> (Router, InMemoryStore) {
    let store = InMemoryStore::new();
    let state = Arc::new(AppState::new(store.clone(), &Config::default()));
    (create_app(state), store)
}

fn create_app(state: Arc<AppState<InMemoryStore>>) -> Router {
    api::create_app(state, get_metrics_handle())
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = if body.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&body).unwrap_or(Value::Null)
    };
    (status, json)
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn post_empty(uri: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

async fn create_order(app: &Router) -> String {
    let (status, body) = send(
        app,
        post_json(
            "/orders",
            json!({
                "items": [
                    {"productId": "SKU-001", "quantity": 2, "unitPrice": 1500},
                    {"productId": "SKU-002", "quantity": 1, "unitPrice": 4000}
                ]
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    body["id"].as_str().unwrap().to_string()
}

async fn notify(app: &Router, event_type: &str, order_id: &str, reason: Option<&str>) -> Value {
    let mut payload = json!({"orderId": order_id});
    if let Some(reason) = reason {
        payload["reason"] = json!(reason);
    }
    let (status, body) = send(
        app,
        post_json(
            "/notifications",
            json!({"eventType": event_type, "payload": payload, "correlationId": "corr-http"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "notification rejected: {body}");
    body
}

#[tokio::test]
async fn test_health_check() {
    let (app, _) = setup();

    let (status, body) = send(&app, get("/health")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["service"], "order-service");
}

#[tokio::test]
async fn test_create_and_get_order() {
    let (app, _) = setup();
    let order_id = create_order(&app).await;

    let (status, body) = send(&app, get(&format!("/orders/{order_id}"))).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "PENDING");
    assert_eq!(body["totalAmount"], 7000);
    assert_eq!(body["currency"], "COP");
    assert_eq!(body["items"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn test_create_order_writes_correlated_outbox_entry() {
    let (app, store) = setup();

    let request = Request::builder()
        .method("POST")
        .uri("/orders")
        .header("content-type", "application/json")
        .header("x-correlation-id", "checkout-42")
        .body(Body::from(
            json!({"items": [{"productId": "SKU-9", "quantity": 1, "unitPrice": 100}]})
                .to_string(),
        ))
        .unwrap();
    let (status, _) = send(&app, request).await;
    assert_eq!(status, StatusCode::CREATED);

    let outbox = store.outbox_entries().await;
    assert_eq!(outbox.len(), 1);
    assert_eq!(outbox[0].routing_key, "status.created");
    assert_eq!(outbox[0].correlation_id.as_deref(), Some("checkout-42"));
}

#[tokio::test]
async fn test_create_order_validation() {
    let (app, _) = setup();

    let (status, body) = send(&app, post_json("/orders", json!({"items": []}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("no items"));

    let (status, _) = send(
        &app,
        post_json(
            "/orders",
            json!({"items": [{"productId": "SKU-1", "quantity": 0, "unitPrice": 100}]}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(
        &app,
        post_json(
            "/orders",
            json!({
                "customerId": "not-a-uuid",
                "items": [{"productId": "SKU-1", "quantity": 1, "unitPrice": 100}]
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_create_order_rejects_overflowing_total() {
    let (app, store) = setup();

    let (status, body) = send(
        &app,
        post_json(
            "/orders",
            json!({"items": [{"productId": "SKU-1", "quantity": 2, "unitPrice": i64::MAX / 2 + 1}]}),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("exceeds"));
    assert!(store.outbox_entries().await.is_empty());
}

#[tokio::test]
async fn test_rollback_confirmation_for_pending_order_conflicts() {
    let (app, store) = setup();
    let order_id = create_order(&app).await;

    let (status, _) = send(
        &app,
        post_json(
            "/notifications",
            json!({"eventType": "INVENTORY_ROLLBACK_COMPLETED", "payload": {"orderId": order_id}}),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(store.outbox_entries().await.len(), 1);
}

#[tokio::test]
async fn test_get_nonexistent_order() {
    let (app, _) = setup();
    let missing = uuid::Uuid::new_v4();

    let (status, _) = send(&app, get(&format!("/orders/{missing}"))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(&app, get(&format!("/orders/{missing}/events"))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_invalid_order_id_format() {
    let (app, _) = setup();

    let (status, body) = send(&app, get("/orders/not-a-uuid")).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("Invalid order id"));
}

#[tokio::test]
async fn test_saga_happy_path_over_http() {
    let (app, _) = setup();
    let order_id = create_order(&app).await;

    let body = notify(&app, "INVENTORY_RESERVATION_COMPLETED", &order_id, None).await;
    assert_eq!(body["status"], "PENDING");

    let body = notify(&app, "PAYMENT_DEDUCTION_COMPLETED", &order_id, None).await;
    assert_eq!(body["status"], "CONFIRMED");
    assert_eq!(body["timedOut"], false);

    let (status, state) = send(&app, get(&format!("/orders/{order_id}/state"))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(state["payment"], "approved");
    assert_eq!(state["inventory"], "reserved");
    assert_eq!(state["hasPending"], false);

    let (status, order) = send(&app, post_empty(&format!("/orders/{order_id}/complete"))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(order["status"], "COMPLETED");

    let (status, events) = send(&app, get(&format!("/orders/{order_id}/events"))).await;
    assert_eq!(status, StatusCode::OK);
    let types: Vec<&str> = events
        .as_array()
        .unwrap()
        .iter()
        .map(|e| e["eventType"].as_str().unwrap())
        .collect();
    assert_eq!(
        types,
        [
            "ORDER_CREATED",
            "ORDER_INVENTORY_RESERVATION_COMPLETED",
            "ORDER_PAYMENT_DEDUCTION_COMPLETED",
            "ORDER_CONFIRMED",
            "ORDER_COMPLETED"
        ]
    );
    assert_eq!(events[4]["version"], 5);
}

#[tokio::test]
async fn test_payment_failure_compensates_over_http() {
    let (app, store) = setup();
    let order_id = create_order(&app).await;

    notify(&app, "INVENTORY_RESERVATION_COMPLETED", &order_id, None).await;
    let body = notify(
        &app,
        "PAYMENT_DEDUCTION_FAILED",
        &order_id,
        Some("INSUFFICIENT_FUNDS"),
    )
    .await;
    assert_eq!(body["status"], "COMPENSATION_PENDING");

    let body = notify(&app, "INVENTORY_ROLLBACK_COMPLETED", &order_id, None).await;
    assert_eq!(body["status"], "COMPENSATED");

    let (_, order) = send(&app, get(&format!("/orders/{order_id}"))).await;
    assert_eq!(order["cancellationReasons"], json!(["INSUFFICIENT_FUNDS"]));

    let publisher = InMemoryPublisher::new();
    let relay = OutboxRelay::new(store, publisher.clone(), OutboxRelayConfig::default());
    relay.drain_once().await.unwrap();
    let routing_keys: Vec<String> = publisher
        .published()
        .await
        .into_iter()
        .map(|m| m.routing_key)
        .collect();
    assert!(routing_keys.contains(&"inventory.rollback".to_string()));
    assert!(routing_keys.contains(&"status.cancelled".to_string()));
    assert!(!routing_keys.contains(&"payment.rollback".to_string()));
}

#[tokio::test]
async fn test_notification_errors() {
    let (app, _) = setup();
    let order_id = create_order(&app).await;

    let (status, _) = send(
        &app,
        post_json(
            "/notifications",
            json!({"eventType": "SHIPMENT_DISPATCHED", "payload": {"orderId": order_id}}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

    let (status, _) = send(
        &app,
        post_json(
            "/notifications",
            json!({"eventType": "PAYMENT_DEDUCTION_COMPLETED", "payload": {}}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(
        &app,
        post_json(
            "/notifications",
            json!({
                "eventType": "PAYMENT_DEDUCTION_COMPLETED",
                "payload": {"orderId": uuid::Uuid::new_v4().to_string()}
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_completing_pending_order_conflicts() {
    let (app, _) = setup();
    let order_id = create_order(&app).await;

    let (status, _) = send(&app, post_empty(&format!("/orders/{order_id}/complete"))).await;

    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_metrics_endpoint() {
    let (app, _) = setup();
    let order_id = create_order(&app).await;
    notify(&app, "INVENTORY_RESERVATION_COMPLETED", &order_id, None).await;

    let response = app.clone().oneshot(get("/metrics")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let text = String::from_utf8(body.to_vec()).unwrap();
    assert!(text.contains("saga_events_handled_total"));
}
