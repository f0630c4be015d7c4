//! HTTP adapter for the order fulfillment saga.
//!
//! Exposes order use cases and the collaborator notification intake, with
//! structured logging (tracing) and Prometheus metrics. The outbox relay and
//! the timeout sweep run next to the server as background tasks.

pub mod config;
pub mod error;
pub mod publisher;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use metrics_exporter_prometheus::PrometheusHandle;
use saga::{
    DefaultIntegrationEventMapper, IntegrationEventMapper, MessagePublisher, OrderProcessManager,
    OrderService, OutboxRelay, SystemClock, TransactionManager,
};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use config::Config;

/// Shared application state accessible from all handlers.
pub struct AppState<T: TransactionManager> {
    pub service: OrderService<T>,
    pub manager: Arc<OrderProcessManager<T>>,
}

impl<T: TransactionManager + Clone> AppState<T> {
    /// Wires the order service and process manager over one store.
    pub fn new(store: T, config: &Config) -> Self {
        let mapper: Arc<dyn IntegrationEventMapper> = Arc::new(DefaultIntegrationEventMapper);
        let clock = Arc::new(SystemClock);

        let manager = OrderProcessManager::new(
            store.clone(),
            mapper.clone(),
            clock.clone(),
            config.saga_config(),
        );
        let service = OrderService::new(store, mapper, clock);

        Self {
            service,
            manager: Arc::new(manager),
        }
    }
}

/// Creates the Axum application router with all routes and shared state.
pub fn create_app<T: TransactionManager + 'static>(
    state: Arc<AppState<T>>,
    metrics_handle: PrometheusHandle,
) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::get))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check))
        .route("/orders", post(routes::orders::create::<T>))
        .route("/orders/{id}", get(routes::orders::get::<T>))
        .route("/orders/{id}/events", get(routes::orders::events::<T>))
        .route("/orders/{id}/state", get(routes::orders::order_state::<T>))
        .route("/orders/{id}/complete", post(routes::orders::complete::<T>))
        .route("/notifications", post(routes::notifications::receive::<T>))
        .with_state(state)
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}

/// Starts the outbox relay and the timeout sweep. Both stop once `shutdown`
/// flips to true.
pub fn spawn_background_tasks<T, P>(
    store: T,
    manager: Arc<OrderProcessManager<T>>,
    publisher: P,
    config: &Config,
    shutdown: watch::Receiver<bool>,
) -> Vec<JoinHandle<()>>
where
    T: TransactionManager + 'static,
    P: MessagePublisher + 'static,
{
    let relay = OutboxRelay::new(store, publisher, config.relay_config());
    let poll_interval = config.outbox_poll_interval;
    let relay_shutdown = shutdown.clone();
    let relay_task = tokio::spawn(async move { relay.run(poll_interval, relay_shutdown).await });

    let sweep_interval = config.sweep_interval;
    let sweep_task =
        tokio::spawn(async move { manager.run_timeout_sweep(sweep_interval, shutdown).await });

    vec![relay_task, sweep_task]
}
