//! PostgreSQL storage adapter.
//!
//! A unit of work is one `sqlx` transaction. Orders are read with
//! `FOR UPDATE`, so handlers for the same order queue behind each other;
//! outbox claims use `FOR UPDATE SKIP LOCKED`, so concurrent relays never
//! publish the same entry in parallel.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::AggregateId;
use domain::{
    Aggregate, CancellationReason, CustomerId, Order, OrderItem, OrderSnapshot, OrderStatus,
};
use event_store::{AppendOptions, EventEnvelope, EventStoreError, Version, postgres};
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::types::Json;
use sqlx::{FromRow, Postgres, Transaction};
use uuid::Uuid;

use crate::error::Result;
use crate::outbox::OutboxEntry;
use crate::ports::{
    EventRepository, OrderRepository, OutboxRepository, TransactionManager, UnitOfWork,
};

const SELECT_ORDER: &str = r#"
    SELECT id, customer_id, status, currency, total_amount, items, cancellation_reasons,
           created_at, updated_at
    FROM orders
"#;

const SELECT_OUTBOX: &str = r#"
    SELECT event_id, event_type, payload, correlation_id, version, occurred_at, exchange,
           routing_key, source, retry_count, error, created_at, processed_at
    FROM outbox_events
"#;

#[derive(FromRow)]
struct OrderRow {
    id: Uuid,
    customer_id: Uuid,
    status: String,
    currency: String,
    total_amount: i64,
    items: Json<Vec<OrderItem>>,
    cancellation_reasons: Json<Vec<CancellationReason>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<OrderRow> for OrderSnapshot {
    type Error = crate::SagaError;

    fn try_from(row: OrderRow) -> Result<Self> {
        Ok(OrderSnapshot {
            id: AggregateId::from_uuid(row.id),
            customer_id: CustomerId::from_uuid(row.customer_id),
            items: row.items.0,
            status: row.status.parse()?,
            currency: row.currency,
            cancellation_reasons: row.cancellation_reasons.0,
            total_amount: domain::Money::from_cents(row.total_amount),
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(FromRow)]
struct OutboxRow {
    event_id: Uuid,
    event_type: String,
    payload: serde_json::Value,
    correlation_id: Option<String>,
    version: String,
    occurred_at: DateTime<Utc>,
    exchange: String,
    routing_key: String,
    source: String,
    retry_count: i32,
    error: Option<String>,
    created_at: DateTime<Utc>,
    processed_at: Option<DateTime<Utc>>,
}

impl From<OutboxRow> for OutboxEntry {
    fn from(row: OutboxRow) -> Self {
        Self {
            event_id: row.event_id,
            event_type: row.event_type,
            payload: row.payload,
            correlation_id: row.correlation_id,
            version: row.version,
            occurred_at: row.occurred_at,
            exchange: row.exchange,
            routing_key: row.routing_key,
            source: row.source,
            retry_count: u32::try_from(row.retry_count).unwrap_or_default(),
            error: row.error,
            created_at: row.created_at,
            processed_at: row.processed_at,
        }
    }
}

/// Transaction manager over a PostgreSQL pool.
#[derive(Debug, Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await?;
        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Applies the embedded migrations in `migrations/`.
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("../../migrations")
            .run(&self.pool)
            .await
            .map_err(EventStoreError::from)?;
        Ok(())
    }
}

#[async_trait]
impl TransactionManager for PostgresStore {
    type UnitOfWork = PgUnitOfWork;

    async fn begin(&self) -> Result<PgUnitOfWork> {
        Ok(PgUnitOfWork {
            tx: self.pool.begin().await?,
        })
    }
}

/// One open transaction. Dropping it rolls back.
pub struct PgUnitOfWork {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl EventRepository for PgUnitOfWork {
    async fn append(&mut self, events: Vec<EventEnvelope>, expected: Version) -> Result<Version> {
        Ok(postgres::append_events(
            &mut self.tx,
            &events,
            AppendOptions::expect_version(expected),
        )
        .await?)
    }

    async fn get_by_aggregate_id(&mut self, id: AggregateId) -> Result<Vec<EventEnvelope>> {
        Ok(postgres::load_events(&mut self.tx, id).await?)
    }

    async fn get_last_event(&mut self, id: AggregateId) -> Result<Option<EventEnvelope>> {
        Ok(postgres::load_last_event(&mut self.tx, id).await?)
    }
}

#[async_trait]
impl OrderRepository for PgUnitOfWork {
    async fn find_by_id(&mut self, id: AggregateId) -> Result<Option<Order>> {
        let row: Option<OrderRow> =
            sqlx::query_as(&format!("{SELECT_ORDER} WHERE id = $1 FOR UPDATE"))
                .bind(id.as_uuid())
                .fetch_optional(&mut *self.tx)
                .await?;

        row.map(|row| OrderSnapshot::try_from(row).map(Order::restore))
            .transpose()
    }

    async fn save(&mut self, order: &Order) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO orders (id, customer_id, status, currency, total_amount, items,
                                cancellation_reasons, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(order.id().as_uuid())
        .bind(order.customer_id().as_uuid())
        .bind(order.status().as_str())
        .bind(order.currency())
        .bind(order.total_amount().cents())
        .bind(Json(order.items()))
        .bind(Json(order.cancellation_reasons()))
        .bind(order.created_at())
        .bind(order.updated_at())
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn update(&mut self, order: &Order) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE orders
            SET status = $2, cancellation_reasons = $3, updated_at = $4
            WHERE id = $1
            "#,
        )
        .bind(order.id().as_uuid())
        .bind(order.status().as_str())
        .bind(Json(order.cancellation_reasons()))
        .bind(order.updated_at())
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn find_ids_by_status(
        &mut self,
        status: OrderStatus,
        limit: usize,
    ) -> Result<Vec<AggregateId>> {
        let ids: Vec<Uuid> = sqlx::query_scalar(
            "SELECT id FROM orders WHERE status = $1 ORDER BY created_at ASC LIMIT $2",
        )
        .bind(status.as_str())
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&mut *self.tx)
        .await?;
        Ok(ids.into_iter().map(AggregateId::from_uuid).collect())
    }
}

#[async_trait]
impl OutboxRepository for PgUnitOfWork {
    async fn save(&mut self, entry: &OutboxEntry) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO outbox_events (event_id, event_type, payload, correlation_id, version,
                                       occurred_at, exchange, routing_key, source, retry_count,
                                       error, created_at, processed_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            ON CONFLICT (event_id) DO NOTHING
            "#,
        )
        .bind(entry.event_id)
        .bind(&entry.event_type)
        .bind(&entry.payload)
        .bind(entry.correlation_id.as_deref())
        .bind(&entry.version)
        .bind(entry.occurred_at)
        .bind(&entry.exchange)
        .bind(&entry.routing_key)
        .bind(&entry.source)
        .bind(i32::try_from(entry.retry_count).unwrap_or(i32::MAX))
        .bind(entry.error.as_deref())
        .bind(entry.created_at)
        .bind(entry.processed_at)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn get_pending(&mut self, limit: usize, max_retries: u32) -> Result<Vec<OutboxEntry>> {
        let rows: Vec<OutboxRow> = sqlx::query_as(&format!(
            r#"{SELECT_OUTBOX}
            WHERE processed_at IS NULL AND retry_count < $1
            ORDER BY created_at ASC
            LIMIT $2
            FOR UPDATE SKIP LOCKED"#
        ))
        .bind(i32::try_from(max_retries).unwrap_or(i32::MAX))
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&mut *self.tx)
        .await?;
        Ok(rows.into_iter().map(OutboxEntry::from).collect())
    }

    async fn mark_as_processed(&mut self, event_id: Uuid, at: DateTime<Utc>) -> Result<()> {
        sqlx::query("UPDATE outbox_events SET processed_at = $2 WHERE event_id = $1")
            .bind(event_id)
            .bind(at)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn increment_retry(&mut self, event_id: Uuid, error: Option<&str>) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE outbox_events
            SET retry_count = retry_count + 1, error = COALESCE($2, error)
            WHERE event_id = $1
            "#,
        )
        .bind(event_id)
        .bind(error)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl UnitOfWork for PgUnitOfWork {
    async fn commit(self) -> Result<()> {
        self.tx.commit().await?;
        Ok(())
    }
}
