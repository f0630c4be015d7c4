use std::collections::HashMap;

use async_trait::async_trait;
use sqlx::{PgConnection, PgPool, Row, postgres::PgRow};
use uuid::Uuid;

use crate::{
    AggregateId, EventEnvelope, EventId, EventStoreError, Result, Version,
    store::{AppendOptions, EventStore, check_append},
};

const SELECT_EVENTS: &str = r#"
    SELECT id, event_type, aggregate_id, aggregate_type, version, timestamp, payload, metadata
    FROM events
"#;

/// PostgreSQL-backed event log over the `events` table.
#[derive(Clone)]
pub struct PostgresEventStore {
    pool: PgPool,
}

impl PostgresEventStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn row_to_event(row: PgRow) -> Result<EventEnvelope> {
    let metadata_json: serde_json::Value = row.try_get("metadata")?;
    let metadata: HashMap<String, serde_json::Value> = serde_json::from_value(metadata_json)?;

    Ok(EventEnvelope {
        event_id: EventId::from_uuid(row.try_get::<Uuid, _>("id")?),
        event_type: row.try_get("event_type")?,
        aggregate_id: AggregateId::from_uuid(row.try_get::<Uuid, _>("aggregate_id")?),
        aggregate_type: row.try_get("aggregate_type")?,
        version: Version::new(row.try_get("version")?),
        timestamp: row.try_get("timestamp")?,
        payload: row.try_get("payload")?,
        metadata,
    })
}

/// Reads the current version of an aggregate on `conn`.
pub async fn current_version(conn: &mut PgConnection, aggregate_id: AggregateId) -> Result<Version> {
    let version: Option<i64> =
        sqlx::query_scalar("SELECT MAX(version) FROM events WHERE aggregate_id = $1")
            .bind(aggregate_id.as_uuid())
            .fetch_one(&mut *conn)
            .await?;
    Ok(version.map(Version::new).unwrap_or_default())
}

/// Appends a batch on `conn` without opening or committing a transaction.
///
/// The caller owns the transaction. Two writers that both pass the version
/// check still collide on the `unique_aggregate_version` constraint, which
/// is reported as `ConcurrencyConflict`.
pub async fn append_events(
    conn: &mut PgConnection,
    events: &[EventEnvelope],
    options: AppendOptions,
) -> Result<Version> {
    let Some(aggregate_id) = events.first().map(|event| event.aggregate_id) else {
        return check_append(Version::initial(), events, options);
    };

    let current = current_version(conn, aggregate_id).await?;
    let new_version = check_append(current, events, options).inspect_err(|err| {
        if err.is_concurrency_conflict() {
            metrics::counter!("event_store_conflicts_total").increment(1);
        }
    })?;

    for event in events {
        let metadata_json = serde_json::to_value(&event.metadata)?;

        sqlx::query(
            r#"
            INSERT INTO events (id, event_type, aggregate_id, aggregate_type, version, timestamp, payload, metadata)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(event.event_id.as_uuid())
        .bind(&event.event_type)
        .bind(event.aggregate_id.as_uuid())
        .bind(&event.aggregate_type)
        .bind(event.version.as_i64())
        .bind(event.timestamp)
        .bind(&event.payload)
        .bind(metadata_json)
        .execute(&mut *conn)
        .await
        .map_err(|e| {
            if let sqlx::Error::Database(ref db_err) = e
                && db_err.constraint() == Some("unique_aggregate_version")
            {
                metrics::counter!("event_store_conflicts_total").increment(1);
                return EventStoreError::ConcurrencyConflict {
                    aggregate_id,
                    expected: options.expected_version.unwrap_or(current),
                    actual: event.version,
                };
            }
            EventStoreError::Database(e)
        })?;
    }

    metrics::counter!("event_store_appends_total").increment(events.len() as u64);
    tracing::debug!(%aggregate_id, version = %new_version, count = events.len(), "events appended");
    Ok(new_version)
}

/// Loads the full history of an aggregate on `conn`.
pub async fn load_events(
    conn: &mut PgConnection,
    aggregate_id: AggregateId,
) -> Result<Vec<EventEnvelope>> {
    let rows = sqlx::query(&format!(
        "{SELECT_EVENTS} WHERE aggregate_id = $1 ORDER BY version ASC"
    ))
    .bind(aggregate_id.as_uuid())
    .fetch_all(&mut *conn)
    .await?;

    rows.into_iter().map(row_to_event).collect()
}

/// Loads the highest-versioned event of an aggregate on `conn`.
pub async fn load_last_event(
    conn: &mut PgConnection,
    aggregate_id: AggregateId,
) -> Result<Option<EventEnvelope>> {
    let row = sqlx::query(&format!(
        "{SELECT_EVENTS} WHERE aggregate_id = $1 ORDER BY version DESC LIMIT 1"
    ))
    .bind(aggregate_id.as_uuid())
    .fetch_optional(&mut *conn)
    .await?;

    row.map(row_to_event).transpose()
}

#[async_trait]
impl EventStore for PostgresEventStore {
    #[tracing::instrument(skip(self, events), fields(count = events.len()))]
    async fn append(&self, events: Vec<EventEnvelope>, options: AppendOptions) -> Result<Version> {
        let mut tx = self.pool.begin().await?;
        let version = append_events(&mut tx, &events, options).await?;
        tx.commit().await?;
        Ok(version)
    }

    async fn get_events_for_aggregate(
        &self,
        aggregate_id: AggregateId,
    ) -> Result<Vec<EventEnvelope>> {
        let mut conn = self.pool.acquire().await?;
        load_events(&mut conn, aggregate_id).await
    }

    async fn get_last_event(&self, aggregate_id: AggregateId) -> Result<Option<EventEnvelope>> {
        let mut conn = self.pool.acquire().await?;
        load_last_event(&mut conn, aggregate_id).await
    }

    async fn get_aggregate_version(&self, aggregate_id: AggregateId) -> Result<Option<Version>> {
        let mut conn = self.pool.acquire().await?;
        let version = current_version(&mut conn, aggregate_id).await?;
        Ok((!version.is_initial()).then_some(version))
    }
}
