//! Persistent recorders backed by PostgreSQL via `sqlx`.
//!
//! Compiled with the `postgres-storage` feature.
#![allow(clippy::missing_errors_doc)]

use sqlx::PgPool;
use tracing::instrument;
use uuid::Uuid;

use crate::error::RecorderError;
use crate::store::notification::{ApplicationRecorder, Notification};
use crate::store::recorder::{AggregateRecorder, SelectRange, StoredRecord};

fn to_recorder_error(e: sqlx::Error) -> RecorderError {
    if let sqlx::Error::Database(db_err) = &e {
        if db_err.is_unique_violation() {
            return RecorderError::Integrity;
        }
    }
    RecorderError::Operational(e.to_string())
}

/// A `sqlx`-backed [`AggregateRecorder`] over a single table.
///
/// Generalized beyond the primary event stream so the same type backs both
/// the event table and a parallel snapshot table, each with its own
/// `(aggregate_id, version)` primary key.
#[derive(Debug, Clone)]
pub struct SqlxAggregateRecorder {
    pool: PgPool,
    table: &'static str,
}

impl SqlxAggregateRecorder {
    /// Creates a recorder over `table`, which must already exist (see
    /// [`Self::setup`]).
    #[must_use]
    pub fn new(pool: PgPool, table: &'static str) -> Self {
        Self { pool, table }
    }

    /// Creates `table` if it does not already exist.
    #[instrument(skip(self))]
    pub async fn setup(&self) -> sqlx::Result<()> {
        let statement = format!(
            r"CREATE TABLE IF NOT EXISTS {table} (
                aggregate_id UUID NOT NULL,
                version BIGINT NOT NULL,
                topic TEXT NOT NULL,
                state BYTEA NOT NULL,
                recorded_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                PRIMARY KEY (aggregate_id, version)
            );",
            table = self.table
        );
        sqlx::query(&statement).execute(&self.pool).await?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl AggregateRecorder for SqlxAggregateRecorder {
    #[instrument(skip(self, records))]
    async fn insert(&self, records: Vec<StoredRecord>) -> Result<(), RecorderError> {
        if records.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool.begin().await.map_err(to_recorder_error)?;

        // Explicit pre-check in addition to the primary key: turns a
        // would-be constraint violation into the same `Integrity` error
        // before any row of the batch is written, so a failed batch never
        // partially commits.
        let aggregate_ids: Vec<Uuid> = records.iter().map(|r| r.aggregate_id).collect();
        let versions: Vec<i64> = records.iter().map(|r| r.version as i64).collect();
        let exists_check = format!(
            "SELECT EXISTS (
                SELECT 1 FROM {table} AS t
                JOIN UNNEST($1::UUID[], $2::BIGINT[]) AS x(aggregate_id, version)
                    ON t.aggregate_id = x.aggregate_id AND t.version = x.version
            )",
            table = self.table
        );
        let already_exists: bool = sqlx::query_scalar(&exists_check)
            .bind(&aggregate_ids)
            .bind(&versions)
            .fetch_one(&mut *tx)
            .await
            .map_err(to_recorder_error)?;
        if already_exists {
            return Err(RecorderError::Integrity);
        }

        let topics: Vec<String> = records.iter().map(|r| r.topic.clone()).collect();
        let states: Vec<Vec<u8>> = records.iter().map(|r| r.state.clone()).collect();
        let insert = format!(
            r"INSERT INTO {table} (aggregate_id, version, topic, state)
              SELECT * FROM UNNEST($1::UUID[], $2::BIGINT[], $3::TEXT[], $4::BYTEA[])",
            table = self.table
        );
        sqlx::query(&insert)
            .bind(&aggregate_ids)
            .bind(&versions)
            .bind(&topics)
            .bind(&states)
            .execute(&mut *tx)
            .await
            .map_err(to_recorder_error)?;

        tx.commit().await.map_err(to_recorder_error)
    }

    #[instrument(skip(self))]
    async fn select(&self, aggregate_id: Uuid, range: SelectRange) -> Result<Vec<StoredRecord>, RecorderError> {
        let order = if range.desc { "DESC" } else { "ASC" };
        let query = format!(
            r"SELECT aggregate_id, version, topic, state FROM {table}
              WHERE aggregate_id = $1
                AND ($2::BIGINT IS NULL OR version > $2)
                AND ($3::BIGINT IS NULL OR version <= $3)
              ORDER BY version {order}
              LIMIT $4",
            table = self.table,
            order = order
        );
        let limit: i64 = range.limit.map_or(i64::MAX, |l| l as i64);
        let rows: Vec<(Uuid, i64, String, Vec<u8>)> = sqlx::query_as(&query)
            .bind(aggregate_id)
            .bind(range.gt.map(|v| v as i64))
            .bind(range.lte.map(|v| v as i64))
            .bind(limit)
            .fetch_all(&self.pool)
            .await
            .map_err(to_recorder_error)?;

        Ok(rows
            .into_iter()
            .map(|(aggregate_id, version, topic, state)| StoredRecord { aggregate_id, version: version as u64, topic, state })
            .collect())
    }
}

/// The `sqlx`-backed [`ApplicationRecorder`] for the primary event stream,
/// widening the table with an identity column that gives every insert a
/// dense, monotone notification id.
#[derive(Debug, Clone)]
pub struct SqlxApplicationRecorder {
    pool: PgPool,
}

impl SqlxApplicationRecorder {
    /// Creates a recorder over the `events` table.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Creates the `events` table if it does not already exist.
    #[instrument(skip(self))]
    pub async fn setup(&self) -> sqlx::Result<()> {
        sqlx::query(
            r"CREATE TABLE IF NOT EXISTS events (
                aggregate_id UUID NOT NULL,
                version BIGINT NOT NULL,
                topic TEXT NOT NULL,
                state BYTEA NOT NULL,
                notification_id BIGINT GENERATED ALWAYS AS IDENTITY,
                recorded_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                PRIMARY KEY (aggregate_id, version)
            );",
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl AggregateRecorder for SqlxApplicationRecorder {
    #[instrument(skip(self, records))]
    async fn insert(&self, records: Vec<StoredRecord>) -> Result<(), RecorderError> {
        if records.is_empty() {
            return Ok(());
        }
        let mut tx = self.pool.begin().await.map_err(to_recorder_error)?;

        let aggregate_ids: Vec<Uuid> = records.iter().map(|r| r.aggregate_id).collect();
        let versions: Vec<i64> = records.iter().map(|r| r.version as i64).collect();
        let already_exists: bool = sqlx::query_scalar(
            "SELECT EXISTS (
                SELECT 1 FROM events AS t
                JOIN UNNEST($1::UUID[], $2::BIGINT[]) AS x(aggregate_id, version)
                    ON t.aggregate_id = x.aggregate_id AND t.version = x.version
            )",
        )
        .bind(&aggregate_ids)
        .bind(&versions)
        .fetch_one(&mut *tx)
        .await
        .map_err(to_recorder_error)?;
        if already_exists {
            return Err(RecorderError::Integrity);
        }

        let topics: Vec<String> = records.iter().map(|r| r.topic.clone()).collect();
        let states: Vec<Vec<u8>> = records.iter().map(|r| r.state.clone()).collect();
        sqlx::query(
            r"INSERT INTO events (aggregate_id, version, topic, state)
              SELECT * FROM UNNEST($1::UUID[], $2::BIGINT[], $3::TEXT[], $4::BYTEA[])",
        )
        .bind(&aggregate_ids)
        .bind(&versions)
        .bind(&topics)
        .bind(&states)
        .execute(&mut *tx)
        .await
        .map_err(to_recorder_error)?;

        tx.commit().await.map_err(to_recorder_error)
    }

    #[instrument(skip(self))]
    async fn select(&self, aggregate_id: Uuid, range: SelectRange) -> Result<Vec<StoredRecord>, RecorderError> {
        let order = if range.desc { "DESC" } else { "ASC" };
        let query = format!(
            r"SELECT aggregate_id, version, topic, state FROM events
              WHERE aggregate_id = $1
                AND ($2::BIGINT IS NULL OR version > $2)
                AND ($3::BIGINT IS NULL OR version <= $3)
              ORDER BY version {order}
              LIMIT $4"
        );
        let limit: i64 = range.limit.map_or(i64::MAX, |l| l as i64);
        let rows: Vec<(Uuid, i64, String, Vec<u8>)> = sqlx::query_as(&query)
            .bind(aggregate_id)
            .bind(range.gt.map(|v| v as i64))
            .bind(range.lte.map(|v| v as i64))
            .bind(limit)
            .fetch_all(&self.pool)
            .await
            .map_err(to_recorder_error)?;

        Ok(rows
            .into_iter()
            .map(|(aggregate_id, version, topic, state)| StoredRecord { aggregate_id, version: version as u64, topic, state })
            .collect())
    }
}

#[async_trait::async_trait]
impl ApplicationRecorder for SqlxApplicationRecorder {
    #[instrument(skip(self))]
    async fn select_notifications(&self, start: u64, limit: usize) -> Result<Vec<Notification>, RecorderError> {
        let rows: Vec<(i64, Uuid, i64, String, Vec<u8>)> = sqlx::query_as(
            r"SELECT notification_id, aggregate_id, version, topic, state FROM events
              WHERE notification_id >= $1
              ORDER BY notification_id
              LIMIT $2",
        )
        .bind(start as i64)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(to_recorder_error)?;

        Ok(rows
            .into_iter()
            .map(|(id, aggregate_id, version, topic, state)| Notification {
                id: id as u64,
                aggregate_id,
                version: version as u64,
                topic,
                state,
            })
            .collect())
    }

    #[instrument(skip(self))]
    async fn max_notification_id(&self) -> Result<Option<u64>, RecorderError> {
        let max: Option<i64> = sqlx::query_scalar("SELECT MAX(notification_id) FROM events")
            .fetch_one(&self.pool)
            .await
            .map_err(to_recorder_error)?;
        Ok(max.map(|v| v as u64))
    }
}
