//! The aggregate-agnostic storage contract every backend implements.
//!
//! An [`AggregateRecorder`] knows nothing about events, topics, or
//! transcoding — it stores and retrieves opaque `(aggregate_id, version,
//! topic, state)` rows, uniqueness on `(aggregate_id, version)` is the only
//! invariant it owns. [`crate::event_store::EventStore`] layers the codec
//! and the domain event type on top.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::RecorderError;

/// One stored row: an aggregate's version, the topic of the event or
/// snapshot it carries, and its mapped (serialized/compressed/encrypted)
/// bytes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StoredRecord {
    /// The aggregate this record belongs to.
    pub aggregate_id: Uuid,
    /// The version this record represents.
    pub version: u64,
    /// The stable topic naming the event or snapshot class.
    pub topic: String,
    /// The mapped bytes produced by a [`crate::mapper::Mapper`].
    pub state: Vec<u8>,
}

/// Bounds for [`AggregateRecorder::select`], mirroring the original
/// recorder's `gt`/`lte`/`desc`/`limit` query surface.
#[derive(Debug, Clone, Copy, Default)]
pub struct SelectRange {
    /// Only return records with `version > gt`.
    pub gt: Option<u64>,
    /// Only return records with `version <= lte`.
    pub lte: Option<u64>,
    /// Return records in descending version order.
    pub desc: bool,
    /// Cap the number of records returned.
    pub limit: Option<usize>,
}

/// Stores and retrieves the versioned records of one or more aggregates.
///
/// # Invariants
/// - `(aggregate_id, version)` is unique across the lifetime of the
///   recorder; inserting a record that collides with an existing one fails
///   the whole batch with [`RecorderError::Integrity`] and commits none of
///   it.
/// - `select` returns records ordered by `version`, ascending unless
///   `desc` is set.
#[async_trait]
pub trait AggregateRecorder: Send + Sync {
    /// Inserts `records` as a single atomic batch.
    ///
    /// # Errors
    /// Returns [`RecorderError::Integrity`] if any record's
    /// `(aggregate_id, version)` already exists, in which case none of the
    /// batch is committed. Returns [`RecorderError::Operational`] for any
    /// other storage failure.
    async fn insert(&self, records: Vec<StoredRecord>) -> Result<(), RecorderError>;

    /// Returns the records for `aggregate_id` matching `range`.
    ///
    /// # Errors
    /// Returns [`RecorderError::Operational`] on storage failure. An
    /// aggregate with no records returns an empty vector, not an error.
    async fn select(&self, aggregate_id: Uuid, range: SelectRange) -> Result<Vec<StoredRecord>, RecorderError>;

    /// Returns the highest version recorded for `aggregate_id`, or `None`
    /// if it has no records.
    ///
    /// # Errors
    /// Returns [`RecorderError::Operational`] on storage failure.
    async fn max_version(&self, aggregate_id: Uuid) -> Result<Option<u64>, RecorderError> {
        let latest = self
            .select(aggregate_id, SelectRange { desc: true, limit: Some(1), ..SelectRange::default() })
            .await?;
        Ok(latest.first().map(|r| r.version))
    }
}
