//! In-memory recorders, useful for tests and single-process applications.

use std::sync::Mutex;

use async_trait::async_trait;
use dashmap::DashMap;
use std::collections::BTreeMap;
use uuid::Uuid;

use crate::error::RecorderError;
use crate::store::notification::{ApplicationRecorder, Notification};
use crate::store::recorder::{AggregateRecorder, SelectRange, StoredRecord};

/// A thread-safe, process-local [`AggregateRecorder`].
///
/// Records are kept in a [`BTreeMap`] per aggregate so range scans
/// (`gt`/`lte`/`desc`/`limit`) come for free from the map's ordering,
/// rather than re-deriving an index alongside a flat vector.
///
/// `insert_lock` serializes the whole check-then-write: a batch can touch
/// several aggregates' streams, each behind its own `DashMap` shard lock,
/// so checking uniqueness and writing under separate shard acquisitions
/// would let two concurrent batches both pass the check and have the
/// second silently clobber the first. One lock spanning both steps is what
/// actually makes `(aggregate_id, version)` uniqueness hold.
#[derive(Default)]
pub struct InMemoryAggregateRecorder {
    streams: DashMap<Uuid, BTreeMap<u64, StoredRecord>>,
    insert_lock: Mutex<()>,
}

impl InMemoryAggregateRecorder {
    /// Creates an empty recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AggregateRecorder for InMemoryAggregateRecorder {
    async fn insert(&self, records: Vec<StoredRecord>) -> Result<(), RecorderError> {
        if records.is_empty() {
            return Ok(());
        }
        let _guard = self.insert_lock.lock().expect("insert lock poisoned");
        for record in &records {
            if let Some(stream) = self.streams.get(&record.aggregate_id) {
                if stream.contains_key(&record.version) {
                    return Err(RecorderError::Integrity);
                }
            }
        }
        for record in records {
            self.streams
                .entry(record.aggregate_id)
                .or_default()
                .insert(record.version, record);
        }
        Ok(())
    }

    async fn select(&self, aggregate_id: Uuid, range: SelectRange) -> Result<Vec<StoredRecord>, RecorderError> {
        let Some(stream) = self.streams.get(&aggregate_id) else {
            return Ok(Vec::new());
        };
        let lower = range.gt.map_or(u64::MIN, |gt| gt + 1);
        let upper = range.lte.unwrap_or(u64::MAX);
        let mut records: Vec<StoredRecord> = stream.range(lower..=upper).map(|(_, r)| r.clone()).collect();
        if range.desc {
            records.reverse();
        }
        if let Some(limit) = range.limit {
            records.truncate(limit);
        }
        Ok(records)
    }
}

/// An [`ApplicationRecorder`] that additionally assigns a dense, monotone
/// notification id to every inserted record, held under one lock shared
/// with the per-aggregate map so the assignment is part of the same atomic
/// unit as the insert.
#[derive(Default)]
pub struct InMemoryApplicationRecorder {
    inner: InMemoryAggregateRecorder,
    notifications: Mutex<Vec<Notification>>,
}

impl InMemoryApplicationRecorder {
    /// Creates an empty recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AggregateRecorder for InMemoryApplicationRecorder {
    async fn insert(&self, records: Vec<StoredRecord>) -> Result<(), RecorderError> {
        if records.is_empty() {
            return Ok(());
        }
        let mut notifications = self.notifications.lock().expect("notification lock poisoned");
        for record in &records {
            if let Some(stream) = self.inner.streams.get(&record.aggregate_id) {
                if stream.contains_key(&record.version) {
                    return Err(RecorderError::Integrity);
                }
            }
        }
        let mut next_id = notifications.len() as u64 + 1;
        for record in records {
            notifications.push(Notification {
                id: next_id,
                aggregate_id: record.aggregate_id,
                version: record.version,
                topic: record.topic.clone(),
                state: record.state.clone(),
            });
            next_id += 1;
            self.inner
                .streams
                .entry(record.aggregate_id)
                .or_default()
                .insert(record.version, record);
        }
        Ok(())
    }

    async fn select(&self, aggregate_id: Uuid, range: SelectRange) -> Result<Vec<StoredRecord>, RecorderError> {
        self.inner.select(aggregate_id, range).await
    }
}

#[async_trait]
impl ApplicationRecorder for InMemoryApplicationRecorder {
    async fn select_notifications(
        &self,
        start: u64,
        limit: usize,
    ) -> Result<Vec<Notification>, RecorderError> {
        let notifications = self.notifications.lock().expect("notification lock poisoned");
        Ok(notifications
            .iter()
            .filter(|n| n.id >= start)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn max_notification_id(&self) -> Result<Option<u64>, RecorderError> {
        let notifications = self.notifications.lock().expect("notification lock poisoned");
        Ok(notifications.last().map(|n| n.id))
    }
}
