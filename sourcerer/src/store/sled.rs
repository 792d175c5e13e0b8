//! Persistent recorders backed by `sled`.

use std::collections::HashMap;

use async_trait::async_trait;
use sled::transaction::{ConflictableTransactionError, TransactionError, Transactional};
use tracing::instrument;
use uuid::Uuid;

use crate::error::RecorderError;
use crate::store::notification::{ApplicationRecorder, Notification};
use crate::store::recorder::{AggregateRecorder, SelectRange, StoredRecord};

/// Width of the zero-padded version segment in a key, wide enough that
/// lexicographic and numeric ordering agree for any `u64` version.
const VERSION_WIDTH: usize = 20;

fn record_key(aggregate_id: Uuid, version: u64) -> String {
    format!("{aggregate_id}/{version:0width$}", width = VERSION_WIDTH)
}

fn topic_key(aggregate_id: Uuid, version: u64) -> String {
    format!("{}/topic", record_key(aggregate_id, version))
}

fn group_by_aggregate(records: Vec<StoredRecord>) -> HashMap<Uuid, Vec<StoredRecord>> {
    let mut grouped: HashMap<Uuid, Vec<StoredRecord>> = HashMap::new();
    for record in records {
        grouped.entry(record.aggregate_id).or_default().push(record);
    }
    grouped
}

/// Aborts a sled transaction either because a version already exists, or
/// because encoding a notification failed.
#[derive(Debug)]
enum Abort {
    Duplicate,
    Serialize(String),
}

fn map_transaction_error(err: TransactionError<Abort>) -> RecorderError {
    match err {
        TransactionError::Abort(Abort::Duplicate) => RecorderError::Integrity,
        TransactionError::Abort(Abort::Serialize(msg)) => RecorderError::Operational(msg),
        TransactionError::Storage(err) => RecorderError::Operational(err.to_string()),
    }
}

/// A persistent, thread-safe [`AggregateRecorder`] using one `sled::Tree`
/// per aggregate, keyed by a zero-padded version so range scans stay in
/// version order regardless of digit count.
#[derive(Clone)]
pub struct SledAggregateRecorder {
    db: sled::Db,
}

impl SledAggregateRecorder {
    /// Opens a recorder over `db`.
    #[must_use]
    pub fn new(db: sled::Db) -> Self {
        Self { db }
    }

    fn tree(&self, aggregate_id: Uuid) -> Result<sled::Tree, RecorderError> {
        self.db
            .open_tree(aggregate_id.as_bytes())
            .map_err(|e| RecorderError::Operational(e.to_string()))
    }
}

#[async_trait]
impl AggregateRecorder for SledAggregateRecorder {
    #[instrument(skip(self, records))]
    async fn insert(&self, records: Vec<StoredRecord>) -> Result<(), RecorderError> {
        for (aggregate_id, group) in group_by_aggregate(records) {
            let tree = self.tree(aggregate_id)?;
            tree.transaction(|tx| {
                for record in &group {
                    let key = record_key(record.aggregate_id, record.version);
                    if tx.get(key.as_bytes())?.is_some() {
                        return Err(ConflictableTransactionError::Abort(Abort::Duplicate));
                    }
                    tx.insert(key.as_bytes(), record.state.as_slice())?;
                    tx.insert(topic_key(record.aggregate_id, record.version).as_bytes(), record.topic.as_bytes())?;
                }
                Ok(())
            })
            .map_err(map_transaction_error)?;
        }
        Ok(())
    }

    #[instrument(skip(self))]
    async fn select(&self, aggregate_id: Uuid, range: SelectRange) -> Result<Vec<StoredRecord>, RecorderError> {
        let tree = self.tree(aggregate_id)?;
        let prefix = format!("{aggregate_id}/");
        let mut records = Vec::new();
        for entry in tree.scan_prefix(prefix.as_bytes()) {
            let (key, value) = entry.map_err(|e| RecorderError::Operational(e.to_string()))?;
            let key = String::from_utf8_lossy(&key).into_owned();
            if key.ends_with("/topic") {
                continue;
            }
            let version: u64 = key
                .rsplit('/')
                .next()
                .and_then(|v| v.parse().ok())
                .ok_or_else(|| RecorderError::Operational(format!("malformed key `{key}`")))?;
            if range.gt.is_some_and(|gt| version <= gt) || range.lte.is_some_and(|lte| version > lte) {
                continue;
            }
            let topic = tree
                .get(topic_key(aggregate_id, version).as_bytes())
                .map_err(|e| RecorderError::Operational(e.to_string()))?
                .map(|v| String::from_utf8_lossy(&v).into_owned())
                .unwrap_or_default();
            records.push(StoredRecord { aggregate_id, version, topic, state: value.to_vec() });
        }
        records.sort_by_key(|r| r.version);
        if range.desc {
            records.reverse();
        }
        if let Some(limit) = range.limit {
            records.truncate(limit);
        }
        Ok(records)
    }
}

/// A persistent [`ApplicationRecorder`] that advances an auxiliary
/// `notifications` tree in the same transaction as the per-aggregate
/// insert, so the notification id a record receives is never visible
/// without the record itself, or vice versa.
#[derive(Clone)]
pub struct SledApplicationRecorder {
    inner: SledAggregateRecorder,
    notifications: sled::Tree,
}

const COUNTER_KEY: &[u8] = b"counter";

impl SledApplicationRecorder {
    /// Opens a recorder over `db`.
    ///
    /// # Errors
    /// Returns [`RecorderError::Operational`] if the `notifications` tree
    /// cannot be opened.
    pub fn new(db: sled::Db) -> Result<Self, RecorderError> {
        let notifications = db
            .open_tree("notifications")
            .map_err(|e| RecorderError::Operational(e.to_string()))?;
        Ok(Self { inner: SledAggregateRecorder::new(db), notifications })
    }
}

#[async_trait]
impl AggregateRecorder for SledApplicationRecorder {
    #[instrument(skip(self, records))]
    async fn insert(&self, records: Vec<StoredRecord>) -> Result<(), RecorderError> {
        for (aggregate_id, group) in group_by_aggregate(records) {
            let agg_tree = self.inner.tree(aggregate_id)?;
            (&agg_tree, &self.notifications)
                .transaction(|(agg_tx, notif_tx)| {
                    let mut next_id = notif_tx
                        .get(COUNTER_KEY)?
                        .map_or(1u64, |v| u64::from_be_bytes(v.as_ref().try_into().expect("8 bytes")) + 1);
                    for record in &group {
                        let key = record_key(record.aggregate_id, record.version);
                        if agg_tx.get(key.as_bytes())?.is_some() {
                            return Err(ConflictableTransactionError::Abort(Abort::Duplicate));
                        }
                        agg_tx.insert(key.as_bytes(), record.state.as_slice())?;
                        agg_tx.insert(topic_key(record.aggregate_id, record.version).as_bytes(), record.topic.as_bytes())?;

                        let notification = Notification {
                            id: next_id,
                            aggregate_id: record.aggregate_id,
                            version: record.version,
                            topic: record.topic.clone(),
                            state: record.state.clone(),
                        };
                        let bytes = serde_json::to_vec(&notification)
                            .map_err(|e| ConflictableTransactionError::Abort(Abort::Serialize(e.to_string())))?;
                        notif_tx.insert(format!("n/{next_id:020}").as_bytes(), bytes)?;
                        next_id += 1;
                    }
                    notif_tx.insert(COUNTER_KEY, (next_id - 1).to_be_bytes().to_vec())?;
                    Ok(())
                })
                .map_err(map_transaction_error)?;
        }
        Ok(())
    }

    async fn select(&self, aggregate_id: Uuid, range: SelectRange) -> Result<Vec<StoredRecord>, RecorderError> {
        self.inner.select(aggregate_id, range).await
    }
}

#[async_trait]
impl ApplicationRecorder for SledApplicationRecorder {
    async fn select_notifications(&self, start: u64, limit: usize) -> Result<Vec<Notification>, RecorderError> {
        let mut notifications = Vec::new();
        for entry in self.notifications.scan_prefix(b"n/") {
            let (_, value) = entry.map_err(|e| RecorderError::Operational(e.to_string()))?;
            let notification: Notification =
                serde_json::from_slice(&value).map_err(|e| RecorderError::Operational(e.to_string()))?;
            if notification.id >= start {
                notifications.push(notification);
            }
            if notifications.len() >= limit {
                break;
            }
        }
        Ok(notifications)
    }

    async fn max_notification_id(&self) -> Result<Option<u64>, RecorderError> {
        self.notifications
            .get(COUNTER_KEY)
            .map_err(|e| RecorderError::Operational(e.to_string()))
            .map(|v| v.map(|b| u64::from_be_bytes(b.as_ref().try_into().expect("8 bytes"))))
    }
}
