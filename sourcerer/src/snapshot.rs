//! Snapshot machinery: a whole-aggregate state dump, stored on a parallel
//! stream identified by the same `(aggregate_id, version)` pair as the
//! event it was taken after.
//!
//! A snapshot is not a delta — restoring one replaces the aggregate's
//! accumulator outright rather than folding onto whatever state existed
//! before. The parallel stream never shares a table/tree/map with the
//! primary event stream; it is backed by its own
//! [`crate::store::recorder::AggregateRecorder`].

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::instrument;
use uuid::Uuid;

use crate::aggregate::{Aggregate, Snapshot};
use crate::error::SourceError;
use crate::mapper::{Envelope, Mapper};
use crate::store::recorder::{AggregateRecorder, SelectRange, StoredRecord};

/// A snapshot together with the version and timestamp it was taken at.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredSnapshot<S: Snapshot> {
    /// The aggregate this snapshot belongs to.
    pub aggregate_id: Uuid,
    /// The aggregate's version at the moment the snapshot was taken.
    pub version: u64,
    /// When the snapshot was taken.
    pub modified_on: DateTime<Utc>,
    /// The snapshot payload itself.
    pub snapshot: S,
}

/// Persists and retrieves the latest snapshot of an aggregate of type `A`.
pub struct SnapshotStore<A: Aggregate> {
    recorder: Arc<dyn AggregateRecorder>,
    mapper: Mapper<A::Snapshot>,
}

impl<A: Aggregate> SnapshotStore<A> {
    /// Builds a snapshot store over its own `recorder`, distinct from the
    /// one backing the primary event stream.
    #[must_use]
    pub fn new(recorder: Arc<dyn AggregateRecorder>, mapper: Mapper<A::Snapshot>) -> Self {
        Self { recorder, mapper }
    }

    /// Records a snapshot, replacing whatever state an aggregate rebuilt
    /// from it would have had before.
    ///
    /// # Errors
    /// Returns [`SourceError::Recorder`] with
    /// [`crate::error::RecorderError::Integrity`] if a snapshot already
    /// exists at this exact version. Returns [`SourceError::Codec`] if
    /// mapping the snapshot fails.
    #[instrument(skip(self, snapshot))]
    pub async fn save(&self, aggregate_id: Uuid, version: u64, modified_on: DateTime<Utc>, snapshot: A::Snapshot) -> Result<(), SourceError> {
        let envelope = Envelope { originator_id: aggregate_id, originator_version: version, timestamp: modified_on, payload: snapshot };
        let state = self.mapper.from_event(&envelope)?;
        let record = StoredRecord { aggregate_id, version, topic: std::any::type_name::<A>().to_owned(), state };
        self.recorder.insert(vec![record]).await?;
        Ok(())
    }

    /// Loads the most recent snapshot recorded for `aggregate_id`, or
    /// `None` if none has been taken.
    ///
    /// # Errors
    /// Returns [`SourceError::Codec`] if the stored record fails to
    /// decode.
    #[instrument(skip(self))]
    pub async fn load_latest(&self, aggregate_id: Uuid) -> Result<Option<StoredSnapshot<A::Snapshot>>, SourceError> {
        self.load_as_of(aggregate_id, None).await
    }

    /// Loads the most recent snapshot recorded for `aggregate_id` at or
    /// before `version`, or `None` if none qualifies. `None` is equivalent
    /// to [`Self::load_latest`].
    ///
    /// # Errors
    /// Returns [`SourceError::Codec`] if the stored record fails to
    /// decode.
    #[instrument(skip(self))]
    pub async fn load_as_of(&self, aggregate_id: Uuid, version: Option<u64>) -> Result<Option<StoredSnapshot<A::Snapshot>>, SourceError> {
        let range = SelectRange { lte: version, desc: true, limit: Some(1), ..SelectRange::default() };
        let records = self.recorder.select(aggregate_id, range).await?;
        let Some(record) = records.into_iter().next() else {
            return Ok(None);
        };
        let envelope = self.mapper.to_event(record.state)?;
        Ok(Some(StoredSnapshot {
            aggregate_id: envelope.originator_id,
            version: envelope.originator_version,
            modified_on: envelope.timestamp,
            snapshot: envelope.payload,
        }))
    }
}
