//! Ties a [`crate::mapper::Mapper`] to a
//! [`crate::store::recorder::AggregateRecorder`] to append and load whole
//! [`AggregateRoot`]s.

use std::sync::Arc;

use tracing::instrument;
use uuid::Uuid;

use crate::aggregate::{Aggregate, AggregateRoot, DomainEvent};
use crate::error::SourceError;
use crate::mapper::{Envelope, Mapper};
use crate::store::recorder::{AggregateRecorder, SelectRange, StoredRecord};

/// Appends and loads aggregates of type `A`, running every event through
/// `A`'s mapper on the way in and out.
pub struct EventStore<A: Aggregate> {
    recorder: Arc<dyn AggregateRecorder>,
    mapper: Mapper<A::Event>,
}

impl<A: Aggregate> EventStore<A> {
    /// Builds an event store over `recorder`, using `mapper` to
    /// serialize/compress/encrypt events.
    #[must_use]
    pub fn new(recorder: Arc<dyn AggregateRecorder>, mapper: Mapper<A::Event>) -> Self {
        Self { recorder, mapper }
    }

    /// Persists every event pending on `root`, clearing its pending buffer
    /// on success. A no-op if nothing is pending.
    ///
    /// # Errors
    /// Returns [`SourceError::Recorder`] with
    /// [`crate::error::RecorderError::Integrity`] if any pending event's
    /// version was already recorded by a concurrent writer — none of the
    /// batch is committed in that case. Returns
    /// [`SourceError::Codec`] if mapping an event fails.
    #[instrument(skip(self, root))]
    pub async fn append(&self, root: &mut AggregateRoot<A>) -> Result<(), SourceError> {
        let pending = root.collect_pending();
        if pending.is_empty() {
            return Ok(());
        }
        let mut records = Vec::with_capacity(pending.len());
        for envelope in &pending {
            let state = self.mapper.from_event(envelope)?;
            records.push(StoredRecord {
                aggregate_id: envelope.originator_id,
                version: envelope.originator_version,
                topic: envelope.payload.topic().as_str().to_owned(),
                state,
            });
        }
        self.recorder.insert(records).await?;
        Ok(())
    }

    /// Loads the full event stream for `id` and replays it into a fresh
    /// [`AggregateRoot`].
    ///
    /// # Errors
    /// Returns [`SourceError::AggregateNotFound`] if `id` has no recorded
    /// events. Returns [`SourceError::Codec`] if any stored record fails
    /// to decode, or [`SourceError::Aggregate`] if the stream is not a
    /// contiguous run starting at version 1.
    #[instrument(skip(self))]
    pub async fn load(&self, id: Uuid) -> Result<AggregateRoot<A>, SourceError> {
        self.load_as_of(id, None).await
    }

    /// Loads the event stream for `id` up to and including `version`, and
    /// replays it into a fresh [`AggregateRoot`]. `None` loads the full
    /// stream, same as [`Self::load`].
    ///
    /// # Errors
    /// Returns [`SourceError::AggregateNotFound`] if `id` has no recorded
    /// events at or before `version`. Returns [`SourceError::Codec`] if any
    /// stored record fails to decode, or [`SourceError::Aggregate`] if the
    /// stream is not a contiguous run starting at version 1.
    #[instrument(skip(self))]
    pub async fn load_as_of(&self, id: Uuid, version: Option<u64>) -> Result<AggregateRoot<A>, SourceError> {
        let range = SelectRange { lte: version, ..SelectRange::default() };
        let records = self.recorder.select(id, range).await?;
        if records.is_empty() {
            return Err(SourceError::AggregateNotFound);
        }
        let envelopes = self.decode_all(records)?;
        Ok(AggregateRoot::replay(id, envelopes)?)
    }

    /// Loads only the events recorded after `version`, typically to
    /// hydrate an aggregate restored from a snapshot.
    ///
    /// # Errors
    /// Returns [`SourceError::Codec`] if any stored record fails to
    /// decode.
    #[instrument(skip(self))]
    pub async fn load_from(&self, id: Uuid, version: u64) -> Result<Vec<Envelope<A::Event>>, SourceError> {
        self.load_between(id, version, None).await
    }

    /// Loads the events recorded after `gt` and up to and including `lte`
    /// (`None` meaning unbounded above), for replaying a bounded tail onto
    /// an aggregate restored from a snapshot.
    ///
    /// # Errors
    /// Returns [`SourceError::Codec`] if any stored record fails to
    /// decode.
    #[instrument(skip(self))]
    pub async fn load_between(&self, id: Uuid, gt: u64, lte: Option<u64>) -> Result<Vec<Envelope<A::Event>>, SourceError> {
        let records = self.recorder.select(id, SelectRange { gt: Some(gt), lte, ..SelectRange::default() }).await?;
        self.decode_all(records)
    }

    fn decode_all(&self, records: Vec<StoredRecord>) -> Result<Vec<Envelope<A::Event>>, SourceError> {
        records
            .into_iter()
            .map(|r| self.mapper.to_event(r.state).map_err(SourceError::from))
            .collect()
    }
}
