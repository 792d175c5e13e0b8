//! The aggregate and domain event model: a consistency boundary that
//! mutates only in response to its own events, replayed in strict version
//! order.
//!
//! Version checking and bumping live in one place —
//! [`AggregateRoot::trigger`]/[`AggregateRoot::replay`] — rather than being
//! repeated in every event variant's handler, so a variant's
//! [`Aggregate::apply_state`] can never forget to advance the version or
//! apply an event out of order.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt::Debug;
use uuid::Uuid;

use crate::error::AggregateError;
use crate::mapper::Envelope;
use crate::topic::Topic;

/// An immutable fact produced by an aggregate.
///
/// The `#[derive(Event)]` macro implements this for an enum, generating a
/// stable [`Topic`] per variant.
pub trait DomainEvent: Serialize + DeserializeOwned + Clone + Debug + Send + Sync + 'static {
    /// Returns the stable topic naming this event's concrete variant.
    fn topic(&self) -> Topic;
}

/// A marker trait for snapshots: a whole-aggregate state dump taken at a
/// point in time.
pub trait Snapshot: Serialize + DeserializeOwned + Clone + Debug + Send + Sync + 'static {}

/// The business logic and state of a consistency boundary.
///
/// Implementors hold only domain state — no id, version, or timestamp.
/// [`AggregateRoot`] is responsible for identity, versioning, and
/// collecting the events a command produces.
#[async_trait::async_trait]
pub trait Aggregate: Default + Clone + Debug + Send + Sync + 'static {
    /// The events this aggregate produces.
    type Event: DomainEvent;
    /// The commands this aggregate accepts.
    type Command: Debug + Send + Sync;
    /// The snapshot type this aggregate can be reduced to and restored from.
    type Snapshot: Snapshot;
    /// The error a command may fail with before any event is produced.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Mutates business state in response to `event`. Must not fail:
    /// by the time an event reaches this method it has already been
    /// validated by [`Self::handle`].
    fn apply_state(&mut self, event: &Self::Event);

    /// Validates `command` against current state and returns the events it
    /// produces, or an error if a business rule rejects it. Produces no
    /// side effects: on success, the events are not yet applied.
    async fn handle(&self, command: Self::Command) -> Result<Vec<Self::Event>, Self::Error>;

    /// Reduces current state to a snapshot.
    fn to_snapshot(&self) -> Self::Snapshot;

    /// Restores state from a previously taken snapshot.
    fn from_snapshot(snapshot: Self::Snapshot) -> Self;
}

/// Identity, version, and the events pending since the last
/// [`Self::collect_pending`], wrapped around an [`Aggregate`]'s business
/// state.
#[derive(Debug, Clone)]
pub struct AggregateRoot<A: Aggregate> {
    id: Uuid,
    version: u64,
    modified_on: DateTime<Utc>,
    state: A,
    pending: Vec<Envelope<A::Event>>,
}

impl<A: Aggregate> AggregateRoot<A> {
    /// Starts a new aggregate at version 0, with no events applied yet.
    #[must_use]
    pub fn new(id: Uuid) -> Self {
        Self { id, version: 0, modified_on: Utc::now(), state: A::default(), pending: Vec::new() }
    }

    /// Rebuilds an aggregate by replaying a version-ordered event stream
    /// from scratch.
    ///
    /// # Errors
    /// Returns [`AggregateError::Version`] if `events` is not a
    /// contiguous run starting at version 1.
    pub fn replay(id: Uuid, events: impl IntoIterator<Item = Envelope<A::Event>>) -> Result<Self, AggregateError> {
        let mut root = Self::new(id);
        for envelope in events {
            root.apply_envelope(envelope)?;
        }
        root.pending.clear();
        Ok(root)
    }

    /// Restores an aggregate from a snapshot taken at `version`, ready to
    /// have later events applied on top via [`Self::replay_from`].
    #[must_use]
    pub fn from_snapshot(id: Uuid, version: u64, modified_on: DateTime<Utc>, snapshot: A::Snapshot) -> Self {
        Self { id, version, modified_on, state: A::from_snapshot(snapshot), pending: Vec::new() }
    }

    /// Applies further events on top of an aggregate already at some
    /// version (typically one restored via [`Self::from_snapshot`]).
    ///
    /// # Errors
    /// Returns [`AggregateError::Version`] if `events` does not start
    /// immediately after the current version.
    pub fn replay_from(mut self, events: impl IntoIterator<Item = Envelope<A::Event>>) -> Result<Self, AggregateError> {
        for envelope in events {
            self.apply_envelope(envelope)?;
        }
        self.pending.clear();
        Ok(self)
    }

    fn apply_envelope(&mut self, envelope: Envelope<A::Event>) -> Result<(), AggregateError> {
        let expected = self.version + 1;
        if envelope.originator_version != expected {
            return Err(AggregateError::Version { expected, actual: envelope.originator_version });
        }
        self.state.apply_state(&envelope.payload);
        self.version = envelope.originator_version;
        self.modified_on = envelope.timestamp;
        Ok(())
    }

    /// Validates `command` against current state and, on success, applies
    /// the resulting events and buffers them as pending.
    ///
    /// # Errors
    /// Returns the aggregate's own `A::Error` if the command fails
    /// validation; no state changes on failure.
    pub async fn handle(&mut self, command: A::Command) -> Result<(), A::Error> {
        let events = self.state.handle(command).await?;
        for event in events {
            self.trigger(event);
        }
        Ok(())
    }

    /// Applies a single event produced out-of-band (outside
    /// [`Self::handle`]), bumping the version and buffering it as pending.
    pub fn trigger(&mut self, event: A::Event) {
        let originator_version = self.version + 1;
        let timestamp = Utc::now();
        self.state.apply_state(&event);
        self.version = originator_version;
        self.modified_on = timestamp;
        self.pending.push(Envelope { originator_id: self.id, originator_version, timestamp, payload: event });
    }

    /// Takes the events buffered since the last call, leaving none pending.
    pub fn collect_pending(&mut self) -> Vec<Envelope<A::Event>> {
        std::mem::take(&mut self.pending)
    }

    /// The number of events buffered since the last [`Self::collect_pending`].
    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// The aggregate's identifier.
    #[must_use]
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// The aggregate's current version (0 if no event has been applied).
    #[must_use]
    pub fn version(&self) -> u64 {
        self.version
    }

    /// When the aggregate was last modified.
    #[must_use]
    pub fn modified_on(&self) -> DateTime<Utc> {
        self.modified_on
    }

    /// A reference to the aggregate's business state.
    #[must_use]
    pub fn state(&self) -> &A {
        &self.state
    }

    /// Reduces the aggregate's current state to a snapshot.
    #[must_use]
    pub fn to_snapshot(&self) -> A::Snapshot {
        self.state.to_snapshot()
    }
}
