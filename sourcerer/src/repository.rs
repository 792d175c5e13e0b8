//! A high-level, snapshot-aware API for loading and saving aggregates.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::instrument;
use uuid::Uuid;

use crate::aggregate::{Aggregate, AggregateRoot};
use crate::error::SourceError;
use crate::event_store::EventStore;
use crate::snapshot::SnapshotStore;

/// The standard interface for loading and saving aggregates.
#[async_trait]
pub trait Repository<A: Aggregate>: Send + Sync {
    /// Loads an aggregate, using a snapshot to skip replaying its full
    /// history when one is configured and available.
    async fn load(&self, id: Uuid) -> Result<AggregateRoot<A>, SourceError> {
        self.load_as_of(id, None).await
    }

    /// Loads an aggregate as it stood at `version` (`None` for the latest,
    /// same as [`Self::load`]), using a snapshot taken at or before
    /// `version` to skip replaying its full history when one is available.
    async fn load_as_of(&self, id: Uuid, version: Option<u64>) -> Result<AggregateRoot<A>, SourceError>;

    /// Persists whatever events are pending on `root`, taking a new
    /// snapshot if a snapshot frequency is configured and this save
    /// crosses a multiple of it.
    async fn save(&self, root: &mut AggregateRoot<A>) -> Result<(), SourceError>;
}

/// Orchestrates an [`EventStore`] and an optional [`SnapshotStore`] behind
/// the snapshot-then-delta load algorithm: fetch the latest snapshot (if
/// any), then replay only the events recorded since it.
pub struct GenericRepository<A: Aggregate> {
    store: Arc<EventStore<A>>,
    snapshots: Option<Arc<SnapshotStore<A>>>,
    snapshot_frequency: Option<u64>,
}

impl<A: Aggregate> GenericRepository<A> {
    /// Creates a repository with no snapshot store configured.
    #[must_use]
    pub fn new(store: Arc<EventStore<A>>) -> Self {
        Self { store, snapshots: None, snapshot_frequency: None }
    }

    /// Attaches a snapshot store.
    #[must_use]
    pub fn with_snapshots(mut self, snapshots: Arc<SnapshotStore<A>>) -> Self {
        self.snapshots = Some(snapshots);
        self
    }

    /// Sets how often, in aggregate versions, a new snapshot is taken.
    /// `Some(100)` means a snapshot every 100 versions; `None` (the
    /// default) means saves never take a snapshot even if a snapshot store
    /// is configured.
    #[must_use]
    pub fn with_snapshot_frequency(mut self, frequency: Option<u64>) -> Self {
        self.snapshot_frequency = frequency;
        self
    }
}

#[async_trait]
impl<A: Aggregate> Repository<A> for GenericRepository<A> {
    #[instrument(skip(self))]
    async fn load_as_of(&self, id: Uuid, version: Option<u64>) -> Result<AggregateRoot<A>, SourceError> {
        let Some(snapshots) = &self.snapshots else {
            return self.store.load_as_of(id, version).await;
        };
        match snapshots.load_as_of(id, version).await? {
            Some(stored) => {
                let root = AggregateRoot::from_snapshot(id, stored.version, stored.modified_on, stored.snapshot);
                let tail = self.store.load_between(id, stored.version, version).await?;
                Ok(root.replay_from(tail)?)
            }
            None => self.store.load_as_of(id, version).await,
        }
    }

    #[instrument(skip(self, root), fields(aggregate.id = ?root.id()))]
    async fn save(&self, root: &mut AggregateRoot<A>) -> Result<(), SourceError> {
        let pending = root.pending_len() as u64;
        if pending == 0 {
            return Ok(());
        }
        let version_before = root.version() - pending;
        self.store.append(root).await?;
        let version_after = root.version();

        if let (Some(snapshots), Some(frequency)) = (&self.snapshots, self.snapshot_frequency) {
            if frequency > 0 && version_after / frequency > version_before / frequency {
                snapshots.save(root.id(), version_after, root.modified_on(), root.to_snapshot()).await?;
            }
        }
        Ok(())
    }
}

#[async_trait]
impl<A, R> Repository<A> for Arc<R>
where
    A: Aggregate,
    R: Repository<A> + Send + Sync,
{
    async fn load_as_of(&self, id: Uuid, version: Option<u64>) -> Result<AggregateRoot<A>, SourceError> {
        (**self).load_as_of(id, version).await
    }

    async fn save(&self, root: &mut AggregateRoot<A>) -> Result<(), SourceError> {
        (**self).save(root).await
    }
}
