//! Process-wide ordering on top of per-aggregate storage.
//!
//! A plain [`AggregateRecorder`] has no concept of ordering across
//! aggregates: each aggregate's stream is independent and nothing numbers
//! records globally. A notification log needs exactly that — a single,
//! gapless, monotonically increasing sequence spanning every aggregate
//! recorded through it — so [`ApplicationRecorder`] extends
//! [`AggregateRecorder`] with the extra bookkeeping a backend needs to hand
//! that sequence out.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::RecorderError;
use crate::store::recorder::AggregateRecorder;

/// One globally-ordered record, as returned by [`ApplicationRecorder::select_notifications`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Notification {
    /// The dense, monotonically increasing id of this notification.
    pub id: u64,
    /// The aggregate the underlying record belongs to.
    pub aggregate_id: Uuid,
    /// The aggregate-local version of the underlying record.
    pub version: u64,
    /// The stable topic naming the event class.
    pub topic: String,
    /// The mapped bytes produced by a [`crate::mapper::Mapper`].
    pub state: Vec<u8>,
}

/// An [`AggregateRecorder`] that also assigns every inserted record a
/// dense, monotone notification id, readable back in id order.
///
/// # Invariants
/// - Notification ids start at 1 and have no gaps.
/// - Assigning an id happens in the same atomic unit as the underlying
///   insert: a record is never visible through [`AggregateRecorder::select`]
///   without also being visible through [`Self::select_notifications`],
///   or vice versa.
#[async_trait]
pub trait ApplicationRecorder: AggregateRecorder {
    /// Returns up to `limit` notifications with `id >= start`, ordered by
    /// id ascending.
    ///
    /// # Errors
    /// Returns [`RecorderError::Operational`] on storage failure.
    async fn select_notifications(&self, start: u64, limit: usize) -> Result<Vec<Notification>, RecorderError>;

    /// Returns the highest notification id assigned so far, or `None` if
    /// nothing has been recorded.
    ///
    /// # Errors
    /// Returns [`RecorderError::Operational`] on storage failure.
    async fn max_notification_id(&self) -> Result<Option<u64>, RecorderError>;
}
