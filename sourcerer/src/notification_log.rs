//! A paginated view over an [`crate::store::notification::ApplicationRecorder`]'s
//! notification sequence, for downstream consumers (projections, other
//! services) that read events in global order rather than per-aggregate.

use std::sync::Arc;

use tracing::instrument;

use crate::error::SourceError;
use crate::store::notification::{ApplicationRecorder, Notification};

const DEFAULT_SECTION_SIZE: usize = 10;

/// Formats a section id as `"{first},{last}"`.
#[must_use]
pub fn format_section_id(first: u64, last: u64) -> String {
    format!("{first},{last}")
}

/// A page of the notification log.
///
/// `section_id` and `next_id` are `None` when the requested range yielded
/// no notifications (the range started past the end of the log, or a
/// zero-width range was requested).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Section {
    /// The actual range covered by `items`, or `None` if empty.
    pub section_id: Option<String>,
    /// The notifications in this section, in ascending id order.
    pub items: Vec<Notification>,
    /// The id of the next section, or `None` if this section was not full
    /// (meaning the log has no more notifications past it, yet).
    pub next_id: Option<String>,
}

/// Serves fixed-size pages of a notification sequence.
pub struct NotificationLog {
    recorder: Arc<dyn ApplicationRecorder>,
    section_size: usize,
}

impl NotificationLog {
    /// Creates a log over `recorder` with the default section size of 10.
    #[must_use]
    pub fn new(recorder: Arc<dyn ApplicationRecorder>) -> Self {
        Self { recorder, section_size: DEFAULT_SECTION_SIZE }
    }

    /// Overrides the section size (the maximum notifications per page).
    #[must_use]
    pub fn with_section_size(mut self, section_size: usize) -> Self {
        self.section_size = section_size;
        self
    }

    /// Returns the section of notifications covering `[start, end]`,
    /// clamped to at most `section_size` items starting no earlier than 1.
    ///
    /// # Errors
    /// Returns [`SourceError::Recorder`] on storage failure.
    #[instrument(skip(self))]
    pub async fn section(&self, start: u64, end: u64) -> Result<Section, SourceError> {
        let start = start.max(1);
        let limit = end.saturating_sub(start).saturating_add(1).min(self.section_size as u64) as usize;
        if limit == 0 {
            return Ok(Section { section_id: None, items: Vec::new(), next_id: None });
        }

        let notifications = self.recorder.select_notifications(start, limit).await?;
        if notifications.is_empty() {
            return Ok(Section { section_id: None, items: notifications, next_id: None });
        }

        let last_id = notifications.last().expect("checked non-empty above").id;
        let section_id = format_section_id(notifications[0].id, last_id);
        let max_id = self.recorder.max_notification_id().await?;
        let next_id = (notifications.len() == limit && max_id.is_some_and(|max| max > last_id)).then(|| {
            let next_start = last_id + 1;
            format_section_id(next_start, next_start + limit as u64 - 1)
        });

        Ok(Section { section_id: Some(section_id), items: notifications, next_id })
    }

    /// The highest notification id recorded so far, or `None` if the log
    /// is empty.
    ///
    /// # Errors
    /// Returns [`SourceError::Recorder`] on storage failure.
    pub async fn max_notification_id(&self) -> Result<Option<u64>, SourceError> {
        Ok(self.recorder.max_notification_id().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::in_memory::InMemoryApplicationRecorder;
    use crate::store::recorder::{AggregateRecorder, StoredRecord};
    use uuid::Uuid;

    async fn seeded(count: u64) -> InMemoryApplicationRecorder {
        let recorder = InMemoryApplicationRecorder::new();
        let id = Uuid::new_v4();
        let records = (1..=count)
            .map(|v| StoredRecord { aggregate_id: id, version: v, topic: "t".into(), state: vec![v as u8] })
            .collect();
        recorder.insert(records).await.unwrap();
        recorder
    }

    #[tokio::test]
    async fn first_section_is_full_and_has_a_next_id() {
        let log = NotificationLog::new(Arc::new(seeded(25).await)).with_section_size(10);
        let section = log.section(1, 25).await.unwrap();
        assert_eq!(section.section_id, Some("1,10".to_owned()));
        assert_eq!(section.items.len(), 10);
        assert_eq!(section.next_id, Some("11,20".to_owned()));
    }

    #[tokio::test]
    async fn last_section_is_partial_and_has_no_next_id() {
        let log = NotificationLog::new(Arc::new(seeded(25).await)).with_section_size(10);
        let section = log.section(21, 30).await.unwrap();
        assert_eq!(section.section_id, Some("21,25".to_owned()));
        assert_eq!(section.items.len(), 5);
        assert_eq!(section.next_id, None);
    }

    #[tokio::test]
    async fn starting_past_the_end_yields_an_empty_section() {
        let log = NotificationLog::new(Arc::new(seeded(5).await));
        let section = log.section(100, 110).await.unwrap();
        assert_eq!(section, Section { section_id: None, items: Vec::new(), next_id: None });
    }

    #[tokio::test]
    async fn a_zero_width_range_yields_an_empty_section() {
        let log = NotificationLog::new(Arc::new(seeded(5).await));
        let section = log.section(5, 3).await.unwrap();
        assert_eq!(section, Section { section_id: None, items: Vec::new(), next_id: None });
    }
}
