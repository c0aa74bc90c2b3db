//! Read-side storage abstraction for leaderboard snapshots.
//!
//! The [`SnapshotStore`] trait is everything the delta engine needs from
//! persistence: capture timestamps, the rows of one capture batch, and
//! display names. No write access is part of the contract; snapshot rows
//! are append-only and immutable once written.
//!
//! Implementations must be `Send + Sync` to work with async runtimes.

pub mod memory;

use std::collections::HashMap;

use async_trait::async_trait;

use crate::models::{CaptureTime, SnapshotRow, Window};

/// Failure reported by a [`SnapshotStore`].
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The backing store could not be reached or a query failed.
    #[error("snapshot store unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    pub fn unavailable(err: impl std::fmt::Display) -> Self {
        StoreError::Unavailable(err.to_string())
    }
}

/// Abstract, read-only snapshot storage.
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`list_distinct_capture_timestamps`](SnapshotStore::list_distinct_capture_timestamps) | Capture batches, newest first |
/// | [`rows_at`](SnapshotStore::rows_at) | Rows of a single capture batch |
/// | [`display_name`](SnapshotStore::display_name) | Name on record for a user |
/// | [`display_names`](SnapshotStore::display_names) | Batch name lookup |
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// Capture timestamps for `(tenant, window)`, most recent first.
    async fn list_distinct_capture_timestamps(
        &self,
        tenant: &str,
        window: Window,
    ) -> Result<Vec<CaptureTime>, StoreError>;

    /// All rows written at exactly `at` for `(tenant, window)`.
    async fn rows_at(
        &self,
        tenant: &str,
        window: Window,
        at: CaptureTime,
    ) -> Result<Vec<SnapshotRow>, StoreError>;

    /// Display name on record for a user, if any.
    async fn display_name(&self, tenant: &str, user_id: &str) -> Result<Option<String>, StoreError>;

    /// Display names for many users at once. Users without a name are
    /// absent from the returned map.
    async fn display_names(
        &self,
        tenant: &str,
        user_ids: &[String],
    ) -> Result<HashMap<String, String>, StoreError> {
        let mut names = HashMap::with_capacity(user_ids.len());
        for id in user_ids {
            if let Some(name) = self.display_name(tenant, id).await? {
                names.insert(id.clone(), name);
            }
        }
        Ok(names)
    }
}
