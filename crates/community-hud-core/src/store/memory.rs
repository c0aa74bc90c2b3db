//! In-memory [`SnapshotStore`] implementation for tests and embedding.
//!
//! Rows live in a `Vec` behind `std::sync::RwLock`. The store can be
//! switched into an unavailable state to exercise error paths.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::RwLock;

use async_trait::async_trait;

use crate::models::{CaptureTime, SnapshotRow, Window};

use super::{SnapshotStore, StoreError};

struct StoredRow {
    tenant: String,
    window: Window,
    captured_at: CaptureTime,
    row: SnapshotRow,
}

/// In-memory snapshot store.
pub struct InMemoryStore {
    rows: RwLock<Vec<StoredRow>>,
    names: RwLock<HashMap<(String, String), String>>,
    unavailable: AtomicBool,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            rows: RwLock::new(Vec::new()),
            names: RwLock::new(HashMap::new()),
            unavailable: AtomicBool::new(false),
        }
    }

    /// Append a capture batch: every row gets the same `captured_at`.
    pub fn insert_capture(
        &self,
        tenant: &str,
        window: Window,
        captured_at: CaptureTime,
        rows: impl IntoIterator<Item = SnapshotRow>,
    ) {
        let mut stored = self.rows.write().unwrap_or_else(|e| e.into_inner());
        for row in rows {
            stored.push(StoredRow {
                tenant: tenant.to_string(),
                window,
                captured_at,
                row,
            });
        }
    }

    pub fn set_name(&self, tenant: &str, user_id: &str, name: &str) {
        let mut names = self.names.write().unwrap_or_else(|e| e.into_inner());
        names.insert((tenant.to_string(), user_id.to_string()), name.to_string());
    }

    /// Make every subsequent call fail with [`StoreError::Unavailable`].
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn check_available(&self) -> Result<(), StoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            Err(StoreError::unavailable("in-memory store marked unavailable"))
        } else {
            Ok(())
        }
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SnapshotStore for InMemoryStore {
    async fn list_distinct_capture_timestamps(
        &self,
        tenant: &str,
        window: Window,
    ) -> Result<Vec<CaptureTime>, StoreError> {
        self.check_available()?;
        let rows = self.rows.read().map_err(StoreError::unavailable)?;
        let mut stamps: Vec<CaptureTime> = rows
            .iter()
            .filter(|r| r.tenant == tenant && r.window == window)
            .map(|r| r.captured_at)
            .collect();
        stamps.sort_unstable_by(|a, b| b.cmp(a));
        stamps.dedup();
        Ok(stamps)
    }

    async fn rows_at(
        &self,
        tenant: &str,
        window: Window,
        at: CaptureTime,
    ) -> Result<Vec<SnapshotRow>, StoreError> {
        self.check_available()?;
        let rows = self.rows.read().map_err(StoreError::unavailable)?;
        Ok(rows
            .iter()
            .filter(|r| r.tenant == tenant && r.window == window && r.captured_at == at)
            .map(|r| r.row.clone())
            .collect())
    }

    async fn display_name(&self, tenant: &str, user_id: &str) -> Result<Option<String>, StoreError> {
        self.check_available()?;
        let names = self.names.read().map_err(StoreError::unavailable)?;
        Ok(names
            .get(&(tenant.to_string(), user_id.to_string()))
            .cloned())
    }
}
