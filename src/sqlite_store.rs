//! SQLite-backed [`SnapshotStore`] implementation.
//!
//! Maps each store operation to a read query against `leaderboard_snapshots`
//! and `members`. Query failures surface as [`StoreError::Unavailable`] so
//! the orchestrator can tell a broken store from other failures.

use std::collections::HashMap;

use anyhow::Result;
use async_trait::async_trait;
use sqlx::{QueryBuilder, Row, Sqlite, SqlitePool};

use community_hud_core::store::{SnapshotStore, StoreError};

use crate::models::{from_millis, to_millis, CaptureTime, Member, NameFields, SnapshotRow, Window};

/// SQLite implementation of the [`SnapshotStore`] trait.
///
/// Wraps a [`SqlitePool`] owned by the caller. Also serves the read-only
/// member queries used by the reports.
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// All members of a tenant, ordered by user id.
    pub async fn members(&self, tenant: &str) -> Result<Vec<Member>> {
        let rows = sqlx::query(
            r#"
            SELECT user_id, name, first_name, last_name, handle, joined_date,
                   level_current, points_7d, rank_7d, points_30d, rank_30d,
                   points_all, rank_all, last_active_at_utc
            FROM members
            WHERE tenant = ?
            ORDER BY user_id
            "#,
        )
        .bind(tenant)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| Member {
                user_id: row.get("user_id"),
                name: row.get("name"),
                first_name: row.get("first_name"),
                last_name: row.get("last_name"),
                handle: row.get("handle"),
                joined_date: row.get("joined_date"),
                level_current: row.get("level_current"),
                points_7d: row.get("points_7d"),
                rank_7d: row.get("rank_7d"),
                points_30d: row.get("points_30d"),
                rank_30d: row.get("rank_30d"),
                points_all: row.get("points_all"),
                rank_all: row.get("rank_all"),
                last_active_at_utc: row.get("last_active_at_utc"),
            })
            .collect())
    }
}

fn name_fields(row: &sqlx::sqlite::SqliteRow) -> NameFields {
    NameFields {
        name: row.get("name"),
        first_name: row.get("first_name"),
        last_name: row.get("last_name"),
        handle: row.get("handle"),
    }
}

#[async_trait]
impl SnapshotStore for SqliteStore {
    async fn list_distinct_capture_timestamps(
        &self,
        tenant: &str,
        window: Window,
    ) -> Result<Vec<CaptureTime>, StoreError> {
        let stamps: Vec<i64> = sqlx::query_scalar(
            r#"
            SELECT DISTINCT captured_at
            FROM leaderboard_snapshots
            WHERE tenant = ? AND window_key = ?
            ORDER BY captured_at DESC
            "#,
        )
        .bind(tenant)
        .bind(window.key())
        .fetch_all(&self.pool)
        .await
        .map_err(StoreError::unavailable)?;

        Ok(stamps.into_iter().filter_map(from_millis).collect())
    }

    async fn rows_at(
        &self,
        tenant: &str,
        window: Window,
        at: CaptureTime,
    ) -> Result<Vec<SnapshotRow>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT user_id, points, rank
            FROM leaderboard_snapshots
            WHERE tenant = ? AND window_key = ? AND captured_at = ?
            "#,
        )
        .bind(tenant)
        .bind(window.key())
        .bind(to_millis(&at))
        .fetch_all(&self.pool)
        .await
        .map_err(StoreError::unavailable)?;

        Ok(rows
            .iter()
            .map(|row| SnapshotRow {
                user_id: row.get("user_id"),
                points: row.get("points"),
                rank: row.get("rank"),
            })
            .collect())
    }

    async fn display_name(&self, tenant: &str, user_id: &str) -> Result<Option<String>, StoreError> {
        let row = sqlx::query(
            "SELECT name, first_name, last_name, handle FROM members WHERE tenant = ? AND user_id = ?",
        )
        .bind(tenant)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(StoreError::unavailable)?;

        Ok(row.as_ref().and_then(|r| name_fields(r).display_name()))
    }

    async fn display_names(
        &self,
        tenant: &str,
        user_ids: &[String],
    ) -> Result<HashMap<String, String>, StoreError> {
        let mut names = HashMap::with_capacity(user_ids.len());

        // stay well below SQLite's bound-parameter limit
        for chunk in user_ids.chunks(500) {
            let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(
                "SELECT user_id, name, first_name, last_name, handle FROM members WHERE tenant = ",
            );
            qb.push_bind(tenant);
            qb.push(" AND user_id IN (");
            let mut separated = qb.separated(", ");
            for id in chunk {
                separated.push_bind(id.as_str());
            }
            separated.push_unseparated(")");

            let rows = qb
                .build()
                .fetch_all(&self.pool)
                .await
                .map_err(StoreError::unavailable)?;

            for row in &rows {
                if let Some(name) = name_fields(row).display_name() {
                    names.insert(row.get("user_id"), name);
                }
            }
        }

        Ok(names)
    }
}
