//! Daily member snapshots.
//!
//! Copies the current-state `members` rows of a tenant into
//! `member_daily_snapshot`, keyed by `(tenant, user_id, day)`. Re-running
//! for the same day refreshes that day's rows in place.

use anyhow::Result;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::SqlitePool;
use tracing::info;

use crate::config::{Config, TenantConfig};
use crate::db;
use crate::models::to_millis;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DailyStats {
    pub inserted: u64,
    pub updated: u64,
}

/// Number of snapshot rows stored for a tenant on `day`.
pub async fn count_for_day(pool: &SqlitePool, tenant: &str, day: NaiveDate) -> Result<i64> {
    let count: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM member_daily_snapshot WHERE tenant = ? AND day = ?",
    )
    .bind(tenant)
    .bind(day.to_string())
    .fetch_one(pool)
    .await?;
    Ok(count)
}

/// Snapshot every member of `tenant` for `day`.
pub async fn snapshot_members_daily(
    pool: &SqlitePool,
    tenant: &str,
    day: NaiveDate,
    now: DateTime<Utc>,
) -> Result<DailyStats> {
    let mut tx = pool.begin().await?;

    let before: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM member_daily_snapshot WHERE tenant = ? AND day = ?",
    )
    .bind(tenant)
    .bind(day.to_string())
    .fetch_one(&mut *tx)
    .await?;

    let written = sqlx::query(
        r#"
        INSERT INTO member_daily_snapshot
            (tenant, user_id, day, level_current, points_7d, points_30d, points_all,
             rank_7d, rank_30d, rank_all, last_active_at_utc, captured_at)
        SELECT tenant, user_id, ?, level_current, points_7d, points_30d, points_all,
               rank_7d, rank_30d, rank_all, last_active_at_utc, ?
        FROM members
        WHERE tenant = ?
        ON CONFLICT(tenant, user_id, day) DO UPDATE SET
            level_current = excluded.level_current,
            points_7d = excluded.points_7d,
            points_30d = excluded.points_30d,
            points_all = excluded.points_all,
            rank_7d = excluded.rank_7d,
            rank_30d = excluded.rank_30d,
            rank_all = excluded.rank_all,
            last_active_at_utc = excluded.last_active_at_utc,
            captured_at = excluded.captured_at
        "#,
    )
    .bind(day.to_string())
    .bind(to_millis(&now))
    .bind(tenant)
    .execute(&mut *tx)
    .await?
    .rows_affected();

    let after: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM member_daily_snapshot WHERE tenant = ? AND day = ?",
    )
    .bind(tenant)
    .bind(day.to_string())
    .fetch_one(&mut *tx)
    .await?;

    tx.commit().await?;

    let inserted = (after - before).max(0) as u64;
    let stats = DailyStats {
        inserted,
        updated: written.saturating_sub(inserted),
    };

    info!(tenant, day = %day, inserted = stats.inserted, updated = stats.updated, "daily snapshot written");
    Ok(stats)
}

/// CLI entry point for `hud snapshot-daily`.
pub async fn run_snapshot_daily(
    config: &Config,
    tenant: &TenantConfig,
    day: Option<NaiveDate>,
) -> Result<()> {
    let pool = db::connect(config).await?;
    let now = Utc::now();
    let day = day.unwrap_or_else(|| now.date_naive());

    let stats = snapshot_members_daily(&pool, &tenant.slug, day, now).await?;
    println!(
        "snapshot-daily {} {}: inserted={} updated={}",
        tenant.slug, day, stats.inserted, stats.updated
    );
    println!("ok");

    pool.close().await;
    Ok(())
}
