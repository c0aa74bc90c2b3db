//! Database schema migrations (idempotent).
//!
//! Every statement uses `IF NOT EXISTS`, so `hud init` can run any number
//! of times.

use anyhow::Result;
use sqlx::SqlitePool;

use crate::config::Config;
use crate::db;

pub async fn run_migrations(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    apply(&pool).await?;
    pool.close().await;
    Ok(())
}

/// Apply the schema to an open pool.
pub async fn apply(pool: &SqlitePool) -> Result<()> {
    // Current-state projection, one row per (tenant, user_id)
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS members (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            tenant TEXT NOT NULL,
            user_id TEXT NOT NULL,
            member_id TEXT,
            handle TEXT,
            first_name TEXT,
            last_name TEXT,
            name TEXT,
            email TEXT,
            joined_date TEXT,
            approved_at TEXT,
            role TEXT,
            bio TEXT,
            location TEXT,
            link_website TEXT,
            link_instagram TEXT,
            link_linkedin TEXT,
            link_facebook TEXT,
            link_youtube TEXT,
            last_active_raw TEXT,
            last_active_at_utc TEXT,
            updated_at_raw TEXT,
            level_current INTEGER,
            points_7d INTEGER,
            rank_7d INTEGER,
            points_30d INTEGER,
            rank_30d INTEGER,
            points_all INTEGER,
            rank_all INTEGER,
            source_last_update TEXT,
            updated_at INTEGER NOT NULL,
            UNIQUE(tenant, user_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Append-only leaderboard history
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS leaderboard_snapshots (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            tenant TEXT NOT NULL,
            user_id TEXT NOT NULL,
            window_key TEXT NOT NULL,
            points INTEGER,
            rank INTEGER,
            captured_at INTEGER NOT NULL,
            batch_id TEXT NOT NULL,
            source_file TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS member_daily_snapshot (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            tenant TEXT NOT NULL,
            user_id TEXT NOT NULL,
            day TEXT NOT NULL,
            level_current INTEGER,
            points_7d INTEGER,
            points_30d INTEGER,
            points_all INTEGER,
            rank_7d INTEGER,
            rank_30d INTEGER,
            rank_all INTEGER,
            last_active_at_utc TEXT,
            captured_at INTEGER NOT NULL,
            UNIQUE(tenant, user_id, day)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS raw_snapshots (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            tenant TEXT NOT NULL,
            route TEXT NOT NULL,
            path TEXT NOT NULL,
            content_hash TEXT NOT NULL,
            size_bytes INTEGER NOT NULL,
            captured_at INTEGER NOT NULL,
            UNIQUE(tenant, route, content_hash)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_lb_tenant_window_captured \
         ON leaderboard_snapshots(tenant, window_key, captured_at DESC)",
    )
    .execute(pool)
    .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_members_tenant_email ON members(tenant, email)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_daily_tenant_day ON member_daily_snapshot(tenant, day)")
        .execute(pool)
        .await?;

    Ok(())
}
