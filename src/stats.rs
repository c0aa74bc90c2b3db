//! Database statistics and health overview.
//!
//! Summarizes what the database holds per tenant: members, points
//! coverage, leaderboard capture batches, and today's daily snapshots.
//! Used by `hud stats` and by the `status` notification.

use anyhow::Result;
use chrono::{NaiveDate, Utc};
use sqlx::SqlitePool;

use crate::config::{Config, TenantConfig};
use crate::daily;
use crate::db;
use crate::models::{from_millis, CaptureTime, Window};

/// Per-tenant counts.
#[derive(Debug, Clone, PartialEq)]
pub struct TenantStats {
    pub tenant: String,
    pub members: i64,
    pub with_points_all: i64,
    pub leaderboard_rows: i64,
    pub capture_batches: i64,
    pub last_capture: Vec<(Window, Option<CaptureTime>)>,
    pub daily_today: i64,
    pub daily_total: i64,
    pub raw_files: i64,
}

impl TenantStats {
    /// The daily pipeline ran today.
    pub fn is_healthy(&self) -> bool {
        self.daily_today > 0
    }
}

async fn count(pool: &SqlitePool, sql: &str, tenant: &str) -> Result<i64> {
    let n: i64 = sqlx::query_scalar(sql).bind(tenant).fetch_one(pool).await?;
    Ok(n)
}

pub async fn collect_stats(pool: &SqlitePool, tenant: &str, today: NaiveDate) -> Result<TenantStats> {
    let members = count(pool, "SELECT COUNT(*) FROM members WHERE tenant = ?", tenant).await?;
    let with_points_all = count(
        pool,
        "SELECT COUNT(*) FROM members WHERE tenant = ? AND points_all IS NOT NULL",
        tenant,
    )
    .await?;
    let leaderboard_rows = count(
        pool,
        "SELECT COUNT(*) FROM leaderboard_snapshots WHERE tenant = ?",
        tenant,
    )
    .await?;
    let capture_batches = count(
        pool,
        "SELECT COUNT(DISTINCT batch_id) FROM leaderboard_snapshots WHERE tenant = ?",
        tenant,
    )
    .await?;
    let daily_total = count(
        pool,
        "SELECT COUNT(*) FROM member_daily_snapshot WHERE tenant = ?",
        tenant,
    )
    .await?;
    let raw_files = count(pool, "SELECT COUNT(*) FROM raw_snapshots WHERE tenant = ?", tenant).await?;

    let mut last_capture = Vec::with_capacity(Window::ALL.len());
    for window in Window::ALL {
        let latest: Option<i64> = sqlx::query_scalar(
            "SELECT MAX(captured_at) FROM leaderboard_snapshots WHERE tenant = ? AND window_key = ?",
        )
        .bind(tenant)
        .bind(window.key())
        .fetch_one(pool)
        .await?;
        last_capture.push((window, latest.and_then(from_millis)));
    }

    Ok(TenantStats {
        tenant: tenant.to_string(),
        members,
        with_points_all,
        leaderboard_rows,
        capture_batches,
        last_capture,
        daily_today: daily::count_for_day(pool, tenant, today).await?,
        daily_total,
        raw_files,
    })
}

/// Run the stats command: query the database and print a summary.
pub async fn run_stats(config: &Config, tenants: &[&TenantConfig]) -> Result<()> {
    let pool = db::connect(config).await?;
    let today = Utc::now().date_naive();

    let db_size = std::fs::metadata(&config.db.path)
        .map(|m| m.len())
        .unwrap_or(0);

    println!("Community HUD — Database Stats");
    println!("==============================");
    println!();
    println!("  Database:    {}", config.db.path.display());
    println!("  Size:        {}", format_bytes(db_size));

    for tenant in tenants {
        let s = collect_stats(&pool, &tenant.slug, today).await?;
        println!();
        println!("  Tenant:      {} ({})", s.tenant, tenant.group);
        println!("  Members:     {}", s.members);
        println!(
            "  Points:      {} / {} with all-time points",
            s.with_points_all, s.members
        );
        println!(
            "  Leaderboard: {} rows in {} batches",
            s.leaderboard_rows, s.capture_batches
        );
        println!("  Daily:       {} today, {} total", s.daily_today, s.daily_total);
        println!("  Raw files:   {}", s.raw_files);
        println!("  {:<14} {}", "WINDOW", "LAST CAPTURE");
        println!("  {}", "-".repeat(40));
        for (window, ts) in &s.last_capture {
            let shown = match ts {
                Some(ts) => format_ts_relative(ts.timestamp()),
                None => "never".to_string(),
            };
            println!("  {:<14} {}", window.label(), shown);
        }
    }

    println!();

    pool.close().await;
    Ok(())
}

/// Format a byte count as a human-readable string.
fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.2} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}

/// Format a Unix timestamp as a relative time string (e.g. "3 hours ago").
fn format_ts_relative(ts: i64) -> String {
    let delta = Utc::now().timestamp() - ts;

    if delta < 0 {
        return format_ts_iso(ts);
    }

    if delta < 60 {
        "just now".to_string()
    } else if delta < 3600 {
        let mins = delta / 60;
        format!("{} min{} ago", mins, if mins == 1 { "" } else { "s" })
    } else if delta < 86400 {
        let hours = delta / 3600;
        format!("{} hour{} ago", hours, if hours == 1 { "" } else { "s" })
    } else if delta < 86400 * 30 {
        let days = delta / 86400;
        format!("{} day{} ago", days, if days == 1 { "" } else { "s" })
    } else {
        format_ts_iso(ts)
    }
}

fn format_ts_iso(ts: i64) -> String {
    chrono::DateTime::from_timestamp(ts, 0)
        .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| ts.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(2048), "2.0 KB");
        assert_eq!(format_bytes(3 * 1024 * 1024), "3.0 MB");
    }

    #[test]
    fn test_format_ts_relative_recent() {
        let now = Utc::now().timestamp();
        assert_eq!(format_ts_relative(now), "just now");
        assert_eq!(format_ts_relative(now - 7200), "2 hours ago");
    }
}
