//! Markdown and JSON reports written under `<reports.dir>/<tenant>/`.
//!
//! | Report | Files |
//! |--------|-------|
//! | [`delta`] | `leaderboard_delta_true_<window>.md`, `leaderboard_delta_true.md` |
//! | [`kpi`] | `kpi_<YYYY-MM-DD>.md` |
//! | [`health`] | `member_health.json`, `member_health_summary.md` |
//! | [`joiners`] | `new_joiners_week.md`, `new_joiners_last_week.md`, `new_joiners_30d.md` |
//! | [`celebrations`] | `celebrations_<YYYY-MM-DD>.md` |
//! | [`movers`] | `leaderboard_movers.md` |
//! | [`export`] | `snapshot_members_<YYYY-MM-DD>.json`, `snapshot_<YYYY-MM-DD>.md` |
//!
//! File names are read back by the notifier, so they are fixed.

pub mod celebrations;
pub mod delta;
pub mod export;
pub mod health;
pub mod joiners;
pub mod kpi;
pub mod movers;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::config::{Config, TenantConfig};
use crate::db;
use crate::sqlite_store::SqliteStore;

/// Which report `hud <report>` generates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Report {
    Delta,
    Kpi,
    Health,
    Joiners,
    Celebrations,
    Movers,
    Export,
}

impl Report {
    pub const ALL: [Report; 7] = [
        Report::Delta,
        Report::Kpi,
        Report::Health,
        Report::Joiners,
        Report::Celebrations,
        Report::Movers,
        Report::Export,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Report::Delta => "delta",
            Report::Kpi => "kpi",
            Report::Health => "health",
            Report::Joiners => "joiners",
            Report::Celebrations => "celebrations",
            Report::Movers => "movers",
            Report::Export => "export-members",
        }
    }
}

/// Write one report file, creating the directory on demand.
pub fn write_report(dir: &Path, file_name: &str, content: &str) -> Result<PathBuf> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create reports directory: {}", dir.display()))?;
    let path = dir.join(file_name);
    std::fs::write(&path, content)
        .with_context(|| format!("Failed to write report: {}", path.display()))?;
    debug!(path = %path.display(), bytes = content.len(), "report written");
    Ok(path)
}

/// Generate one report for a tenant and return the files written.
pub async fn generate(
    store: &SqliteStore,
    config: &Config,
    tenant: &str,
    report: Report,
    now: DateTime<Utc>,
) -> Result<Vec<PathBuf>> {
    let dir = config.reports_dir_for(tenant);
    match report {
        Report::Delta => delta::write_delta_reports(store, &dir, tenant).await,
        Report::Kpi => {
            let members = store.members(tenant).await?;
            kpi::write_kpi(&dir, tenant, &members, now).map(|p| vec![p])
        }
        Report::Health => {
            let members = store.members(tenant).await?;
            health::write_health(&dir, &members, now)
        }
        Report::Joiners => {
            let members = store.members(tenant).await?;
            joiners::write_joiners(&dir, &members, now)
        }
        Report::Celebrations => {
            let members = store.members(tenant).await?;
            celebrations::write_celebrations(&dir, tenant, &members, now).map(|p| vec![p])
        }
        Report::Movers => {
            let members = store.members(tenant).await?;
            movers::write_movers(&dir, &members).map(|p| vec![p])
        }
        Report::Export => {
            let members = store.members(tenant).await?;
            export::write_export(&dir, tenant, &members, now)
        }
    }
}

/// CLI entry point for the single-report commands (`hud delta`, `hud kpi`, ...).
pub async fn run_report(config: &Config, tenant: &TenantConfig, report: Report) -> Result<()> {
    let pool = db::connect(config).await?;
    let store = SqliteStore::new(pool.clone());

    let paths = generate(&store, config, &tenant.slug, report, Utc::now()).await?;
    println!("{} {}", report.name(), tenant.slug);
    for path in &paths {
        println!("  wrote {}", path.display());
    }
    println!("ok");

    pool.close().await;
    Ok(())
}
