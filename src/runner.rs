//! Daily pipeline across tenants.
//!
//! Per tenant, in order: normalize members, normalize leaderboards for all
//! windows, daily snapshot, reports, notifications. A failing tenant is
//! logged and skipped; the remaining tenants still run.

use anyhow::{bail, Context, Result};
use chrono::Utc;
use sqlx::SqlitePool;
use tracing::{error, info, warn};

use community_hud_core::delta::DeltaError;
use community_hud_core::store::StoreError;

use crate::config::{Config, TenantConfig};
use crate::daily;
use crate::db;
use crate::migrate;
use crate::models::Window;
use crate::normalize;
use crate::notify::{self, DiscordNotifier, Mode, NotifyOutcome};
use crate::reports::{self, Report};
use crate::sqlite_store::SqliteStore;

#[derive(Debug, Clone, Copy)]
pub struct RunOptions {
    pub notify: bool,
    pub force: bool,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            notify: true,
            force: false,
        }
    }
}

/// Result of a multi-tenant run.
#[derive(Debug, Default)]
pub struct RunSummary {
    pub succeeded: Vec<String>,
    pub failed: Vec<(String, String)>,
    /// Subset of `failed` whose snapshot store could not be read.
    pub store_unavailable: Vec<String>,
}

/// True when `err` (or an error it wraps) is a snapshot store failure.
pub fn is_store_unavailable(err: &anyhow::Error) -> bool {
    if let Some(delta) = err.downcast_ref::<DeltaError>() {
        return delta.is_store_unavailable();
    }
    matches!(err.downcast_ref::<StoreError>(), Some(StoreError::Unavailable(_)))
}

/// Run the full pipeline for one tenant.
pub async fn run_tenant(
    pool: &SqlitePool,
    config: &Config,
    tenant: &TenantConfig,
    notifier: Option<&DiscordNotifier>,
    opts: RunOptions,
) -> Result<()> {
    let slug = tenant.slug.as_str();
    info!(tenant = slug, group = %tenant.group, "pipeline started");

    normalize::normalize_members(pool, config, tenant, opts.force)
        .await
        .context("members normalization failed")?;
    normalize::normalize_leaderboards(pool, config, tenant, &Window::ALL, opts.force)
        .await
        .context("leaderboard normalization failed")?;

    let now = Utc::now();
    daily::snapshot_members_daily(pool, slug, now.date_naive(), now)
        .await
        .context("daily snapshot failed")?;

    let store = SqliteStore::new(pool.clone());
    for report in Report::ALL {
        reports::generate(&store, config, slug, report, now)
            .await
            .with_context(|| format!("{} report failed", report.name()))?;
    }

    if let Some(notifier) = notifier {
        for mode in Mode::ALL {
            // a failed post does not fail the tenant
            match notify::notify(notifier, pool, config, tenant, mode, None, now).await {
                Ok(NotifyOutcome::Sent) => {}
                Ok(NotifyOutcome::Skipped(reason)) => {
                    info!(tenant = slug, mode = %mode, reason = %reason, "notification skipped")
                }
                Err(e) => warn!(tenant = slug, mode = %mode, error = %format!("{:#}", e), "notification failed"),
            }
        }
    }

    info!(tenant = slug, "pipeline finished");
    Ok(())
}

/// Run every given tenant sequentially, collecting failures.
pub async fn run_all(
    pool: &SqlitePool,
    config: &Config,
    tenants: &[&TenantConfig],
    opts: RunOptions,
) -> Result<RunSummary> {
    let notifier = if opts.notify {
        Some(DiscordNotifier::new(&config.discord)?)
    } else {
        None
    };

    let mut summary = RunSummary::default();
    for tenant in tenants {
        match run_tenant(pool, config, tenant, notifier.as_ref(), opts).await {
            Ok(()) => summary.succeeded.push(tenant.slug.clone()),
            Err(e) => {
                if is_store_unavailable(&e) {
                    error!(
                        tenant = %tenant.slug,
                        error = %format!("{:#}", e),
                        "snapshot store unavailable, skipping"
                    );
                    summary.store_unavailable.push(tenant.slug.clone());
                } else {
                    error!(tenant = %tenant.slug, error = %format!("{:#}", e), "tenant failed, skipping");
                }
                summary.failed.push((tenant.slug.clone(), format!("{:#}", e)));
            }
        }
    }
    Ok(summary)
}

/// CLI entry point for `hud run`.
pub async fn run_daily(config: &Config, tenant: Option<&str>, opts: RunOptions) -> Result<()> {
    let tenants: Vec<&TenantConfig> = match tenant {
        Some(slug) => vec![config.tenant(Some(slug))?],
        None => config.tenants.iter().collect(),
    };
    if tenants.is_empty() {
        bail!("No tenants configured. Add a [[tenants]] entry.");
    }

    let pool = db::connect(config).await?;
    migrate::apply(&pool).await?;

    let summary = run_all(&pool, config, &tenants, opts).await?;
    pool.close().await;

    for slug in &summary.succeeded {
        println!("  {:<20} ok", slug);
    }
    for (slug, err) in &summary.failed {
        if summary.store_unavailable.contains(slug) {
            println!("  {:<20} FAILED (store unavailable): {}", slug, err);
        } else {
            println!("  {:<20} FAILED: {}", slug, err);
        }
    }

    if !summary.failed.is_empty() {
        let names: Vec<&str> = summary.failed.iter().map(|(s, _)| s.as_str()).collect();
        bail!("{} tenant(s) failed: {}", names.len(), names.join(", "));
    }
    println!("ok");
    Ok(())
}
