//! # Community HUD CLI (`hud`)
//!
//! The `hud` binary runs the analytics pipeline: database setup,
//! normalization of raw captures, daily snapshots, reports, and Discord
//! notifications.
//!
//! ## Usage
//!
//! ```bash
//! hud --config ./config/hud.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `hud init` | Create the SQLite database and run schema migrations |
//! | `hud tenants` | List configured tenants |
//! | `hud normalize members\|leaderboard` | Ingest the newest raw capture |
//! | `hud snapshot-daily` | Copy members into the daily snapshot table |
//! | `hud delta` | Write leaderboard delta reports |
//! | `hud kpi` | Write the daily KPI report |
//! | `hud health` | Write member health scores |
//! | `hud joiners` | Write new-joiner lists |
//! | `hud celebrations` | Write the celebrations digest |
//! | `hud movers` | Write top point holders per window |
//! | `hud export-members` | Write a dated export of the member table |
//! | `hud notify <mode>` | Post a report to Discord |
//! | `hud stats` | Show database statistics |
//! | `hud run` | Full pipeline for every tenant |

use anyhow::Result;
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use community_hud::config::{self, TenantConfig};
use community_hud::models::Window;
use community_hud::normalize::{self, Target};
use community_hud::notify::{self, Mode};
use community_hud::reports::{self, Report};
use community_hud::runner::{self, RunOptions};
use community_hud::{daily, migrate, stats};

/// Community HUD CLI — leaderboard history, reports, and Discord digests
/// for online communities.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/hud.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "hud",
    about = "Community HUD — leaderboard history, reports, and Discord digests",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/hud.toml")]
    config: PathBuf,

    /// Enable debug logging (overridden by RUST_LOG).
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Idempotent; running it multiple times is safe.
    Init,

    /// List configured tenants.
    Tenants,

    /// Ingest the newest raw capture of a tenant.
    Normalize {
        #[command(subcommand)]
        target: NormalizeTarget,
    },

    /// Snapshot every member of a tenant for one day.
    SnapshotDaily {
        #[arg(long)]
        tenant: Option<String>,

        /// Day to snapshot (YYYY-MM-DD). Defaults to today (UTC).
        #[arg(long)]
        day: Option<NaiveDate>,
    },

    /// Write leaderboard delta reports for all windows.
    Delta {
        #[arg(long)]
        tenant: Option<String>,
    },

    /// Write the daily KPI report.
    Kpi {
        #[arg(long)]
        tenant: Option<String>,
    },

    /// Write member health scores and the advocates/at-risk summary.
    Health {
        #[arg(long)]
        tenant: Option<String>,
    },

    /// Write new-joiner lists.
    Joiners {
        #[arg(long)]
        tenant: Option<String>,
    },

    /// Write the celebrations digest (top scorers, newest members).
    Celebrations {
        #[arg(long)]
        tenant: Option<String>,
    },

    /// Write the top 15 point holders per window from current member points.
    Movers {
        #[arg(long)]
        tenant: Option<String>,
    },

    /// Write a dated JSON export of the member table.
    ExportMembers {
        #[arg(long)]
        tenant: Option<String>,
    },

    /// Post a report to Discord.
    Notify {
        /// One of: status, kpi, movers, health, joiners.
        mode: Mode,

        #[arg(long)]
        tenant: Option<String>,

        /// Link attached to the embed (e.g. the CI run).
        #[arg(long)]
        run_url: Option<String>,
    },

    /// Show database statistics.
    Stats {
        /// Limit to one tenant. Defaults to all.
        #[arg(long)]
        tenant: Option<String>,
    },

    /// Run the full pipeline: normalize, snapshot, reports, notifications.
    Run {
        /// Limit to one tenant. Defaults to all.
        #[arg(long)]
        tenant: Option<String>,

        /// Skip Discord notifications.
        #[arg(long)]
        no_notify: bool,

        /// Re-ingest raw files that were already ingested.
        #[arg(long)]
        force: bool,
    },
}

#[derive(Subcommand)]
enum NormalizeTarget {
    /// Upsert members from the newest members capture.
    Members {
        #[arg(long)]
        tenant: Option<String>,

        /// Re-ingest even if this file was already ingested.
        #[arg(long)]
        force: bool,
    },
    /// Append a capture batch from the newest leaderboard capture.
    Leaderboard {
        #[arg(long)]
        tenant: Option<String>,

        /// Window to ingest: all, 30, or 7. Defaults to every window.
        #[arg(long)]
        window: Option<Window>,

        /// Re-ingest even if this file was already ingested.
        #[arg(long)]
        force: bool,
    },
}

fn init_tracing(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let cfg = config::load_config(&cli.config)?;

    match &cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Tenants => {
            if cfg.tenants.is_empty() {
                println!("No tenants configured.");
            } else {
                println!("{:<20} {}", "TENANT", "GROUP");
                for t in &cfg.tenants {
                    println!("{:<20} {}", t.slug, t.group);
                }
            }
        }
        Commands::Normalize { target } => match target {
            NormalizeTarget::Members { tenant: slug, force } => {
                let t = cfg.tenant(slug.as_deref())?;
                normalize::run_normalize(&cfg, t, Target::Members, None, *force).await?;
            }
            NormalizeTarget::Leaderboard {
                tenant: slug,
                window,
                force,
            } => {
                let t = cfg.tenant(slug.as_deref())?;
                normalize::run_normalize(&cfg, t, Target::Leaderboard, *window, *force).await?;
            }
        },
        Commands::SnapshotDaily { tenant: slug, day } => {
            daily::run_snapshot_daily(&cfg, cfg.tenant(slug.as_deref())?, *day).await?;
        }
        Commands::Delta { tenant: slug } => {
            reports::run_report(&cfg, cfg.tenant(slug.as_deref())?, Report::Delta).await?;
        }
        Commands::Kpi { tenant: slug } => {
            reports::run_report(&cfg, cfg.tenant(slug.as_deref())?, Report::Kpi).await?;
        }
        Commands::Health { tenant: slug } => {
            reports::run_report(&cfg, cfg.tenant(slug.as_deref())?, Report::Health).await?;
        }
        Commands::Joiners { tenant: slug } => {
            reports::run_report(&cfg, cfg.tenant(slug.as_deref())?, Report::Joiners).await?;
        }
        Commands::Celebrations { tenant: slug } => {
            reports::run_report(&cfg, cfg.tenant(slug.as_deref())?, Report::Celebrations).await?;
        }
        Commands::Movers { tenant: slug } => {
            reports::run_report(&cfg, cfg.tenant(slug.as_deref())?, Report::Movers).await?;
        }
        Commands::ExportMembers { tenant: slug } => {
            reports::run_report(&cfg, cfg.tenant(slug.as_deref())?, Report::Export).await?;
        }
        Commands::Notify {
            mode,
            tenant: slug,
            run_url,
        } => {
            let t = cfg.tenant(slug.as_deref())?;
            notify::run_notify(&cfg, t, *mode, run_url.as_deref()).await?;
        }
        Commands::Stats { tenant: slug } => {
            let tenants: Vec<&TenantConfig> = match slug {
                Some(_) => vec![cfg.tenant(slug.as_deref())?],
                None => cfg.tenants.iter().collect(),
            };
            stats::run_stats(&cfg, &tenants).await?;
        }
        Commands::Run {
            tenant: slug,
            no_notify,
            force,
        } => {
            let opts = RunOptions {
                notify: !*no_notify,
                force: *force,
            };
            runner::run_daily(&cfg, slug.as_deref(), opts).await?;
        }
    }

    Ok(())
}
