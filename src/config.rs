//! TOML configuration parsing and validation.
//!
//! Community HUD is configured with a single TOML file (default
//! `config/hud.toml`):
//!
//! ```toml
//! [db]
//! path = "./data/hud.sqlite"
//!
//! [raw]
//! dir = "./exports/raw"
//!
//! [reports]
//! dir = "./exports/reports"
//!
//! [discord]
//! username = "Community HUD"
//!
//! [discord.webhooks]
//! status = "https://discord.com/api/webhooks/..."
//! movers = "https://discord.com/api/webhooks/..."
//!
//! [[tenants]]
//! slug = "alley"
//! group = "the-alley"
//! ```

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub raw: RawConfig,
    #[serde(default)]
    pub reports: ReportsConfig,
    #[serde(default)]
    pub discord: DiscordConfig,
    #[serde(default)]
    pub tenants: Vec<TenantConfig>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

/// Where the external fetcher drops raw JSON captures.
///
/// Files are looked up under `<dir>/<tenant>/` by glob; the newest match
/// by modification time wins.
#[derive(Debug, Deserialize, Clone)]
pub struct RawConfig {
    #[serde(default = "default_raw_dir")]
    pub dir: PathBuf,
    #[serde(default = "default_leaderboard_glob")]
    pub leaderboard_glob: String,
    #[serde(default = "default_members_glob")]
    pub members_glob: String,
}

impl Default for RawConfig {
    fn default() -> Self {
        Self {
            dir: default_raw_dir(),
            leaderboard_glob: default_leaderboard_glob(),
            members_glob: default_members_glob(),
        }
    }
}

fn default_raw_dir() -> PathBuf {
    PathBuf::from("exports/raw")
}
fn default_leaderboard_glob() -> String {
    "*leaderboard*.json".to_string()
}
fn default_members_glob() -> String {
    "*members*.json".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct ReportsConfig {
    #[serde(default = "default_reports_dir")]
    pub dir: PathBuf,
}

impl Default for ReportsConfig {
    fn default() -> Self {
        Self {
            dir: default_reports_dir(),
        }
    }
}

fn default_reports_dir() -> PathBuf {
    PathBuf::from("exports/reports")
}

#[derive(Debug, Deserialize, Clone)]
pub struct DiscordConfig {
    #[serde(default = "default_username")]
    pub username: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default)]
    pub webhooks: WebhooksConfig,
}

impl Default for DiscordConfig {
    fn default() -> Self {
        Self {
            username: default_username(),
            timeout_secs: default_timeout_secs(),
            max_retries: default_max_retries(),
            webhooks: WebhooksConfig::default(),
        }
    }
}

fn default_username() -> String {
    "Community HUD".to_string()
}
fn default_timeout_secs() -> u64 {
    30
}
fn default_max_retries() -> u32 {
    3
}

/// Webhook URLs per Discord channel. Unset channels fall back to the
/// `DISCORD_WEBHOOK_<CHANNEL>` environment variable, then to `status`.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct WebhooksConfig {
    pub status: Option<String>,
    pub alerts: Option<String>,
    pub kpi: Option<String>,
    pub movers: Option<String>,
    pub health: Option<String>,
    pub joiners: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct TenantConfig {
    /// Short identifier used in the database and report paths.
    pub slug: String,
    /// Community path on the platform.
    pub group: String,
}

impl Config {
    /// Resolve the tenant to operate on.
    ///
    /// Precedence: explicit `slug`, then the `TENANT_SLUG` environment
    /// variable, then the first configured tenant.
    pub fn tenant(&self, slug: Option<&str>) -> Result<&TenantConfig> {
        let env_slug = std::env::var("TENANT_SLUG").ok();
        let wanted = slug
            .map(str::to_string)
            .or(env_slug)
            .filter(|s| !s.trim().is_empty());

        match wanted {
            Some(wanted) => self
                .tenants
                .iter()
                .find(|t| t.slug == wanted)
                .ok_or_else(|| anyhow::anyhow!("Unknown tenant: '{}'. Add it under [[tenants]].", wanted)),
            None => self
                .tenants
                .first()
                .ok_or_else(|| anyhow::anyhow!("No tenants configured. Add a [[tenants]] entry.")),
        }
    }

    /// Report directory for one tenant.
    pub fn reports_dir_for(&self, slug: &str) -> PathBuf {
        self.reports.dir.join(slug)
    }

    /// Raw capture directory for one tenant.
    pub fn raw_dir_for(&self, slug: &str) -> PathBuf {
        self.raw.dir.join(slug)
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    let mut seen = HashSet::new();
    for tenant in &config.tenants {
        let slug = tenant.slug.trim();
        if slug.is_empty() {
            bail!("tenants.slug must not be empty");
        }
        if slug.contains(['/', '\\']) || slug == "." || slug == ".." {
            bail!("tenants.slug '{}' must be a plain directory name", tenant.slug);
        }
        if !seen.insert(slug.to_string()) {
            bail!("tenants.slug '{}' is configured twice", tenant.slug);
        }
    }

    for pattern in [&config.raw.leaderboard_glob, &config.raw.members_glob] {
        globset::Glob::new(pattern)
            .with_context(|| format!("Invalid raw file glob: '{}'", pattern))?;
    }

    if config.discord.timeout_secs == 0 {
        bail!("discord.timeout_secs must be > 0");
    }

    let hooks = &config.discord.webhooks;
    for (name, url) in [
        ("status", &hooks.status),
        ("alerts", &hooks.alerts),
        ("kpi", &hooks.kpi),
        ("movers", &hooks.movers),
        ("health", &hooks.health),
        ("joiners", &hooks.joiners),
    ] {
        if let Some(url) = url {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                bail!("discord.webhooks.{} must be an http(s) URL", name);
            }
        }
    }

    Ok(())
}
