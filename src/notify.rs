//! Discord webhook notifications.
//!
//! Each mode posts one embed to one channel. Report-backed modes read the
//! files written by [`crate::reports`]; `status` reads live database stats.
//!
//! | Mode | Source | Channel |
//! |------|--------|---------|
//! | `status` | [`crate::stats::collect_stats`] | `status` (+ `alerts` when red) |
//! | `kpi` | newest `kpi_*.md` | `kpi` |
//! | `movers` | `leaderboard_delta_true_7.md` | `movers` |
//! | `health` | `member_health_summary.md` | `health` |
//! | `joiners` | `new_joiners_week.md` | `joiners` |
//!
//! # Webhook resolution
//!
//! For each channel: `[discord.webhooks]` value, then the
//! `DISCORD_WEBHOOK_<CHANNEL>` environment variable (`NEWJOINERS` for the
//! joiners channel), then the status webhook. A channel without any webhook is skipped with a warning.
//!
//! # Retry strategy
//!
//! - HTTP 429 or 5xx → retry with exponential backoff
//! - HTTP 4xx (not 429) → fail immediately
//! - Network error → retry

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use globset::Glob;
use serde::Serialize;
use sqlx::SqlitePool;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::config::{Config, DiscordConfig, TenantConfig, WebhooksConfig};
use crate::db;
use crate::reports::{health, joiners};
use crate::stats::{collect_stats, TenantStats};

/// Maximum characters of report text placed in an embed description.
pub const DESCRIPTION_LIMIT: usize = 1900;

pub const COLOR_GREEN: u32 = 0x2e_cc_71;
pub const COLOR_RED: u32 = 0xe7_4c_3c;
pub const COLOR_BLUE: u32 = 0x34_98_db;
pub const COLOR_GOLD: u32 = 0xf1_c4_0f;
pub const COLOR_PURPLE: u32 = 0x9b_59_b6;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    Status,
    Alerts,
    Kpi,
    Movers,
    Health,
    Joiners,
}

impl Channel {
    pub fn name(&self) -> &'static str {
        match self {
            Channel::Status => "status",
            Channel::Alerts => "alerts",
            Channel::Kpi => "kpi",
            Channel::Movers => "movers",
            Channel::Health => "health",
            Channel::Joiners => "joiners",
        }
    }

    pub fn env_var(&self) -> &'static str {
        match self {
            Channel::Status => "DISCORD_WEBHOOK_STATUS",
            Channel::Alerts => "DISCORD_WEBHOOK_ALERTS",
            Channel::Kpi => "DISCORD_WEBHOOK_KPI",
            Channel::Movers => "DISCORD_WEBHOOK_MOVERS",
            Channel::Health => "DISCORD_WEBHOOK_HEALTH",
            Channel::Joiners => "DISCORD_WEBHOOK_NEWJOINERS",
        }
    }

    fn configured<'a>(&self, hooks: &'a WebhooksConfig) -> Option<&'a str> {
        let url = match self {
            Channel::Status => &hooks.status,
            Channel::Alerts => &hooks.alerts,
            Channel::Kpi => &hooks.kpi,
            Channel::Movers => &hooks.movers,
            Channel::Health => &hooks.health,
            Channel::Joiners => &hooks.joiners,
        };
        url.as_deref().filter(|u| !u.trim().is_empty())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Status,
    Kpi,
    Movers,
    Health,
    Joiners,
}

impl Mode {
    pub const ALL: [Mode; 5] = [Mode::Status, Mode::Kpi, Mode::Movers, Mode::Health, Mode::Joiners];

    pub fn channel(&self) -> Channel {
        match self {
            Mode::Status => Channel::Status,
            Mode::Kpi => Channel::Kpi,
            Mode::Movers => Channel::Movers,
            Mode::Health => Channel::Health,
            Mode::Joiners => Channel::Joiners,
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.channel().name())
    }
}

impl FromStr for Mode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "status" => Ok(Mode::Status),
            "kpi" => Ok(Mode::Kpi),
            "movers" => Ok(Mode::Movers),
            "health" => Ok(Mode::Health),
            "joiners" => Ok(Mode::Joiners),
            other => bail!(
                "Unknown notify mode: '{}'. Must be status, kpi, movers, health, or joiners.",
                other
            ),
        }
    }
}

/// Resolve the webhook URL for a channel. `env` looks up environment
/// variables so callers and tests can supply their own source.
pub fn resolve_webhook<F>(hooks: &WebhooksConfig, channel: Channel, env: F) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    let lookup = |ch: Channel| {
        ch.configured(hooks)
            .map(str::to_string)
            .or_else(|| env(ch.env_var()).filter(|u| !u.trim().is_empty()))
    };

    lookup(channel).or_else(|| {
        if channel == Channel::Status {
            None
        } else {
            lookup(Channel::Status)
        }
    })
}

// ─── Payload ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct EmbedField {
    pub name: String,
    pub value: String,
    pub inline: bool,
}

impl EmbedField {
    pub fn inline(name: impl Into<String>, value: impl ToString) -> Self {
        Self {
            name: name.into(),
            value: value.to_string(),
            inline: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct EmbedFooter {
    pub text: String,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Embed {
    pub title: String,
    pub description: String,
    pub color: u32,
    pub footer: EmbedFooter,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<EmbedField>,
}

#[derive(Debug, Serialize)]
struct WebhookPayload<'a> {
    username: &'a str,
    embeds: [&'a Embed; 1],
}

/// Cut `text` to at most `max` characters, marking the cut with `…`.
pub fn truncate_chars(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let mut cut: String = text.chars().take(max.saturating_sub(1)).collect();
    cut.push('…');
    cut
}

/// Build an embed around report text. The text is trimmed, truncated and
/// wrapped in a code block.
pub fn build_embed(
    title: &str,
    body: &str,
    color: u32,
    tenant: &str,
    now: DateTime<Utc>,
    run_url: Option<&str>,
    fields: Vec<EmbedField>,
) -> Embed {
    let body = body.trim();
    let body = if body.is_empty() { "(empty report)" } else { body };

    Embed {
        title: title.to_string(),
        description: format!("```\n{}\n```", truncate_chars(body, DESCRIPTION_LIMIT)),
        color,
        footer: EmbedFooter {
            text: format!("Community HUD • {} • {} UTC", tenant, now.format("%Y-%m-%d %H:%M")),
        },
        url: run_url.map(str::to_string),
        fields,
    }
}

// ─── Transport ──────────────────────────────────────────────────────

/// Posts embeds to Discord webhooks with retry and backoff.
pub struct DiscordNotifier {
    client: reqwest::Client,
    username: String,
    max_retries: u32,
    webhooks: WebhooksConfig,
}

impl DiscordNotifier {
    pub fn new(config: &DiscordConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            username: config.username.clone(),
            max_retries: config.max_retries,
            webhooks: config.webhooks.clone(),
        })
    }

    pub fn webhook_for(&self, channel: Channel) -> Option<String> {
        resolve_webhook(&self.webhooks, channel, |key| std::env::var(key).ok())
    }

    /// POST one embed to `url`.
    pub async fn post(&self, url: &str, embed: &Embed) -> Result<()> {
        let payload = WebhookPayload {
            username: &self.username,
            embeds: [embed],
        };

        let mut last_err = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                // Exponential backoff: 1s, 2s, 4s, 8s, ...
                let delay = Duration::from_secs(1 << (attempt - 1).min(5));
                debug!(attempt, delay_secs = delay.as_secs(), "retrying webhook");
                tokio::time::sleep(delay).await;
            }

            match self.client.post(url).json(&payload).send().await {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        return Ok(());
                    }

                    if status.as_u16() == 429 || status.is_server_error() {
                        let body_text = response.text().await.unwrap_or_default();
                        last_err = Some(anyhow::anyhow!("Discord webhook error {}: {}", status, body_text));
                        continue;
                    }

                    let body_text = response.text().await.unwrap_or_default();
                    bail!("Discord webhook error {}: {}", status, body_text);
                }
                Err(e) => {
                    last_err = Some(e.into());
                    continue;
                }
            }
        }

        Err(last_err.unwrap_or_else(|| anyhow::anyhow!("Webhook post failed after retries")))
    }

    /// Send to a channel. Returns `false` when the channel has no webhook.
    pub async fn send(&self, channel: Channel, embed: &Embed) -> Result<bool> {
        let Some(url) = self.webhook_for(channel) else {
            warn!(channel = channel.name(), "no webhook configured, skipping");
            return Ok(false);
        };
        self.post(&url, embed)
            .await
            .with_context(|| format!("Failed to post to the {} channel", channel.name()))?;
        Ok(true)
    }
}

// ─── Modes ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotifyOutcome {
    Sent,
    Skipped(String),
}

/// Newest report matching `pattern` in `dir`, by file name. Report names
/// carry ISO dates, so the largest name is the newest.
pub fn newest_report(dir: &Path, pattern: &str) -> Result<Option<PathBuf>> {
    if !dir.is_dir() {
        return Ok(None);
    }
    let matcher = Glob::new(pattern)?.compile_matcher();

    let mut newest: Option<PathBuf> = None;
    for entry in WalkDir::new(dir).min_depth(1).max_depth(1) {
        let entry = entry?;
        if entry.file_type().is_file() && matcher.is_match(entry.file_name()) {
            let path = entry.into_path();
            if newest.as_ref().map_or(true, |n| path > *n) {
                newest = Some(path);
            }
        }
    }
    Ok(newest)
}

fn status_embed(stats: &TenantStats, now: DateTime<Utc>, run_url: Option<&str>) -> Embed {
    let healthy = stats.is_healthy();
    let mut body = vec![if healthy {
        "Daily pipeline ran today.".to_string()
    } else {
        "No daily snapshot for today.".to_string()
    }];
    for (window, ts) in &stats.last_capture {
        let shown = ts
            .map(|t| t.format("%Y-%m-%d %H:%M UTC").to_string())
            .unwrap_or_else(|| "never".to_string());
        body.push(format!("{:<14} last capture {}", window.label(), shown));
    }

    build_embed(
        &format!(
            "{} HUD Status — {}",
            if healthy { "✅" } else { "❌" },
            stats.tenant
        ),
        &body.join("\n"),
        if healthy { COLOR_GREEN } else { COLOR_RED },
        &stats.tenant,
        now,
        run_url,
        vec![
            EmbedField::inline("Members", stats.members),
            EmbedField::inline("With points", stats.with_points_all),
            EmbedField::inline("Leaderboard rows", stats.leaderboard_rows),
            EmbedField::inline("Daily today", stats.daily_today),
        ],
    )
}

fn report_source(config: &Config, tenant: &str, mode: Mode) -> Result<Option<PathBuf>> {
    let dir = config.reports_dir_for(tenant);
    let path = match mode {
        Mode::Status => return Ok(None),
        Mode::Kpi => return newest_report(&dir, "kpi_*.md"),
        Mode::Movers => dir.join("leaderboard_delta_true_7.md"),
        Mode::Health => dir.join(health::SUMMARY_FILE),
        Mode::Joiners => dir.join(joiners::WEEK_FILE),
    };
    Ok(path.is_file().then_some(path))
}

fn report_style(mode: Mode) -> (&'static str, u32) {
    match mode {
        Mode::Status => ("HUD Status", COLOR_GREEN),
        Mode::Kpi => ("📊 Daily KPI", COLOR_BLUE),
        Mode::Movers => ("📈 Leaderboard Movers (7 days)", COLOR_GOLD),
        Mode::Health => ("🩺 Member Health", COLOR_PURPLE),
        Mode::Joiners => ("👋 New Joiners This Week", COLOR_GREEN),
    }
}

/// Run one notification mode for a tenant.
pub async fn notify(
    notifier: &DiscordNotifier,
    pool: &SqlitePool,
    config: &Config,
    tenant: &TenantConfig,
    mode: Mode,
    run_url: Option<&str>,
    now: DateTime<Utc>,
) -> Result<NotifyOutcome> {
    if mode == Mode::Status {
        let stats = collect_stats(pool, &tenant.slug, now.date_naive()).await?;
        let embed = status_embed(&stats, now, run_url);

        let sent = notifier.send(Channel::Status, &embed).await?;
        if !stats.is_healthy() {
            warn!(tenant = %tenant.slug, "no daily snapshot today");
            let alerts = notifier.webhook_for(Channel::Alerts);
            if alerts.is_some() && alerts != notifier.webhook_for(Channel::Status) {
                notifier.send(Channel::Alerts, &embed).await?;
            }
        }
        return Ok(if sent {
            NotifyOutcome::Sent
        } else {
            NotifyOutcome::Skipped("no webhook".to_string())
        });
    }

    let Some(path) = report_source(config, &tenant.slug, mode)? else {
        warn!(tenant = %tenant.slug, mode = %mode, "report not found, skipping");
        return Ok(NotifyOutcome::Skipped("report not found".to_string()));
    };

    let body = std::fs::read_to_string(&path)
        .with_context(|| format!("Failed to read report: {}", path.display()))?;
    let (title, color) = report_style(mode);
    let embed = build_embed(
        &format!("{} — {}", title, tenant.slug),
        &body,
        color,
        &tenant.slug,
        now,
        run_url,
        Vec::new(),
    );

    if notifier.send(mode.channel(), &embed).await? {
        info!(tenant = %tenant.slug, mode = %mode, report = %path.display(), "notification sent");
        Ok(NotifyOutcome::Sent)
    } else {
        Ok(NotifyOutcome::Skipped("no webhook".to_string()))
    }
}

/// CLI entry point for `hud notify <mode>`.
pub async fn run_notify(
    config: &Config,
    tenant: &TenantConfig,
    mode: Mode,
    run_url: Option<&str>,
) -> Result<()> {
    let pool = db::connect(config).await?;
    let notifier = DiscordNotifier::new(&config.discord)?;

    let outcome = notify(&notifier, &pool, config, tenant, mode, run_url, Utc::now()).await?;
    match outcome {
        NotifyOutcome::Sent => println!("notify {} {}: sent", mode, tenant.slug),
        NotifyOutcome::Skipped(reason) => {
            println!("notify {} {}: skipped ({})", mode, tenant.slug, reason)
        }
    }

    pool.close().await;
    Ok(())
}
