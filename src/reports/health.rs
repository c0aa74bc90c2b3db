//! Member health scores.
//!
//! A score in `0.0..=100.0` blends recent points, level, and how recently
//! the member was active:
//!
//! ```text
//! score = round1(100 × (0.40·s7 + 0.30·s30 + 0.20·recency + 0.10·level))
//! ```
//!
//! The full table goes to `member_health.json`; the summary lists the top
//! advocates and the members at risk.

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::{Path, PathBuf};

use community_hud_core::render::EMPTY_SECTION;

use super::write_report;
use crate::models::Member;

pub const JSON_FILE: &str = "member_health.json";
pub const SUMMARY_FILE: &str = "member_health_summary.md";

const LIST_LEN: usize = 10;
const AT_RISK_BELOW: f64 = 40.0;

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct HealthRow {
    pub user_id: String,
    pub name: String,
    pub level: i64,
    pub points_7d: i64,
    pub points_30d: i64,
    pub points_all: i64,
    pub last_active_at_utc: Option<String>,
    pub score: f64,
}

impl HealthRow {
    pub fn is_at_risk(&self) -> bool {
        self.score < AT_RISK_BELOW && (self.points_30d > 0 || self.points_all > 50)
    }
}

fn norm(value: i64, high: i64) -> f64 {
    if value <= 0 || high <= 0 {
        0.0
    } else {
        (value as f64 / high as f64).min(1.0)
    }
}

/// Recency bonus by days since last activity.
pub fn recency_bonus(last_active: Option<DateTime<Utc>>, now: DateTime<Utc>) -> f64 {
    let Some(last) = last_active else {
        return 0.0;
    };
    let days = (now - last).num_seconds() as f64 / 86_400.0;
    match days {
        d if d <= 1.0 => 1.0,
        d if d <= 3.0 => 0.9,
        d if d <= 7.0 => 0.8,
        d if d <= 14.0 => 0.6,
        d if d <= 30.0 => 0.4,
        d if d <= 60.0 => 0.2,
        _ => 0.0,
    }
}

pub fn health_score(
    points_7d: i64,
    points_30d: i64,
    level: i64,
    last_active: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> f64 {
    let s7 = norm(points_7d, points_7d.max(50).max(200));
    let s30 = norm(points_30d, points_30d.max(150).max(600));
    let lvl = norm(level, 20);
    let recency = recency_bonus(last_active, now);

    let raw = 100.0 * (0.40 * s7 + 0.30 * s30 + 0.20 * recency + 0.10 * lvl);
    (raw * 10.0).round() / 10.0
}

pub fn score_members(members: &[Member], now: DateTime<Utc>) -> Vec<HealthRow> {
    members
        .iter()
        .map(|m| {
            let points_7d = m.points_7d.unwrap_or(0);
            let points_30d = m.points_30d.unwrap_or(0);
            let level = m.level_current.unwrap_or(0);
            HealthRow {
                user_id: m.user_id.clone(),
                name: m.display_name(),
                level,
                points_7d,
                points_30d,
                points_all: m.points_all.unwrap_or(0),
                last_active_at_utc: m.last_active_at_utc.clone(),
                score: health_score(points_7d, points_30d, level, m.last_active(), now),
            }
        })
        .collect()
}

/// Highest scores first.
pub fn advocates(rows: &[HealthRow]) -> Vec<&HealthRow> {
    let mut sorted: Vec<&HealthRow> = rows.iter().collect();
    sorted.sort_by(|a, b| b.score.total_cmp(&a.score).then_with(|| a.user_id.cmp(&b.user_id)));
    sorted.truncate(LIST_LEN);
    sorted
}

/// Lowest at-risk scores first.
pub fn at_risk(rows: &[HealthRow]) -> Vec<&HealthRow> {
    let mut sorted: Vec<&HealthRow> = rows.iter().filter(|r| r.is_at_risk()).collect();
    sorted.sort_by(|a, b| a.score.total_cmp(&b.score).then_with(|| a.user_id.cmp(&b.user_id)));
    sorted.truncate(LIST_LEN);
    sorted
}

pub fn render_summary(rows: &[HealthRow]) -> String {
    let mut lines = vec![
        "# Member Health — Top Advocates & At Risk".to_string(),
        String::new(),
        format!("## Advocates (Top {})", LIST_LEN),
    ];

    let top = advocates(rows);
    if top.is_empty() {
        lines.push(EMPTY_SECTION.to_string());
    }
    for r in top {
        lines.push(format!(
            "- {} — score {:.1} | 7d:{} 30d:{} lvl:{}",
            r.name, r.score, r.points_7d, r.points_30d, r.level
        ));
    }

    lines.push(String::new());
    lines.push(format!("## At Risk (Top {})", LIST_LEN));
    let risky = at_risk(rows);
    if risky.is_empty() {
        lines.push(EMPTY_SECTION.to_string());
    }
    for r in risky {
        lines.push(format!(
            "- {} — score {:.1} | 7d:{} 30d:{} all:{}",
            r.name, r.score, r.points_7d, r.points_30d, r.points_all
        ));
    }

    lines.join("\n") + "\n"
}

pub fn write_health(dir: &Path, members: &[Member], now: DateTime<Utc>) -> Result<Vec<PathBuf>> {
    let rows = score_members(members, now);
    let json = serde_json::to_string_pretty(&rows)?;
    Ok(vec![
        write_report(dir, JSON_FILE, &json)?,
        write_report(dir, SUMMARY_FILE, &render_summary(&rows))?,
    ])
}
