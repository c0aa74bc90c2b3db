//! Daily KPI report.

use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use std::cmp::Reverse;
use std::path::{Path, PathBuf};

use community_hud_core::models::normalize_rank;
use community_hud_core::render::EMPTY_SECTION;

use super::write_report;
use crate::models::Member;

#[derive(Debug, Clone, PartialEq)]
pub struct TopMember {
    pub name: String,
    pub points: i64,
    pub rank: Option<i64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct KpiSummary {
    pub total: usize,
    pub active_7d: usize,
    pub active_30d: usize,
    pub with_points_all: usize,
    pub joined_7d: usize,
    pub top: Vec<TopMember>,
}

fn percent(part: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        part as f64 * 100.0 / total as f64
    }
}

/// Aggregate KPI figures. A member is active in a window when its points
/// there are positive.
pub fn summarize(members: &[Member], now: DateTime<Utc>) -> KpiSummary {
    let positive = |p: Option<i64>| p.is_some_and(|p| p > 0);
    let join_cutoff = now - Duration::days(7);

    let mut ranked: Vec<&Member> = members.iter().filter(|m| m.points_all.is_some()).collect();
    ranked.sort_by_key(|m| {
        (
            Reverse(m.points_all.unwrap_or(0)),
            normalize_rank(m.rank_all),
            m.user_id.clone(),
        )
    });

    KpiSummary {
        total: members.len(),
        active_7d: members.iter().filter(|m| positive(m.points_7d)).count(),
        active_30d: members.iter().filter(|m| positive(m.points_30d)).count(),
        with_points_all: ranked.len(),
        joined_7d: members
            .iter()
            .filter(|m| m.joined().is_some_and(|j| j >= join_cutoff))
            .count(),
        top: ranked
            .into_iter()
            .take(5)
            .map(|m| TopMember {
                name: m.display_name(),
                points: m.points_all.unwrap_or(0),
                rank: m.rank_all,
            })
            .collect(),
    }
}

pub fn render(tenant: &str, summary: &KpiSummary, now: DateTime<Utc>) -> String {
    let mut lines = vec![
        format!("# Daily KPI — {} — {}", tenant, now.date_naive()),
        String::new(),
        format!("- **Members total:** {}", summary.total),
        format!(
            "- **Active (7 days):** {} ({:.1}%)",
            summary.active_7d,
            percent(summary.active_7d, summary.total)
        ),
        format!(
            "- **Active (30 days):** {} ({:.1}%)",
            summary.active_30d,
            percent(summary.active_30d, summary.total)
        ),
        format!("- **With all-time points:** {}", summary.with_points_all),
        format!("- **New joiners (7 days):** {}", summary.joined_7d),
        format!("- **Generated:** {} UTC", now.format("%Y-%m-%d %H:%M")),
        String::new(),
        "## Top 5 (All-Time Points)".to_string(),
    ];

    if summary.top.is_empty() {
        lines.push(EMPTY_SECTION.to_string());
    }
    for top in &summary.top {
        let rank = top.rank.map_or_else(|| "-".to_string(), |r| r.to_string());
        lines.push(format!("- #{}  {} — {} pts", rank, top.name, top.points));
    }

    lines.join("\n") + "\n"
}

/// KPI file name for the day of `now`.
pub fn file_name(now: DateTime<Utc>) -> String {
    format!("kpi_{}.md", now.date_naive())
}

pub fn write_kpi(dir: &Path, tenant: &str, members: &[Member], now: DateTime<Utc>) -> Result<PathBuf> {
    let summary = summarize(members, now);
    write_report(dir, &file_name(now), &render(tenant, &summary, now))
}
