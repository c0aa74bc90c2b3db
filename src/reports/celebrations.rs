//! Celebrations digest: this week's top scorers and the newest members.

use anyhow::Result;
use chrono::{DateTime, Utc};
use std::cmp::Reverse;
use std::path::{Path, PathBuf};

use community_hud_core::render::EMPTY_SECTION;

use super::write_report;
use crate::models::Member;

const LIST_LEN: usize = 5;

pub fn file_name(now: DateTime<Utc>) -> String {
    format!("celebrations_{}.md", now.date_naive())
}

pub fn render(tenant: &str, members: &[Member], now: DateTime<Utc>) -> String {
    let mut scorers: Vec<&Member> = members.iter().filter(|m| m.points_7d.is_some()).collect();
    scorers.sort_by_key(|m| (Reverse(m.points_7d.unwrap_or(0)), m.user_id.clone()));

    let mut joiners: Vec<(&Member, DateTime<Utc>)> = members
        .iter()
        .filter_map(|m| m.joined().map(|j| (m, j)))
        .collect();
    joiners.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.user_id.cmp(&b.0.user_id)));

    let mut lines = vec![
        format!("# Celebrations — {} — {}", tenant, now.date_naive()),
        String::new(),
        "## Top Scorers (7 days)".to_string(),
    ];
    if scorers.is_empty() {
        lines.push(EMPTY_SECTION.to_string());
    }
    for m in scorers.iter().take(LIST_LEN) {
        lines.push(format!("- {} — {} pts", m.display_name(), m.points_7d.unwrap_or(0)));
    }

    lines.push(String::new());
    lines.push("## Newest Members".to_string());
    if joiners.is_empty() {
        lines.push(EMPTY_SECTION.to_string());
    }
    for (m, joined) in joiners.iter().take(LIST_LEN) {
        lines.push(format!(
            "- {} — joined {}",
            m.display_name(),
            joined.format("%d.%m.%Y")
        ));
    }

    lines.join("\n") + "\n"
}

pub fn write_celebrations(
    dir: &Path,
    tenant: &str,
    members: &[Member],
    now: DateTime<Utc>,
) -> Result<PathBuf> {
    write_report(dir, &file_name(now), &render(tenant, members, now))
}
