//! New-joiner lists by join date.

use anyhow::Result;
use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc};
use std::path::{Path, PathBuf};

use community_hud_core::render::EMPTY_SECTION;

use super::write_report;
use crate::models::Member;

pub const WEEK_FILE: &str = "new_joiners_week.md";
pub const LAST_WEEK_FILE: &str = "new_joiners_last_week.md";
pub const DAYS_30_FILE: &str = "new_joiners_30d.md";

#[derive(Debug, Default, PartialEq)]
pub struct JoinerLists {
    pub this_week: Vec<String>,
    pub last_week: Vec<String>,
    pub last_30d: Vec<String>,
}

fn relative(joined: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let elapsed = now - joined;
    if elapsed < Duration::days(1) {
        match elapsed.num_hours() {
            h if h <= 0 => "(<1 hour ago)".to_string(),
            1 => "(1 hour ago)".to_string(),
            h => format!("({} hours ago)", h),
        }
    } else {
        match elapsed.num_days() {
            1 => "(1 day ago)".to_string(),
            d => format!("({} days ago)", d),
        }
    }
}

fn entry(member: &Member, joined: DateTime<Utc>, now: DateTime<Utc>) -> String {
    format!(
        "{} - joined on {} {}",
        member.display_name(),
        joined.format("%d.%m.%Y"),
        relative(joined, now)
    )
}

/// Split members into the current ISO week (from Monday), the previous
/// week, and the last 30 days. Newest joiners come first.
pub fn classify_joiners(members: &[Member], now: DateTime<Utc>) -> JoinerLists {
    let today: NaiveDate = now.date_naive();
    let start_this_week = today - Duration::days(i64::from(today.weekday().num_days_from_monday()));
    let start_last_week = start_this_week - Duration::days(7);
    let cutoff_30 = today - Duration::days(30);

    let mut joined: Vec<(DateTime<Utc>, &Member)> = members
        .iter()
        .filter_map(|m| m.joined().map(|j| (j, m)))
        .collect();
    joined.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| a.1.user_id.cmp(&b.1.user_id)));

    let mut lists = JoinerLists::default();
    for (at, member) in joined {
        let day = at.date_naive();
        let line = entry(member, at, now);
        if day >= start_this_week {
            lists.this_week.push(line.clone());
        }
        if day >= start_last_week && day < start_this_week {
            lists.last_week.push(line.clone());
        }
        if day >= cutoff_30 {
            lists.last_30d.push(line);
        }
    }
    lists
}

fn render_list(entries: &[String]) -> String {
    if entries.is_empty() {
        return format!("{}\n", EMPTY_SECTION);
    }
    entries.iter().map(|e| format!("- {}\n", e)).collect()
}

pub fn write_joiners(dir: &Path, members: &[Member], now: DateTime<Utc>) -> Result<Vec<PathBuf>> {
    let lists = classify_joiners(members, now);
    Ok(vec![
        write_report(dir, WEEK_FILE, &render_list(&lists.this_week))?,
        write_report(dir, LAST_WEEK_FILE, &render_list(&lists.last_week))?,
        write_report(dir, DAYS_30_FILE, &render_list(&lists.last_30d))?,
    ])
}
