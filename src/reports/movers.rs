//! Top point holders per window, read from the current member table.
//!
//! Unlike [`super::delta`] this needs no capture history, so it is useful
//! right after the first ingestion.

use anyhow::Result;
use std::cmp::Reverse;
use std::path::{Path, PathBuf};

use community_hud_core::render::EMPTY_SECTION;

use super::write_report;
use crate::models::{Member, Window};

pub const FILE: &str = "leaderboard_movers.md";

const TOP: usize = 15;

/// Windows in report order, shortest first.
const ORDER: [Window; 3] = [Window::Days7, Window::Days30, Window::AllTime];

/// Members with points in `window`, highest first.
pub fn top_by_points(members: &[Member], window: Window, n: usize) -> Vec<(String, i64)> {
    let mut ranked: Vec<(&Member, i64)> = members
        .iter()
        .filter_map(|m| m.points_for(window).map(|p| (m, p)))
        .collect();
    ranked.sort_by_key(|(m, p)| (Reverse(*p), m.user_id.clone()));
    ranked
        .into_iter()
        .take(n)
        .map(|(m, p)| (m.display_name(), p))
        .collect()
}

pub fn render(members: &[Member]) -> String {
    let mut lines = vec!["# Leaderboard Movers (Current Points)".to_string()];
    for window in ORDER {
        lines.push(String::new());
        lines.push(format!("## Top {} — {}", TOP, window.label()));
        let top = top_by_points(members, window, TOP);
        if top.is_empty() {
            lines.push(EMPTY_SECTION.to_string());
        }
        for (i, (name, points)) in top.iter().enumerate() {
            lines.push(format!("{:>2}. {}  {} pts", i + 1, name, points));
        }
    }
    lines.join("\n") + "\n"
}

pub fn write_movers(dir: &Path, members: &[Member]) -> Result<PathBuf> {
    write_report(dir, FILE, &render(members))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_top_fifteen_per_window() {
        let members: Vec<Member> = (1..=20)
            .map(|i| Member {
                user_id: format!("u{:02}", i),
                name: Some(format!("M{}", i)),
                points_7d: Some(i),
                points_all: (i % 2 == 0).then_some(i * 100),
                ..Default::default()
            })
            .collect();

        let week = top_by_points(&members, Window::Days7, TOP);
        assert_eq!(week.len(), 15);
        assert_eq!(week[0], ("M20".to_string(), 20));
        assert_eq!(week[14], ("M6".to_string(), 6));

        assert_eq!(top_by_points(&members, Window::AllTime, TOP).len(), 10);
        assert!(top_by_points(&members, Window::Days30, TOP).is_empty());

        let doc = render(&members);
        assert!(doc.contains("## Top 15 — Past 7 Days\n 1. M20  20 pts\n 2. M19  19 pts"));
        assert!(doc.contains("## Top 15 — Past 30 Days\n- (none)"));
        assert!(doc.contains("## Top 15 — All-Time\n 1. M20  2000 pts"));
    }

    #[test]
    fn test_ties_ordered_by_user_id() {
        let members = vec![
            Member {
                user_id: "b".into(),
                name: Some("Bee".into()),
                points_30d: Some(5),
                ..Default::default()
            },
            Member {
                user_id: "a".into(),
                name: Some("Ay".into()),
                points_30d: Some(5),
                ..Default::default()
            },
        ];
        let top = top_by_points(&members, Window::Days30, TOP);
        assert_eq!(top[0].0, "Ay");
        assert_eq!(top[1].0, "Bee");
    }
}
