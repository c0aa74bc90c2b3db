//! Dated export of the member table.
//!
//! Writes `snapshot_members_<date>.json` with one record per member and a
//! short `snapshot_<date>.md` summary pointing at it.

use anyhow::Result;
use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use std::path::{Path, PathBuf};

use super::write_report;
use crate::models::Member;

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct MemberExport {
    pub tenant: String,
    pub user_id: String,
    pub name: String,
    pub level_current: i64,
    pub points_7d: i64,
    pub points_30d: i64,
    pub points_all: i64,
    pub rank_7d: Option<i64>,
    pub rank_30d: Option<i64>,
    pub rank_all: Option<i64>,
    pub last_active_at_utc: Option<String>,
    pub joined_date: Option<String>,
}

pub fn data_file(day: NaiveDate) -> String {
    format!("snapshot_members_{}.json", day)
}

pub fn summary_file(day: NaiveDate) -> String {
    format!("snapshot_{}.md", day)
}

pub fn export_rows(tenant: &str, members: &[Member]) -> Vec<MemberExport> {
    members
        .iter()
        .map(|m| MemberExport {
            tenant: tenant.to_string(),
            user_id: m.user_id.clone(),
            name: m.display_name(),
            level_current: m.level_current.unwrap_or(0),
            points_7d: m.points_7d.unwrap_or(0),
            points_30d: m.points_30d.unwrap_or(0),
            points_all: m.points_all.unwrap_or(0),
            rank_7d: m.rank_7d,
            rank_30d: m.rank_30d,
            rank_all: m.rank_all,
            last_active_at_utc: m.last_active().map(|t| t.to_rfc3339()),
            joined_date: m.joined().map(|t| t.to_rfc3339()),
        })
        .collect()
}

pub fn render_summary(tenant: &str, rows: usize, now: DateTime<Utc>) -> String {
    let day = now.date_naive();
    format!(
        "# Snapshot — {} — {}\n\n- **Rows:** {}\n- **File:** {}\n- **Generated:** {} UTC\n",
        tenant,
        day,
        rows,
        data_file(day),
        now.format("%Y-%m-%d %H:%M")
    )
}

pub fn write_export(
    dir: &Path,
    tenant: &str,
    members: &[Member],
    now: DateTime<Utc>,
) -> Result<Vec<PathBuf>> {
    let rows = export_rows(tenant, members);
    let day = now.date_naive();
    let json = serde_json::to_string_pretty(&rows)?;
    Ok(vec![
        write_report(dir, &data_file(day), &json)?,
        write_report(dir, &summary_file(day), &render_summary(tenant, rows.len(), now))?,
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_export_defaults_and_files() {
        let now = Utc.with_ymd_and_hms(2026, 10, 19, 6, 30, 0).unwrap();
        let members = vec![
            Member {
                user_id: "u1".into(),
                first_name: Some("Ann".into()),
                points_7d: Some(12),
                rank_7d: Some(1),
                joined_date: Some("2026-01-05 10:00:00".into()),
                ..Default::default()
            },
            Member {
                user_id: "u2".into(),
                ..Default::default()
            },
        ];

        let rows = export_rows("alley", &members);
        assert_eq!(rows[0].name, "Ann");
        assert_eq!(rows[0].points_7d, 12);
        assert_eq!(rows[0].joined_date.as_deref(), Some("2026-01-05T10:00:00+00:00"));
        assert_eq!(rows[1].name, "user:u2");
        assert_eq!((rows[1].points_all, rows[1].rank_all), (0, None));

        let tmp = tempfile::TempDir::new().unwrap();
        let paths = write_export(tmp.path(), "alley", &members, now).unwrap();
        assert!(paths[0].ends_with("snapshot_members_2026-10-19.json"));

        let parsed: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&paths[0]).unwrap()).unwrap();
        assert_eq!(parsed.as_array().map(Vec::len), Some(2));
        assert_eq!(parsed[0]["tenant"], "alley");

        let summary = std::fs::read_to_string(&paths[1]).unwrap();
        assert!(summary.starts_with("# Snapshot — alley — 2026-10-19\n"));
        assert!(summary.contains("- **Rows:** 2"));
    }
}
