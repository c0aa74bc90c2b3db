//! Core data models shared by the delta engine, the stores, and the
//! application crate.

use std::fmt;
use std::str::FromStr;

use anyhow::bail;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Timestamp of a capture batch. Every row written by one normalizer run
/// for one window carries the same value.
pub type CaptureTime = DateTime<Utc>;

/// Rank used in arithmetic when a user has no rank, i.e. "last place".
pub const UNRANKED: i64 = 1_000_000_000;

/// Leaderboard aggregation period.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Window {
    AllTime,
    Days30,
    Days7,
}

impl Window {
    /// All windows in report order.
    pub const ALL: [Window; 3] = [Window::AllTime, Window::Days30, Window::Days7];

    /// Storage and file-name key (`all`, `30`, `7`).
    pub fn key(&self) -> &'static str {
        match self {
            Window::AllTime => "all",
            Window::Days30 => "30",
            Window::Days7 => "7",
        }
    }

    /// Display label.
    pub fn label(&self) -> &'static str {
        match self {
            Window::AllTime => "All-Time",
            Window::Days30 => "Past 30 Days",
            Window::Days7 => "Past 7 Days",
        }
    }

    /// Bucket name used by the platform's leaderboard JSON.
    pub fn bucket(&self) -> &'static str {
        match self {
            Window::AllTime => "allTime",
            Window::Days30 => "past30Days",
            Window::Days7 => "past7Days",
        }
    }
}

impl fmt::Display for Window {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

impl FromStr for Window {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s.trim() {
            "all" => Ok(Window::AllTime),
            "30" => Ok(Window::Days30),
            "7" => Ok(Window::Days7),
            other => bail!("Unknown window: '{}'. Must be all, 30, or 7.", other),
        }
    }
}

/// One leaderboard row as read from the snapshot store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotRow {
    pub user_id: String,
    pub points: Option<i64>,
    pub rank: Option<i64>,
}

impl SnapshotRow {
    pub fn new(user_id: impl Into<String>, points: Option<i64>, rank: Option<i64>) -> Self {
        Self {
            user_id: user_id.into(),
            points,
            rank,
        }
    }
}

/// A user's position within one capture batch. Missing points are already
/// folded to zero; a missing rank stays `None`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Standing {
    pub points: i64,
    pub rank: Option<i64>,
}

impl From<&SnapshotRow> for Standing {
    fn from(row: &SnapshotRow) -> Self {
        Standing {
            points: row.points.unwrap_or(0),
            rank: row.rank,
        }
    }
}

/// Map a nullable rank to a sortable integer; unranked sorts last.
pub fn normalize_rank(rank: Option<i64>) -> i64 {
    rank.unwrap_or(UNRANKED)
}

/// Profile fields a display name can be derived from.
#[derive(Debug, Clone, Default)]
pub struct NameFields {
    pub name: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub handle: Option<String>,
}

impl NameFields {
    /// Resolve a display name using the fixed precedence
    /// `name` > `first_name last_name` > `handle`. Blank values are skipped.
    pub fn display_name(&self) -> Option<String> {
        if let Some(name) = non_blank(&self.name) {
            return Some(name.to_string());
        }

        let full: Vec<&str> = [non_blank(&self.first_name), non_blank(&self.last_name)]
            .into_iter()
            .flatten()
            .collect();
        if !full.is_empty() {
            return Some(full.join(" "));
        }

        non_blank(&self.handle).map(str::to_string)
    }
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

/// Fallback display for users without a name on record.
pub fn fallback_name(user_id: &str) -> String {
    format!("user:{}", user_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_window_roundtrip_keys() {
        for w in Window::ALL {
            assert_eq!(w.key().parse::<Window>().unwrap(), w);
        }
        assert!("14".parse::<Window>().is_err());
    }

    #[test]
    fn test_normalize_rank_sentinel() {
        assert_eq!(normalize_rank(Some(3)), 3);
        assert_eq!(normalize_rank(None), UNRANKED);
    }

    #[test]
    fn test_display_name_precedence() {
        let mut fields = NameFields {
            name: Some("Alice".into()),
            first_name: Some("Al".into()),
            last_name: Some("Ice".into()),
            handle: Some("alice-1".into()),
        };
        assert_eq!(fields.display_name().as_deref(), Some("Alice"));

        fields.name = Some("   ".into());
        assert_eq!(fields.display_name().as_deref(), Some("Al Ice"));

        fields.first_name = None;
        fields.last_name = None;
        assert_eq!(fields.display_name().as_deref(), Some("alice-1"));

        fields.handle = None;
        assert_eq!(fields.display_name(), None);
    }
}
