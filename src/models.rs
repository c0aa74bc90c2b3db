//! Data types used by the application crate.
//!
//! Leaderboard types come from [`community_hud_core::models`]; this module
//! adds the member records that flow from the normalizer into SQLite and
//! from SQLite into the reports. Each type is built once at the store
//! boundary so downstream code never inspects raw JSON or rows.

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};

pub use community_hud_core::models::{
    fallback_name, CaptureTime, NameFields, SnapshotRow, Standing, Window,
};

/// Member fields extracted from a raw members capture.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MemberRecord {
    pub user_id: String,
    pub member_id: Option<String>,
    pub handle: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub name: Option<String>,
    pub email: Option<String>,
    pub joined_date: Option<String>,
    pub approved_at: Option<String>,
    pub role: Option<String>,
    pub bio: Option<String>,
    pub location: Option<String>,
    pub link_website: Option<String>,
    pub link_instagram: Option<String>,
    pub link_linkedin: Option<String>,
    pub link_facebook: Option<String>,
    pub link_youtube: Option<String>,
    pub last_active_raw: Option<String>,
    pub updated_at_raw: Option<String>,
    pub level_current: Option<i64>,
    pub points_all: Option<i64>,
}

/// One entry of a raw leaderboard capture.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeaderboardEntry {
    pub user_id: String,
    pub points: Option<i64>,
    pub rank: Option<i64>,
}

/// Current-state member row as read back for reports.
#[derive(Debug, Clone, Default)]
pub struct Member {
    pub user_id: String,
    pub name: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub handle: Option<String>,
    pub joined_date: Option<String>,
    pub level_current: Option<i64>,
    pub points_7d: Option<i64>,
    pub rank_7d: Option<i64>,
    pub points_30d: Option<i64>,
    pub rank_30d: Option<i64>,
    pub points_all: Option<i64>,
    pub rank_all: Option<i64>,
    pub last_active_at_utc: Option<String>,
}

impl Member {
    /// Display name by the shared precedence, falling back to `user:<id>`.
    pub fn display_name(&self) -> String {
        NameFields {
            name: self.name.clone(),
            first_name: self.first_name.clone(),
            last_name: self.last_name.clone(),
            handle: self.handle.clone(),
        }
        .display_name()
        .unwrap_or_else(|| fallback_name(&self.user_id))
    }

    pub fn last_active(&self) -> Option<DateTime<Utc>> {
        self.last_active_at_utc.as_deref().and_then(parse_utc)
    }

    pub fn joined(&self) -> Option<DateTime<Utc>> {
        self.joined_date.as_deref().and_then(parse_utc)
    }

    /// Current points mirrored from the latest capture of `window`.
    pub fn points_for(&self, window: Window) -> Option<i64> {
        match window {
            Window::AllTime => self.points_all,
            Window::Days30 => self.points_30d,
            Window::Days7 => self.points_7d,
        }
    }
}

/// Capture timestamps are stored as Unix milliseconds.
pub fn to_millis(ts: &CaptureTime) -> i64 {
    ts.timestamp_millis()
}

pub fn from_millis(ms: i64) -> Option<CaptureTime> {
    Utc.timestamp_millis_opt(ms).single()
}

/// Parse the timestamp shapes the platform emits into UTC.
///
/// Accepts RFC 3339, naive `YYYY-MM-DD HH:MM:SS` / `YYYY-MM-DDTHH:MM:SS[.f]`
/// (taken as UTC), bare dates, and Unix epochs in seconds or milliseconds.
pub fn parse_utc(raw: &str) -> Option<DateTime<Utc>> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }

    for fmt in ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(naive.and_utc());
        }
    }

    if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return date.and_hms_opt(0, 0, 0).map(|d| d.and_utc());
    }

    if let Ok(epoch) = s.parse::<f64>() {
        return parse_epoch(epoch);
    }

    None
}

/// Interpret a numeric epoch; values past year 33658 in seconds are
/// treated as milliseconds.
pub fn parse_epoch(epoch: f64) -> Option<DateTime<Utc>> {
    if !epoch.is_finite() || epoch < 0.0 {
        return None;
    }
    let millis = if epoch > 1e12 { epoch } else { epoch * 1000.0 };
    Utc.timestamp_millis_opt(millis as i64).single()
}
