//! Normalization of raw captures into the relational store.
//!
//! - **Members**: member entries are located anywhere in the captured JSON,
//!   mapped through [`MEMBER_FIELDS`] and upserted into `members`.
//! - **Leaderboards**: each window's entry list is appended to
//!   `leaderboard_snapshots` as one capture batch (shared `captured_at` and
//!   `batch_id`) and mirrored into the members' current points/rank.
//!
//! Every ingested file is recorded in `raw_snapshots` by content hash; the
//! same file is not ingested twice for a route unless forced.

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use sqlx::SqlitePool;
use std::collections::HashSet;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::{Config, TenantConfig};
use crate::db;
use crate::models::{parse_epoch, parse_utc, to_millis, LeaderboardEntry, MemberRecord, Window};
use crate::raw::{self, as_int, as_text, first_present, get_path, RawCapture};

/// Counts reported by a normalization pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NormalizeStats {
    pub inserted: u64,
    pub updated: u64,
    pub scanned: u64,
}

/// What happened to one route during a normalization run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NormalizeOutcome {
    Ingested(NormalizeStats),
    AlreadyIngested,
    NoRawFile,
}

/// Which raw route `hud normalize` processes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    Members,
    Leaderboard,
}

/// Member fields and the JSON paths they are read from, in precedence
/// order. The first non-null path wins.
pub const MEMBER_FIELDS: &[(&str, &[&str])] = &[
    ("user_id", &["user.id"]),
    ("member_id", &["member.id"]),
    ("handle", &["user.name"]),
    ("first_name", &["user.firstName"]),
    ("last_name", &["user.lastName"]),
    ("name", &["user.firstName", "member.firstName"]),
    (
        "email",
        &["member.searchAnswer", "member.metadata.survey.answer", "user.email"],
    ),
    ("joined_date", &["member.createdAt", "user.createdAt"]),
    ("approved_at", &["member.approvedAt"]),
    ("role", &["member.role"]),
    ("bio", &["user.metadata.bio"]),
    (
        "location",
        &["user.metadata.location", "member.metadata.requestLocation"],
    ),
    ("link_website", &["user.metadata.linkWebsite"]),
    ("link_instagram", &["user.metadata.linkInstagram"]),
    ("link_linkedin", &["user.metadata.linkLinkedin"]),
    ("link_facebook", &["user.metadata.linkFacebook"]),
    ("link_youtube", &["user.metadata.linkYoutube"]),
    (
        "last_active_raw",
        &["member.lastOffline", "user.metadata.lastOffline"],
    ),
    ("updated_at_raw", &["user.updatedAt"]),
];

// ─── Members ────────────────────────────────────────────────────────

fn looks_like_user(obj: &Map<String, Value>) -> bool {
    let has_name = ["firstName", "lastName", "name"]
        .iter()
        .any(|k| obj.contains_key(*k));
    has_name && (obj.contains_key("id") || obj.contains_key("handle"))
}

/// Locate member entries anywhere in a raw members capture.
///
/// An entry is either an object holding both `user` and `member` objects,
/// or a bare user-like object (a name field plus `id` or `handle`), which
/// is wrapped as `{"user": <obj>, "member": <obj.member or {}>}`.
/// Traversal is pre-order, so wrappers are found before the user objects
/// nested inside them.
pub fn find_member_entries(root: &Value) -> Vec<Value> {
    let mut entries = Vec::new();
    let mut stack = vec![root];

    while let Some(node) = stack.pop() {
        match node {
            Value::Object(obj) => {
                let has_user = obj.get("user").is_some_and(Value::is_object);
                let has_member = obj.get("member").is_some_and(Value::is_object);

                if has_user && has_member {
                    entries.push(node.clone());
                } else if !has_user && looks_like_user(obj) {
                    let member = obj
                        .get("member")
                        .filter(|m| m.is_object())
                        .cloned()
                        .unwrap_or_else(|| Value::Object(Map::new()));
                    let mut wrapper = Map::new();
                    wrapper.insert("user".to_string(), node.clone());
                    wrapper.insert("member".to_string(), member);
                    entries.push(Value::Object(wrapper));
                }

                let children: Vec<&Value> = obj.values().collect();
                stack.extend(children.into_iter().rev());
            }
            Value::Array(items) => stack.extend(items.iter().rev()),
            _ => {}
        }
    }

    entries
}

/// Build a [`MemberRecord`] from one member entry. Entries without a user
/// id are rejected.
pub fn member_record(entry: &Value) -> Option<MemberRecord> {
    let field = |name: &str| -> Option<String> {
        MEMBER_FIELDS
            .iter()
            .find(|(f, _)| *f == name)
            .and_then(|(_, paths)| first_present(entry, paths))
            .and_then(as_text)
    };

    let user_id = field("user_id")?;

    let mut record = MemberRecord {
        user_id,
        member_id: field("member_id"),
        handle: field("handle"),
        first_name: field("first_name"),
        last_name: field("last_name"),
        name: field("name"),
        email: field("email"),
        joined_date: field("joined_date"),
        approved_at: field("approved_at"),
        role: field("role"),
        bio: field("bio"),
        location: field("location"),
        link_website: field("link_website"),
        link_instagram: field("link_instagram"),
        link_linkedin: field("link_linkedin"),
        link_facebook: field("link_facebook"),
        link_youtube: field("link_youtube"),
        last_active_raw: field("last_active_raw"),
        updated_at_raw: field("updated_at_raw"),
        level_current: None,
        points_all: None,
    };

    // spData: {"pts": 2269, "lv": 7, ...}, either embedded or as a JSON string
    if let Some(sp) = get_path(entry, "user.metadata.spData") {
        let parsed = match sp {
            Value::String(s) => serde_json::from_str::<Value>(s).ok(),
            other => Some(other.clone()),
        };
        if let Some(sp) = parsed.filter(Value::is_object) {
            record.level_current = sp.get("lv").and_then(as_int);
            record.points_all = sp.get("pts").and_then(as_int);
        }
    }

    Some(record)
}

fn last_active_utc(raw: &Option<String>) -> Option<DateTime<Utc>> {
    let raw = raw.as_deref()?;
    parse_utc(raw).or_else(|| raw.trim().parse::<f64>().ok().and_then(parse_epoch))
}

/// Upsert member records for a tenant.
///
/// Lookup is by `(tenant, user_id)`, then `(tenant, email)`. On update,
/// absent values never overwrite stored ones, `name`/`email`/`joined_date`
/// are only filled when still empty, and the last-active timestamp only
/// moves forward.
pub async fn ingest_members(
    pool: &SqlitePool,
    tenant: &str,
    records: &[MemberRecord],
    now: DateTime<Utc>,
) -> Result<NormalizeStats> {
    let mut stats = NormalizeStats::default();
    let mut tx = pool.begin().await?;

    for rec in records {
        stats.scanned += 1;
        let email = rec.email.as_deref().filter(|e| !e.trim().is_empty());

        let mut existing: Option<(i64, Option<String>)> = sqlx::query_as(
            "SELECT id, last_active_at_utc FROM members WHERE tenant = ? AND user_id = ?",
        )
        .bind(tenant)
        .bind(&rec.user_id)
        .fetch_optional(&mut *tx)
        .await?;

        if existing.is_none() {
            if let Some(email) = email {
                existing = sqlx::query_as(
                    "SELECT id, last_active_at_utc FROM members WHERE tenant = ? AND email = ? LIMIT 1",
                )
                .bind(tenant)
                .bind(email)
                .fetch_optional(&mut *tx)
                .await?;
            }
        }

        let candidate_active = last_active_utc(&rec.last_active_raw);

        match existing {
            None => {
                sqlx::query(
                    r#"
                    INSERT INTO members (tenant, user_id, member_id, handle, first_name, last_name,
                        name, email, joined_date, approved_at, role, bio, location,
                        link_website, link_instagram, link_linkedin, link_facebook, link_youtube,
                        last_active_raw, last_active_at_utc, updated_at_raw, level_current,
                        points_all, source_last_update, updated_at)
                    VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 'members', ?)
                    "#,
                )
                .bind(tenant)
                .bind(&rec.user_id)
                .bind(&rec.member_id)
                .bind(&rec.handle)
                .bind(&rec.first_name)
                .bind(&rec.last_name)
                .bind(&rec.name)
                .bind(email)
                .bind(&rec.joined_date)
                .bind(&rec.approved_at)
                .bind(&rec.role)
                .bind(&rec.bio)
                .bind(&rec.location)
                .bind(&rec.link_website)
                .bind(&rec.link_instagram)
                .bind(&rec.link_linkedin)
                .bind(&rec.link_facebook)
                .bind(&rec.link_youtube)
                .bind(&rec.last_active_raw)
                .bind(candidate_active.map(|dt| dt.to_rfc3339()))
                .bind(&rec.updated_at_raw)
                .bind(rec.level_current)
                .bind(rec.points_all)
                .bind(now.timestamp())
                .execute(&mut *tx)
                .await?;
                stats.inserted += 1;
            }
            Some((id, stored_active)) => {
                let stored = stored_active.as_deref().and_then(parse_utc);
                let advance = match (candidate_active, stored) {
                    (Some(new), Some(old)) => new > old,
                    (Some(_), None) => true,
                    (None, _) => false,
                };

                sqlx::query(
                    r#"
                    UPDATE members SET
                        user_id = ?,
                        member_id = COALESCE(?, member_id),
                        handle = COALESCE(?, handle),
                        first_name = COALESCE(?, first_name),
                        last_name = COALESCE(?, last_name),
                        name = COALESCE(name, ?),
                        email = COALESCE(email, ?),
                        joined_date = COALESCE(joined_date, ?),
                        approved_at = COALESCE(?, approved_at),
                        role = COALESCE(?, role),
                        bio = COALESCE(?, bio),
                        location = COALESCE(?, location),
                        link_website = COALESCE(?, link_website),
                        link_instagram = COALESCE(?, link_instagram),
                        link_linkedin = COALESCE(?, link_linkedin),
                        link_facebook = COALESCE(?, link_facebook),
                        link_youtube = COALESCE(?, link_youtube),
                        last_active_raw = CASE WHEN ? THEN ? ELSE last_active_raw END,
                        last_active_at_utc = CASE WHEN ? THEN ? ELSE last_active_at_utc END,
                        updated_at_raw = COALESCE(?, updated_at_raw),
                        level_current = COALESCE(?, level_current),
                        points_all = COALESCE(?, points_all),
                        source_last_update = 'members',
                        updated_at = ?
                    WHERE id = ?
                    "#,
                )
                .bind(&rec.user_id)
                .bind(&rec.member_id)
                .bind(&rec.handle)
                .bind(&rec.first_name)
                .bind(&rec.last_name)
                .bind(&rec.name)
                .bind(email)
                .bind(&rec.joined_date)
                .bind(&rec.approved_at)
                .bind(&rec.role)
                .bind(&rec.bio)
                .bind(&rec.location)
                .bind(&rec.link_website)
                .bind(&rec.link_instagram)
                .bind(&rec.link_linkedin)
                .bind(&rec.link_facebook)
                .bind(&rec.link_youtube)
                .bind(advance)
                .bind(&rec.last_active_raw)
                .bind(advance)
                .bind(candidate_active.map(|dt| dt.to_rfc3339()))
                .bind(&rec.updated_at_raw)
                .bind(rec.level_current)
                .bind(rec.points_all)
                .bind(now.timestamp())
                .bind(id)
                .execute(&mut *tx)
                .await?;
                stats.updated += 1;
            }
        }
    }

    tx.commit().await?;
    Ok(stats)
}

/// Extract member records from a raw members capture, one per user id.
pub fn members_from_capture(json: &Value) -> Vec<MemberRecord> {
    let mut seen = HashSet::new();
    find_member_entries(json)
        .iter()
        .filter_map(member_record)
        .filter(|rec| seen.insert(rec.user_id.clone()))
        .collect()
}

// ─── Leaderboards ───────────────────────────────────────────────────

fn entry_list(value: &Value) -> Option<&Vec<Value>> {
    value
        .as_array()
        .filter(|items| items.first().map_or(true, Value::is_object))
}

/// Extract one window's leaderboard entries from a raw capture.
///
/// Candidate locations, in order: `pageProps.s.<bucket>.users`,
/// `pageProps.<bucket>.users`, `pageProps.<bucket>`. When none of them
/// has entries, any other `pageProps.*.users` list whose key is not
/// another window's bucket is used.
pub fn leaderboard_entries(json: &Value, window: Window) -> Vec<LeaderboardEntry> {
    let Some(page) = json.get("pageProps") else {
        return Vec::new();
    };

    let bucket = window.bucket();
    let candidates = [
        format!("pageProps.s.{}.users", bucket),
        format!("pageProps.{}.users", bucket),
        format!("pageProps.{}", bucket),
    ];

    let mut entries = candidates
        .iter()
        .filter_map(|p| get_path(json, p))
        .filter_map(entry_list)
        .find(|items| !items.is_empty());

    if entries.is_none() {
        let other_buckets: Vec<&str> = Window::ALL
            .iter()
            .filter(|w| **w != window)
            .map(|w| w.bucket())
            .collect();
        entries = page.as_object().and_then(|obj| {
            obj.iter()
                .filter(|(k, _)| !other_buckets.contains(&k.as_str()))
                .filter_map(|(_, v)| v.get("users").and_then(entry_list))
                .find(|items| !items.is_empty())
        });
    }

    entries
        .map(|items| {
            items
                .iter()
                .filter_map(|e| {
                    let user_id = first_present(e, &["userId", "user.id"]).and_then(as_text)?;
                    Some(LeaderboardEntry {
                        user_id,
                        points: e.get("points").and_then(as_int),
                        rank: e.get("rank").and_then(as_int),
                    })
                })
                .collect()
        })
        .unwrap_or_default()
}

fn window_columns(window: Window) -> (&'static str, &'static str) {
    match window {
        Window::AllTime => ("points_all", "rank_all"),
        Window::Days30 => ("points_30d", "rank_30d"),
        Window::Days7 => ("points_7d", "rank_7d"),
    }
}

/// Append one capture batch for `(tenant, window)` and mirror the values
/// into existing members.
///
/// `inserted` counts snapshot rows, `updated` counts members touched.
pub async fn ingest_leaderboard(
    pool: &SqlitePool,
    tenant: &str,
    window: Window,
    entries: &[LeaderboardEntry],
    source_file: Option<&str>,
    captured_at: DateTime<Utc>,
) -> Result<NormalizeStats> {
    let mut stats = NormalizeStats::default();
    if entries.is_empty() {
        return Ok(stats);
    }

    let batch_id = Uuid::new_v4().to_string();
    let captured_ms = to_millis(&captured_at);
    let (points_col, rank_col) = window_columns(window);
    let update_sql = format!(
        "UPDATE members SET {} = ?, {} = ?, source_last_update = 'leaderboard', updated_at = ? \
         WHERE tenant = ? AND user_id = ?",
        points_col, rank_col
    );

    let mut tx = pool.begin().await?;
    for entry in entries {
        stats.scanned += 1;

        sqlx::query(
            r#"
            INSERT INTO leaderboard_snapshots
                (tenant, user_id, window_key, points, rank, captured_at, batch_id, source_file)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(tenant)
        .bind(&entry.user_id)
        .bind(window.key())
        .bind(entry.points)
        .bind(entry.rank)
        .bind(captured_ms)
        .bind(&batch_id)
        .bind(source_file)
        .execute(&mut *tx)
        .await?;
        stats.inserted += 1;

        let result = sqlx::query(&update_sql)
            .bind(entry.points)
            .bind(entry.rank)
            .bind(captured_at.timestamp())
            .bind(tenant)
            .bind(&entry.user_id)
            .execute(&mut *tx)
            .await?;
        stats.updated += result.rows_affected();
    }
    tx.commit().await?;

    debug!(tenant, window = window.key(), batch_id = %batch_id, rows = stats.inserted, "capture batch written");
    Ok(stats)
}

// ─── Raw file bookkeeping ───────────────────────────────────────────

async fn already_ingested(pool: &SqlitePool, tenant: &str, route: &str, hash: &str) -> Result<bool> {
    let found: Option<i64> = sqlx::query_scalar(
        "SELECT id FROM raw_snapshots WHERE tenant = ? AND route = ? AND content_hash = ?",
    )
    .bind(tenant)
    .bind(route)
    .bind(hash)
    .fetch_optional(pool)
    .await?;
    Ok(found.is_some())
}

async fn record_raw(
    pool: &SqlitePool,
    tenant: &str,
    route: &str,
    capture: &RawCapture,
    now: DateTime<Utc>,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT OR IGNORE INTO raw_snapshots (tenant, route, path, content_hash, size_bytes, captured_at)
        VALUES (?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(tenant)
    .bind(route)
    .bind(capture.path.display().to_string())
    .bind(&capture.content_hash)
    .bind(capture.size_bytes)
    .bind(to_millis(&now))
    .execute(pool)
    .await?;
    Ok(())
}

fn leaderboard_route(window: Window) -> String {
    format!("leaderboard:{}", window.key())
}

/// Normalize the newest raw members capture of a tenant.
pub async fn normalize_members(
    pool: &SqlitePool,
    config: &Config,
    tenant: &TenantConfig,
    force: bool,
) -> Result<NormalizeOutcome> {
    let dir = config.raw_dir_for(&tenant.slug);
    let Some(path) = raw::latest_raw_file(&dir, &config.raw.members_glob)? else {
        warn!(tenant = %tenant.slug, dir = %dir.display(), "no raw members file found");
        return Ok(NormalizeOutcome::NoRawFile);
    };

    let capture = raw::read_capture(&path)?;
    if !force && already_ingested(pool, &tenant.slug, "members", &capture.content_hash).await? {
        info!(tenant = %tenant.slug, path = %path.display(), "members file already ingested");
        return Ok(NormalizeOutcome::AlreadyIngested);
    }

    let records = members_from_capture(&capture.json);
    if records.is_empty() {
        warn!(tenant = %tenant.slug, path = %path.display(), "no member entries found in raw file");
    }

    let now = Utc::now();
    let stats = ingest_members(pool, &tenant.slug, &records, now).await?;
    record_raw(pool, &tenant.slug, "members", &capture, now).await?;

    info!(
        tenant = %tenant.slug,
        inserted = stats.inserted,
        updated = stats.updated,
        "members normalized"
    );
    Ok(NormalizeOutcome::Ingested(stats))
}

/// Normalize the newest raw leaderboard capture of a tenant for the given
/// windows. All windows of one run share a capture timestamp.
pub async fn normalize_leaderboards(
    pool: &SqlitePool,
    config: &Config,
    tenant: &TenantConfig,
    windows: &[Window],
    force: bool,
) -> Result<Vec<(Window, NormalizeOutcome)>> {
    let dir = config.raw_dir_for(&tenant.slug);
    let Some(path) = raw::latest_raw_file(&dir, &config.raw.leaderboard_glob)? else {
        warn!(tenant = %tenant.slug, dir = %dir.display(), "no raw leaderboard file found");
        return Ok(windows.iter().map(|w| (*w, NormalizeOutcome::NoRawFile)).collect());
    };

    let capture = raw::read_capture(&path)?;
    let source_file = path.display().to_string();
    let captured_at = Utc::now();

    let mut outcomes = Vec::with_capacity(windows.len());
    for &window in windows {
        let route = leaderboard_route(window);
        if !force && already_ingested(pool, &tenant.slug, &route, &capture.content_hash).await? {
            info!(tenant = %tenant.slug, window = window.key(), "leaderboard file already ingested");
            outcomes.push((window, NormalizeOutcome::AlreadyIngested));
            continue;
        }

        let entries = leaderboard_entries(&capture.json, window);
        if entries.is_empty() {
            warn!(tenant = %tenant.slug, window = window.key(), "no leaderboard entries in raw file");
        }

        let stats = ingest_leaderboard(
            pool,
            &tenant.slug,
            window,
            &entries,
            Some(&source_file),
            captured_at,
        )
        .await?;
        record_raw(pool, &tenant.slug, &route, &capture, captured_at).await?;

        info!(
            tenant = %tenant.slug,
            window = window.key(),
            inserted = stats.inserted,
            updated = stats.updated,
            "leaderboard normalized"
        );
        outcomes.push((window, NormalizeOutcome::Ingested(stats)));
    }

    Ok(outcomes)
}

fn print_outcome(label: &str, outcome: &NormalizeOutcome) {
    match outcome {
        NormalizeOutcome::Ingested(s) => println!(
            "  {:<14} inserted={} updated={} scanned={}",
            label, s.inserted, s.updated, s.scanned
        ),
        NormalizeOutcome::AlreadyIngested => println!("  {:<14} already ingested", label),
        NormalizeOutcome::NoRawFile => println!("  {:<14} no raw file", label),
    }
}

/// CLI entry point for `hud normalize`.
pub async fn run_normalize(
    config: &Config,
    tenant: &TenantConfig,
    target: Target,
    window: Option<Window>,
    force: bool,
) -> Result<()> {
    let pool = db::connect(config).await?;

    println!("normalize {}", tenant.slug);
    match target {
        Target::Members => {
            let outcome = normalize_members(&pool, config, tenant, force).await?;
            print_outcome("members", &outcome);
        }
        Target::Leaderboard => {
            let windows: Vec<Window> = match window {
                Some(w) => vec![w],
                None => Window::ALL.to_vec(),
            };
            for (w, outcome) in normalize_leaderboards(&pool, config, tenant, &windows, force).await? {
                print_outcome(&format!("leaderboard:{}", w.key()), &outcome);
            }
        }
    }
    println!("ok");

    pool.close().await;
    Ok(())
}
