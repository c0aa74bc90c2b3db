//! Library-level pipeline tests against a temporary SQLite database.

use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use axum::extract::{Path as UrlPath, State};
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use chrono::{Duration, TimeZone, Utc};
use serde_json::Value;
use sqlx::SqlitePool;
use tempfile::TempDir;

use community_hud::config::{load_config, Config};
use community_hud::daily::snapshot_members_daily;
use community_hud::models::{LeaderboardEntry, MemberRecord, Window};
use community_hud::normalize::{self, NormalizeOutcome};
use community_hud::notify::{self, build_embed, DiscordNotifier, Mode, NotifyOutcome, COLOR_BLUE};
use community_hud::runner::{is_store_unavailable, run_all, RunOptions};
use community_hud::sqlite_store::SqliteStore;
use community_hud::{db, migrate};
use community_hud_core::delta::{compute_delta, WindowDelta};
use community_hud_core::store::SnapshotStore;

fn write_config(root: &Path, extra: &str) -> Config {
    let content = format!(
        r#"[db]
path = "{root}/hud.sqlite"

[raw]
dir = "{root}/raw"

[reports]
dir = "{root}/reports"

[discord]
timeout_secs = 5
max_retries = 2

[[tenants]]
slug = "alley"
group = "the-alley"

{extra}
"#,
        root = root.display(),
        extra = extra
    );
    let path = root.join("hud.toml");
    fs::write(&path, content).unwrap();
    load_config(&path).unwrap()
}

async fn setup(extra: &str) -> (TempDir, Config, SqlitePool) {
    let tmp = TempDir::new().unwrap();
    let config = write_config(tmp.path(), extra);
    let pool = db::connect(&config).await.unwrap();
    migrate::apply(&pool).await.unwrap();
    (tmp, config, pool)
}

fn entry(user: &str, points: i64, rank: i64) -> LeaderboardEntry {
    LeaderboardEntry {
        user_id: user.to_string(),
        points: Some(points),
        rank: Some(rank),
    }
}

fn record(user: &str, name: &str) -> MemberRecord {
    MemberRecord {
        user_id: user.to_string(),
        name: Some(name.to_string()),
        ..Default::default()
    }
}

// ─── Webhook sink ───────────────────────────────────────────────────

#[derive(Clone)]
struct Sink {
    received: Arc<Mutex<Vec<(String, Value)>>>,
    fail_first: Arc<AtomicUsize>,
    status: StatusCode,
}

async fn hook(
    State(sink): State<Sink>,
    UrlPath(name): UrlPath<String>,
    Json(body): Json<Value>,
) -> StatusCode {
    sink.received.lock().unwrap().push((name, body));
    if sink
        .fail_first
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
    {
        return StatusCode::INTERNAL_SERVER_ERROR;
    }
    sink.status
}

async fn spawn_sink(fail_first: usize, status: StatusCode) -> (String, Sink) {
    let sink = Sink {
        received: Arc::new(Mutex::new(Vec::new())),
        fail_first: Arc::new(AtomicUsize::new(fail_first)),
        status,
    };
    let app = Router::new()
        .route("/hooks/{name}", post(hook))
        .with_state(sink.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (format!("http://{}/hooks", addr), sink)
}

// ─── Normalizer and delta ───────────────────────────────────────────

#[tokio::test]
async fn test_one_batch_per_run_and_delta() {
    let (_tmp, _config, pool) = setup("").await;
    let t0 = Utc.with_ymd_and_hms(2026, 10, 18, 6, 0, 0).unwrap();
    let t1 = t0 + Duration::days(1);

    normalize::ingest_members(&pool, "alley", &[record("a", "Ann"), record("b", "Bo")], t0)
        .await
        .unwrap();

    let first = [entry("a", 10, 2), entry("b", 20, 1)];
    let stats = normalize::ingest_leaderboard(&pool, "alley", Window::Days7, &first, None, t0)
        .await
        .unwrap();
    assert_eq!(stats.inserted, 2);
    assert_eq!(stats.updated, 2);

    let second = [entry("a", 30, 1), entry("c", 5, 3)];
    normalize::ingest_leaderboard(&pool, "alley", Window::Days7, &second, None, t1)
        .await
        .unwrap();

    let batches: Vec<(i64, i64)> = sqlx::query_as(
        "SELECT captured_at, COUNT(DISTINCT batch_id) FROM leaderboard_snapshots GROUP BY captured_at",
    )
    .fetch_all(&pool)
    .await
    .unwrap();
    assert_eq!(batches.len(), 2);
    assert!(batches.iter().all(|(_, ids)| *ids == 1));

    let store = SqliteStore::new(pool.clone());
    let stamps = store
        .list_distinct_capture_timestamps("alley", Window::Days7)
        .await
        .unwrap();
    assert_eq!(stamps, vec![t1, t0]);

    let WindowDelta::Computed(result) = compute_delta(&store, "alley", Window::Days7).await.unwrap()
    else {
        panic!("expected a computed delta");
    };
    assert_eq!(result.latest, t1);
    assert_eq!(result.up_movers.len(), 1);
    assert_eq!(result.up_movers[0].name, "Ann");
    assert_eq!(result.up_movers[0].rank_delta, 1);
    assert_eq!(result.new_entrants[0].name, "user:c");
    assert_eq!(result.dropouts[0].name, "Bo");

    // other windows have no history
    assert!(matches!(
        compute_delta(&store, "alley", Window::AllTime).await.unwrap(),
        WindowDelta::InsufficientSnapshots { latest: None, .. }
    ));

    // current points mirrored into members
    let points: Option<i64> =
        sqlx::query_scalar("SELECT points_7d FROM members WHERE tenant = 'alley' AND user_id = 'a'")
            .fetch_one(&pool)
            .await
            .unwrap();
    assert_eq!(points, Some(30));
}

#[tokio::test]
async fn test_member_merge_policy() {
    let (_tmp, _config, pool) = setup("").await;
    let now = Utc::now();

    let first = MemberRecord {
        user_id: "u1".into(),
        name: Some("Ann".into()),
        email: Some("ann@example.com".into()),
        joined_date: Some("2026-01-01T00:00:00Z".into()),
        last_active_raw: Some("2026-10-10T00:00:00Z".into()),
        points_all: Some(100),
        ..Default::default()
    };
    let stats = normalize::ingest_members(&pool, "alley", &[first], now).await.unwrap();
    assert_eq!(stats.inserted, 1);

    let later = MemberRecord {
        user_id: "u1".into(),
        name: Some("Annie".into()),
        email: Some("other@example.com".into()),
        handle: Some("ann-k".into()),
        last_active_raw: Some("2026-10-01T00:00:00Z".into()),
        points_all: None,
        ..Default::default()
    };
    let stats = normalize::ingest_members(&pool, "alley", &[later], now).await.unwrap();
    assert_eq!(stats.updated, 1);

    let row: (Option<String>, Option<String>, Option<String>, Option<String>, Option<i64>) = sqlx::query_as(
        "SELECT name, email, handle, last_active_raw, points_all FROM members WHERE user_id = 'u1'",
    )
    .fetch_one(&pool)
    .await
    .unwrap();
    assert_eq!(row.0.as_deref(), Some("Ann"));
    assert_eq!(row.1.as_deref(), Some("ann@example.com"));
    assert_eq!(row.2.as_deref(), Some("ann-k"));
    assert_eq!(row.3.as_deref(), Some("2026-10-10T00:00:00Z"));
    assert_eq!(row.4, Some(100));

    // same email, new platform id: matched and re-keyed
    let rekeyed = MemberRecord {
        user_id: "u1-new".into(),
        email: Some("ann@example.com".into()),
        last_active_raw: Some("2026-10-15T00:00:00Z".into()),
        ..Default::default()
    };
    normalize::ingest_members(&pool, "alley", &[rekeyed], now).await.unwrap();

    let ids: Vec<String> = sqlx::query_scalar("SELECT user_id FROM members WHERE tenant = 'alley'")
        .fetch_all(&pool)
        .await
        .unwrap();
    assert_eq!(ids, vec!["u1-new".to_string()]);
    let active: Option<String> =
        sqlx::query_scalar("SELECT last_active_raw FROM members WHERE user_id = 'u1-new'")
            .fetch_one(&pool)
            .await
            .unwrap();
    assert_eq!(active.as_deref(), Some("2026-10-15T00:00:00Z"));
}

#[tokio::test]
async fn test_normalize_members_skips_ingested_file() {
    let (tmp, config, pool) = setup("").await;
    let raw = tmp.path().join("raw/alley");
    fs::create_dir_all(&raw).unwrap();
    fs::write(
        raw.join("members_1.json"),
        r#"{"users": [{"id": "u1", "firstName": "Ann"}, {"id": "u2", "handle": "bo", "name": "Bo"}]}"#,
    )
    .unwrap();
    let tenant = config.tenant(Some("alley")).unwrap();

    let first = normalize::normalize_members(&pool, &config, tenant, false).await.unwrap();
    assert!(matches!(first, NormalizeOutcome::Ingested(s) if s.inserted == 2));

    let again = normalize::normalize_members(&pool, &config, tenant, false).await.unwrap();
    assert_eq!(again, NormalizeOutcome::AlreadyIngested);

    let forced = normalize::normalize_members(&pool, &config, tenant, true).await.unwrap();
    assert!(matches!(forced, NormalizeOutcome::Ingested(s) if s.updated == 2));
}

#[tokio::test]
async fn test_daily_snapshot_upsert() {
    let (_tmp, _config, pool) = setup("").await;
    let now = Utc::now();
    let day = now.date_naive();

    normalize::ingest_members(&pool, "alley", &[record("a", "Ann"), record("b", "Bo")], now)
        .await
        .unwrap();

    let first = snapshot_members_daily(&pool, "alley", day, now).await.unwrap();
    assert_eq!((first.inserted, first.updated), (2, 0));

    let second = snapshot_members_daily(&pool, "alley", day, now).await.unwrap();
    assert_eq!((second.inserted, second.updated), (0, 2));

    let other_tenant = snapshot_members_daily(&pool, "garden", day, now).await.unwrap();
    assert_eq!((other_tenant.inserted, other_tenant.updated), (0, 0));
}

// ─── Notifier ───────────────────────────────────────────────────────

#[tokio::test]
async fn test_notifier_posts_report_to_webhook() {
    let (base, sink) = spawn_sink(0, StatusCode::NO_CONTENT).await;
    let (_tmp, config, pool) = setup(&format!("[discord.webhooks]\nkpi = \"{}/kpi\"\n", base)).await;

    let reports = config.reports_dir_for("alley");
    fs::create_dir_all(&reports).unwrap();
    fs::write(reports.join("kpi_2026-10-18.md"), "old report").unwrap();
    fs::write(reports.join("kpi_2026-10-19.md"), "# Daily KPI — alley\n- **Members total:** 3\n").unwrap();

    let notifier = DiscordNotifier::new(&config.discord).unwrap();
    let tenant = config.tenant(Some("alley")).unwrap();
    let outcome = notify::notify(
        &notifier,
        &pool,
        &config,
        tenant,
        Mode::Kpi,
        Some("https://ci.example/run/7"),
        Utc::now(),
    )
    .await
    .unwrap();
    assert_eq!(outcome, NotifyOutcome::Sent);

    let received = sink.received.lock().unwrap();
    assert_eq!(received.len(), 1);
    let (name, body) = &received[0];
    assert_eq!(name, "kpi");
    assert_eq!(body["username"], "Community HUD");
    let embed = &body["embeds"][0];
    assert!(embed["title"].as_str().unwrap().contains("Daily KPI"));
    assert!(embed["description"].as_str().unwrap().contains("Members total:** 3"));
    assert_eq!(embed["url"], "https://ci.example/run/7");
}

#[tokio::test]
async fn test_notifier_retries_server_errors() {
    let (base, sink) = spawn_sink(1, StatusCode::NO_CONTENT).await;
    let (_tmp, config, _pool) = setup("").await;
    let notifier = DiscordNotifier::new(&config.discord).unwrap();

    let embed = build_embed("t", "body", COLOR_BLUE, "alley", Utc::now(), None, vec![]);
    notifier.post(&format!("{}/movers", base), &embed).await.unwrap();

    assert_eq!(sink.received.lock().unwrap().len(), 2);
}

#[tokio::test]
async fn test_notifier_does_not_retry_client_errors() {
    let (base, sink) = spawn_sink(0, StatusCode::BAD_REQUEST).await;
    let (_tmp, config, _pool) = setup("").await;
    let notifier = DiscordNotifier::new(&config.discord).unwrap();

    let embed = build_embed("t", "body", COLOR_BLUE, "alley", Utc::now(), None, vec![]);
    let err = notifier
        .post(&format!("{}/movers", base), &embed)
        .await
        .unwrap_err();

    assert!(err.to_string().contains("400"));
    assert_eq!(sink.received.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn test_status_alerts_without_daily_snapshot() {
    let (base, sink) = spawn_sink(0, StatusCode::NO_CONTENT).await;
    let (_tmp, config, pool) = setup(&format!(
        "[discord.webhooks]\nstatus = \"{base}/status\"\nalerts = \"{base}/alerts\"\n",
        base = base
    ))
    .await;
    let notifier = DiscordNotifier::new(&config.discord).unwrap();
    let tenant = config.tenant(Some("alley")).unwrap();

    let outcome = notify::notify(&notifier, &pool, &config, tenant, Mode::Status, None, Utc::now())
        .await
        .unwrap();
    assert_eq!(outcome, NotifyOutcome::Sent);

    {
        let received = sink.received.lock().unwrap();
        let names: Vec<&str> = received.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, vec!["status", "alerts"]);
        assert_eq!(received[0].1["embeds"][0]["color"], notify::COLOR_RED);
    }

    // green once today's snapshot exists
    let now = Utc::now();
    normalize::ingest_members(&pool, "alley", &[record("a", "Ann")], now).await.unwrap();
    snapshot_members_daily(&pool, "alley", now.date_naive(), now).await.unwrap();
    notify::notify(&notifier, &pool, &config, tenant, Mode::Status, None, now)
        .await
        .unwrap();

    let received = sink.received.lock().unwrap();
    assert_eq!(received.len(), 3);
    assert_eq!(received[2].0, "status");
    assert_eq!(received[2].1["embeds"][0]["color"], notify::COLOR_GREEN);
}

#[tokio::test]
async fn test_sqlite_store_without_schema_is_unavailable() {
    let tmp = TempDir::new().unwrap();
    let config = write_config(tmp.path(), "");
    let pool = db::connect(&config).await.unwrap();
    let store = SqliteStore::new(pool.clone());

    let err = compute_delta(&store, "alley", Window::Days7).await.unwrap_err();
    assert!(err.is_store_unavailable(), "unexpected error: {}", err);

    let err = store
        .display_names("alley", &["u1".to_string()])
        .await
        .unwrap_err();
    assert!(err.to_string().contains("members"));

    let wrapped = anyhow::Error::new(
        compute_delta(&store, "alley", Window::AllTime).await.unwrap_err(),
    )
    .context("delta report failed");
    assert!(is_store_unavailable(&wrapped));

    pool.close().await;
}

// ─── Runner ─────────────────────────────────────────────────────────

#[tokio::test]
async fn test_runner_skips_failing_tenant() {
    let (tmp, config, pool) = setup("[[tenants]]\nslug = \"broken\"\ngroup = \"broken\"\n").await;

    let good = tmp.path().join("raw/alley");
    fs::create_dir_all(&good).unwrap();
    fs::write(good.join("members.json"), r#"{"users": [{"id": "u1", "firstName": "Ann"}]}"#).unwrap();
    fs::write(
        good.join("leaderboard.json"),
        r#"{"pageProps": {"past7Days": [{"userId": "u1", "points": 3, "rank": 1}]}}"#,
    )
    .unwrap();

    let bad = tmp.path().join("raw/broken");
    fs::create_dir_all(&bad).unwrap();
    fs::write(bad.join("members.json"), "[1, 2").unwrap();

    let tenants: Vec<_> = config.tenants.iter().collect();
    let opts = RunOptions {
        notify: false,
        force: false,
    };
    let summary = run_all(&pool, &config, &tenants, opts).await.unwrap();

    assert_eq!(summary.succeeded, vec!["alley".to_string()]);
    assert_eq!(summary.failed.len(), 1);
    assert_eq!(summary.failed[0].0, "broken");
    assert!(summary.failed[0].1.contains("members normalization failed"));
    assert!(summary.store_unavailable.is_empty());

    let reports = config.reports_dir_for("alley");
    assert!(reports.join("leaderboard_delta_true_7.md").exists());
    assert!(reports.join("member_health_summary.md").exists());

    let rows: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM member_daily_snapshot WHERE tenant = 'alley'")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(rows, 1);
}
