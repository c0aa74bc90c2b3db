use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn hud_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps/
    path.push("hud");
    path
}

const MEMBERS: &str = r#"{
  "pageProps": {
    "users": [
      {"user": {"id": "u1", "name": "ann-k", "firstName": "Ann", "lastName": "K",
                "metadata": {"spData": "{\"pts\": 120, \"lv\": 3}"}},
       "member": {"id": "m1", "createdAt": "2026-01-05T10:00:00Z"}},
      {"user": {"id": "u2", "firstName": "Bo"}, "member": {"id": "m2"}},
      {"user": {"id": "u3", "firstName": "Cy"}, "member": {"id": "m3"}}
    ]
  }
}"#;

const LEADERBOARD_V1: &str = r#"{
  "pageProps": {
    "s": {
      "allTime": {"users": [{"userId": "u1", "points": 100, "rank": 2}, {"userId": "u2", "points": 200, "rank": 1}]},
      "past30Days": {"users": [{"userId": "u1", "points": 40, "rank": 1}]},
      "past7Days": {"users": [
        {"userId": "u1", "points": 10, "rank": 2},
        {"userId": "u2", "points": 20, "rank": 1},
        {"userId": "u3", "points": 5, "rank": 3}
      ]}
    }
  }
}"#;

const LEADERBOARD_V2: &str = r#"{
  "pageProps": {
    "s": {
      "allTime": {"users": [{"userId": "u1", "points": 130, "rank": 1}, {"userId": "u2", "points": 120, "rank": 2}]},
      "past30Days": {"users": [{"userId": "u1", "points": 70, "rank": 1}]},
      "past7Days": {"users": [
        {"userId": "u1", "points": 30, "rank": 1},
        {"userId": "u2", "points": 22, "rank": 2},
        {"user": {"id": "u4"}, "points": 8, "rank": 3}
      ]}
    }
  }
}"#;

fn setup_test_env() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();

    let raw_dir = root.join("raw").join("alley");
    fs::create_dir_all(&raw_dir).unwrap();
    fs::write(raw_dir.join("members_1.json"), MEMBERS).unwrap();
    fs::write(raw_dir.join("leaderboard_1.json"), LEADERBOARD_V1).unwrap();

    let config_content = format!(
        r#"[db]
path = "{root}/data/hud.sqlite"

[raw]
dir = "{root}/raw"

[reports]
dir = "{root}/reports"

[discord]
timeout_secs = 5
max_retries = 0

[[tenants]]
slug = "alley"
group = "the-alley"
"#,
        root = root.display()
    );

    let config_path = config_dir.join("hud.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn add_tenant(config_path: &Path, slug: &str) {
    let mut content = fs::read_to_string(config_path).unwrap();
    content.push_str(&format!("\n[[tenants]]\nslug = \"{}\"\ngroup = \"{}-group\"\n", slug, slug));
    fs::write(config_path, content).unwrap();
}

fn run_hud(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = hud_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .env_remove("TENANT_SLUG")
        .env_remove("RUST_LOG")
        .env_remove("DISCORD_WEBHOOK_STATUS")
        .env_remove("DISCORD_WEBHOOK_KPI")
        .env_remove("DISCORD_WEBHOOK_NEWJOINERS")
        .output()
        .unwrap_or_else(|e| panic!("Failed to run hud binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let success = output.status.success();
    (stdout, stderr, success)
}

fn write_second_capture(root: &Path) {
    // newer mtime and larger name
    std::thread::sleep(std::time::Duration::from_millis(20));
    fs::write(root.join("raw/alley/leaderboard_2.json"), LEADERBOARD_V2).unwrap();
}

#[test]
fn test_init_creates_database() {
    let (tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) = run_hud(&config_path, &["init"]);
    assert!(success, "init failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("initialized"));
    assert!(tmp.path().join("data/hud.sqlite").exists());
}

#[test]
fn test_init_idempotent() {
    let (_tmp, config_path) = setup_test_env();

    let (_, _, success1) = run_hud(&config_path, &["init"]);
    assert!(success1, "First init failed");

    let (_, _, success2) = run_hud(&config_path, &["init"]);
    assert!(success2, "Second init failed (not idempotent)");
}

#[test]
fn test_tenants_listed() {
    let (_tmp, config_path) = setup_test_env();
    add_tenant(&config_path, "garden");

    let (stdout, _, success) = run_hud(&config_path, &["tenants"]);
    assert!(success);
    assert!(stdout.contains("alley"));
    assert!(stdout.contains("garden-group"));
}

#[test]
fn test_missing_config_fails() {
    let (tmp, _config_path) = setup_test_env();
    let (_, stderr, success) = run_hud(&tmp.path().join("nope.toml"), &["init"]);
    assert!(!success);
    assert!(stderr.contains("Failed to read config file"));
}

#[test]
fn test_unknown_tenant_fails() {
    let (_tmp, config_path) = setup_test_env();
    run_hud(&config_path, &["init"]);

    let (_, stderr, success) = run_hud(&config_path, &["delta", "--tenant", "nowhere"]);
    assert!(!success);
    assert!(stderr.contains("Unknown tenant"));
}

#[test]
fn test_normalize_leaderboard_idempotent_on_same_file() {
    let (_tmp, config_path) = setup_test_env();
    run_hud(&config_path, &["init"]);

    let (stdout, stderr, success) =
        run_hud(&config_path, &["normalize", "leaderboard", "--window", "7"]);
    assert!(success, "normalize failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("inserted=3"));

    let (stdout, _, success) = run_hud(&config_path, &["normalize", "leaderboard", "--window", "7"]);
    assert!(success);
    assert!(stdout.contains("already ingested"));

    let (stdout, _, success) = run_hud(
        &config_path,
        &["normalize", "leaderboard", "--window", "7", "--force"],
    );
    assert!(success);
    assert!(stdout.contains("inserted=3"));
}

#[test]
fn test_delta_reports_after_two_captures() {
    let (tmp, config_path) = setup_test_env();
    run_hud(&config_path, &["init"]);

    let (_, stderr, success) = run_hud(&config_path, &["normalize", "members"]);
    assert!(success, "members normalize failed: {}", stderr);
    run_hud(&config_path, &["normalize", "leaderboard"]);
    write_second_capture(tmp.path());
    run_hud(&config_path, &["normalize", "leaderboard"]);

    let (stdout, stderr, success) = run_hud(&config_path, &["delta"]);
    assert!(success, "delta failed: stdout={}, stderr={}", stdout, stderr);

    let reports = tmp.path().join("reports/alley");
    let week = fs::read_to_string(reports.join("leaderboard_delta_true_7.md")).unwrap();
    assert!(week.starts_with("# Past 7 Days — Δ (latest "));
    assert!(week.contains("- Ann — rank 2→1 (+1) | pts 10→30 (+20)"));
    assert!(week.contains("- Bo — rank 1→2 (-1) | pts 20→22 (+2)"));
    assert!(week.contains("## New Entrants\n- user:u4 — rank 3 | pts 8"));
    assert!(week.contains("## Dropouts\n- Cy — rank 3 | pts 5"));

    let combined = fs::read_to_string(reports.join("leaderboard_delta_true.md")).unwrap();
    assert!(combined.starts_with("# Leaderboard Deltas — alley"));
    for label in ["All-Time", "Past 30 Days", "Past 7 Days"] {
        assert!(combined.contains(label), "missing {}", label);
    }
}

#[test]
fn test_delta_with_single_capture_writes_placeholders() {
    let (tmp, config_path) = setup_test_env();
    run_hud(&config_path, &["init"]);
    run_hud(&config_path, &["normalize", "leaderboard"]);

    let (_, _, success) = run_hud(&config_path, &["delta"]);
    assert!(success);

    let week = fs::read_to_string(tmp.path().join("reports/alley/leaderboard_delta_true_7.md")).unwrap();
    assert_eq!(week, "## Past 7 Days\n(insufficient snapshots)\n");
}

#[test]
fn test_movers_and_export_from_members() {
    let (tmp, config_path) = setup_test_env();
    run_hud(&config_path, &["init"]);
    run_hud(&config_path, &["normalize", "members"]);
    run_hud(&config_path, &["normalize", "leaderboard"]);

    let (stdout, stderr, success) = run_hud(&config_path, &["movers"]);
    assert!(success, "movers failed: stdout={}, stderr={}", stdout, stderr);
    let movers = fs::read_to_string(tmp.path().join("reports/alley/leaderboard_movers.md")).unwrap();
    assert!(movers.contains("## Top 15 — Past 7 Days\n 1. Bo  20 pts\n 2. Ann  10 pts\n 3. Cy  5 pts"));

    let (stdout, _, success) = run_hud(&config_path, &["export-members"]);
    assert!(success);
    assert!(stdout.contains("snapshot_members_"));

    let (stdout, _, success) = run_hud(&config_path, &["celebrations"]);
    assert!(success);
    assert!(stdout.contains("celebrations_"));
}

#[test]
fn test_snapshot_daily_upserts() {
    let (_tmp, config_path) = setup_test_env();
    run_hud(&config_path, &["init"]);
    run_hud(&config_path, &["normalize", "members"]);

    let (stdout, _, success) = run_hud(&config_path, &["snapshot-daily", "--day", "2026-10-19"]);
    assert!(success);
    assert!(stdout.contains("inserted=3 updated=0"));

    let (stdout, _, success) = run_hud(&config_path, &["snapshot-daily", "--day", "2026-10-19"]);
    assert!(success);
    assert!(stdout.contains("inserted=0 updated=3"));
}

#[test]
fn test_stats_reports_counts() {
    let (_tmp, config_path) = setup_test_env();
    run_hud(&config_path, &["init"]);
    run_hud(&config_path, &["normalize", "members"]);

    let (stdout, _, success) = run_hud(&config_path, &["stats"]);
    assert!(success);
    assert!(stdout.contains("Members:     3"));
    assert!(stdout.contains("never"));
}

#[test]
fn test_notify_without_webhook_is_skipped() {
    let (_tmp, config_path) = setup_test_env();
    run_hud(&config_path, &["init"]);

    let (stdout, _, success) = run_hud(&config_path, &["notify", "kpi"]);
    assert!(success);
    assert!(stdout.contains("skipped (report not found)"));

    run_hud(&config_path, &["kpi"]);
    let (stdout, _, success) = run_hud(&config_path, &["notify", "kpi"]);
    assert!(success);
    assert!(stdout.contains("skipped (no webhook)"));
}

#[test]
fn test_run_skips_failing_tenant() {
    let (tmp, config_path) = setup_test_env();
    add_tenant(&config_path, "broken");
    let broken_raw = tmp.path().join("raw/broken");
    fs::create_dir_all(&broken_raw).unwrap();
    fs::write(broken_raw.join("members_1.json"), "{ not json").unwrap();

    let (stdout, stderr, success) = run_hud(&config_path, &["run", "--no-notify"]);
    assert!(!success, "run should fail: stdout={}", stdout);
    assert!(stdout.contains("alley"));
    assert!(stdout.contains("broken"));
    assert!(stdout.contains("FAILED"));
    assert!(stderr.contains("1 tenant(s) failed: broken"));

    let reports = tmp.path().join("reports/alley");
    assert!(reports.join("leaderboard_delta_true.md").exists());
    assert!(reports.join("member_health.json").exists());
    assert!(reports.join("member_health_summary.md").exists());
    assert!(reports.join("new_joiners_week.md").exists());
    assert!(reports.join("leaderboard_movers.md").exists());
    let kpi_count = fs::read_dir(&reports)
        .unwrap()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_name().to_string_lossy().starts_with("kpi_"))
        .count();
    assert_eq!(kpi_count, 1);
}

#[test]
fn test_run_single_tenant_succeeds() {
    let (_tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) = run_hud(&config_path, &["run", "--tenant", "alley", "--no-notify"]);
    assert!(success, "run failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("ok"));
}
