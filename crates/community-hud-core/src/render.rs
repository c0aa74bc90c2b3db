//! Markdown rendering of leaderboard deltas.
//!
//! Every rendered window has the same four sections in the same order.
//! Empty sections print [`EMPTY_SECTION`] instead of being omitted so the
//! structure stays stable for notifiers that parse the files.

use crate::delta::{DeltaResult, MoverEntry, PresenceEntry, WindowDelta};
use crate::models::CaptureTime;

/// Placeholder line for a section with no entries.
pub const EMPTY_SECTION: &str = "- (none)";

/// Placeholder body for a window without two capture batches.
pub const INSUFFICIENT: &str = "(insufficient snapshots)";

/// Format a delta with a leading `+` when positive.
pub fn signed(value: i64) -> String {
    if value > 0 {
        format!("+{}", value)
    } else {
        value.to_string()
    }
}

fn rank_display(rank: Option<i64>) -> String {
    rank.map(|r| r.to_string()).unwrap_or_else(|| "-".to_string())
}

fn ts_display(ts: &CaptureTime) -> String {
    ts.format("%Y-%m-%d %H:%M:%S UTC").to_string()
}

fn mover_line(m: &MoverEntry) -> String {
    format!(
        "- {} — rank {}→{} ({}) | pts {}→{} ({})",
        m.name,
        rank_display(m.old_rank),
        rank_display(m.new_rank),
        signed(m.rank_delta),
        m.old_points,
        m.new_points,
        signed(m.points_delta)
    )
}

fn presence_line(p: &PresenceEntry) -> String {
    format!("- {} — rank {} | pts {}", p.name, rank_display(p.rank), p.points)
}

fn push_section<T>(lines: &mut Vec<String>, title: &str, items: &[T], fmt: fn(&T) -> String) {
    lines.push(format!("## {}", title));
    if items.is_empty() {
        lines.push(EMPTY_SECTION.to_string());
    } else {
        lines.extend(items.iter().map(fmt));
    }
}

/// Render one computed delta under `label`.
pub fn render_delta(result: &DeltaResult, label: &str) -> String {
    let mut lines = vec![
        format!(
            "# {} — Δ (latest {} vs prev {})",
            label,
            ts_display(&result.latest),
            ts_display(&result.previous)
        ),
        String::new(),
    ];

    push_section(&mut lines, "Up-Movers", &result.up_movers, mover_line);
    lines.push(String::new());
    push_section(&mut lines, "Down-Movers", &result.down_movers, mover_line);
    lines.push(String::new());
    push_section(&mut lines, "New Entrants", &result.new_entrants, presence_line);
    lines.push(String::new());
    push_section(&mut lines, "Dropouts", &result.dropouts, presence_line);

    lines.join("\n") + "\n"
}

/// Render one window, including the insufficient-history placeholder.
pub fn render_window(delta: &WindowDelta) -> String {
    match delta {
        WindowDelta::Computed(result) => render_delta(result, result.window.label()),
        WindowDelta::InsufficientSnapshots { window, .. } => {
            format!("## {}\n{}\n", window.label(), INSUFFICIENT)
        }
    }
}

/// Render the combined digest for all windows of a tenant.
pub fn render_combined(tenant: &str, deltas: &[WindowDelta]) -> String {
    let mut blocks = vec![format!("# Leaderboard Deltas — {}\n", tenant)];
    blocks.extend(deltas.iter().map(render_window));
    blocks.join("\n")
}
