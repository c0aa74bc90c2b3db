//! Leaderboard delta report files.

use anyhow::Result;
use std::path::{Path, PathBuf};
use tracing::info;

use community_hud_core::delta::{compute_all_windows, WindowDelta};
use community_hud_core::render::{render_combined, render_window};

use super::write_report;
use crate::sqlite_store::SqliteStore;

/// Combined digest file name.
pub const COMBINED_FILE: &str = "leaderboard_delta_true.md";

/// Per-window file name, e.g. `leaderboard_delta_true_7.md`.
pub fn window_file(delta: &WindowDelta) -> String {
    format!("leaderboard_delta_true_{}.md", delta.window().key())
}

/// Compute all windows and write one file per window plus the combined
/// digest. Windows without two capture batches get a placeholder file.
pub async fn write_delta_reports(
    store: &SqliteStore,
    dir: &Path,
    tenant: &str,
) -> Result<Vec<PathBuf>> {
    let deltas = compute_all_windows(store, tenant).await?;

    let mut written = Vec::with_capacity(deltas.len() + 1);
    for delta in &deltas {
        written.push(write_report(dir, &window_file(delta), &render_window(delta))?);

        match delta {
            WindowDelta::Computed(result) => info!(
                tenant,
                window = result.window.key(),
                up = result.up_movers.len(),
                down = result.down_movers.len(),
                entrants = result.new_entrants.len(),
                dropouts = result.dropouts.len(),
                "delta computed"
            ),
            WindowDelta::InsufficientSnapshots { window, .. } => {
                info!(tenant, window = window.key(), "insufficient snapshots for delta")
            }
        }
    }

    written.push(write_report(dir, COMBINED_FILE, &render_combined(tenant, &deltas))?);
    Ok(written)
}
