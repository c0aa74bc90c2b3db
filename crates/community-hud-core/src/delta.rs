//! Leaderboard delta engine.
//!
//! Compares the two most recent capture batches of one leaderboard window
//! for one tenant and classifies every user that appears in either batch.
//!
//! # Algorithm
//!
//! 1. Read capture timestamps newest first and keep the first two distinct
//!    values as `(latest, previous)`.
//! 2. Load both batches as `user_id → Standing` maps.
//! 3. Users only in `latest` are new entrants, users only in `previous` are
//!    dropouts. Users in both get
//!    `rank_delta = norm(old_rank) - norm(new_rank)` and
//!    `points_delta = new_points - old_points`, both saturating at the
//!    `i64` bounds.
//! 4. Any positive delta makes an up-mover, otherwise any negative delta a
//!    down-mover. A user with no change at all is filed as an up-mover.
//! 5. Up-movers sort descending by `(rank_delta, points_delta)`, down-movers
//!    ascending; both are cut to [`TOP_N`].
//!
//! Fewer than two capture batches yields
//! [`WindowDelta::InsufficientSnapshots`], never an error.

use std::cmp::Ordering;
use std::collections::{BTreeSet, HashMap};

use serde::Serialize;

use crate::models::{fallback_name, normalize_rank, CaptureTime, Standing, Window};
use crate::store::{SnapshotStore, StoreError};

/// Maximum number of up-movers and of down-movers kept per window.
pub const TOP_N: usize = 20;

/// Errors raised by the delta engine.
#[derive(Debug, thiserror::Error)]
pub enum DeltaError {
    #[error("tenant identifier must not be empty")]
    EmptyTenant,

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl DeltaError {
    /// True when the failure came from the backing store; the caller should
    /// skip this tenant rather than abort the batch.
    pub fn is_store_unavailable(&self) -> bool {
        matches!(self, DeltaError::Store(StoreError::Unavailable(_)))
    }
}

/// A user present in both captures.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MoverEntry {
    pub user_id: String,
    pub name: String,
    pub old_rank: Option<i64>,
    pub new_rank: Option<i64>,
    pub old_points: i64,
    pub new_points: i64,
    pub rank_delta: i64,
    pub points_delta: i64,
}

impl MoverEntry {
    fn sort_key(&self) -> (i64, i64) {
        (self.rank_delta, self.points_delta)
    }
}

/// A user present in only one of the two captures.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PresenceEntry {
    pub user_id: String,
    pub name: String,
    pub points: i64,
    pub rank: Option<i64>,
}

/// Classified comparison of two capture batches.
#[derive(Debug, Clone, Serialize)]
pub struct DeltaResult {
    pub window: Window,
    pub latest: CaptureTime,
    pub previous: CaptureTime,
    pub up_movers: Vec<MoverEntry>,
    pub down_movers: Vec<MoverEntry>,
    pub new_entrants: Vec<PresenceEntry>,
    pub dropouts: Vec<PresenceEntry>,
}

/// Outcome of a delta computation for one window.
#[derive(Debug, Clone, Serialize)]
pub enum WindowDelta {
    /// Fewer than two distinct capture batches exist. `latest` is set when
    /// exactly one batch exists.
    InsufficientSnapshots {
        window: Window,
        latest: Option<CaptureTime>,
    },
    Computed(DeltaResult),
}

impl WindowDelta {
    pub fn window(&self) -> Window {
        match self {
            WindowDelta::InsufficientSnapshots { window, .. } => *window,
            WindowDelta::Computed(result) => result.window,
        }
    }

    pub fn as_result(&self) -> Option<&DeltaResult> {
        match self {
            WindowDelta::Computed(result) => Some(result),
            WindowDelta::InsufficientSnapshots { .. } => None,
        }
    }
}

fn check_tenant(tenant: &str) -> Result<(), DeltaError> {
    if tenant.trim().is_empty() {
        return Err(DeltaError::EmptyTenant);
    }
    Ok(())
}

/// Return the two most recent distinct capture timestamps as
/// `(latest, previous)`.
///
/// Consecutive equal timestamps are collapsed, so stores that return one
/// timestamp per row work as well as stores that return distinct values.
pub async fn latest_two_capture_timestamps<S: SnapshotStore + ?Sized>(
    store: &S,
    tenant: &str,
    window: Window,
) -> Result<(Option<CaptureTime>, Option<CaptureTime>), DeltaError> {
    check_tenant(tenant)?;

    let stamps = store.list_distinct_capture_timestamps(tenant, window).await?;

    let mut seen: Vec<CaptureTime> = Vec::with_capacity(2);
    for ts in stamps {
        if seen.last() != Some(&ts) {
            seen.push(ts);
        }
        if seen.len() == 2 {
            break;
        }
    }

    Ok((seen.first().copied(), seen.get(1).copied()))
}

/// Load one capture batch as a `user_id → Standing` map.
///
/// `None` or a timestamp with no rows yields an empty map.
pub async fn snapshot_map<S: SnapshotStore + ?Sized>(
    store: &S,
    tenant: &str,
    window: Window,
    at: Option<CaptureTime>,
) -> Result<HashMap<String, Standing>, DeltaError> {
    check_tenant(tenant)?;

    let Some(at) = at else {
        return Ok(HashMap::new());
    };

    let rows = store.rows_at(tenant, window, at).await?;
    Ok(rows
        .iter()
        .map(|row| (row.user_id.clone(), Standing::from(row)))
        .collect())
}

/// Compute the classified delta for one `(tenant, window)`.
pub async fn compute_delta<S: SnapshotStore + ?Sized>(
    store: &S,
    tenant: &str,
    window: Window,
) -> Result<WindowDelta, DeltaError> {
    let (latest, previous) = latest_two_capture_timestamps(store, tenant, window).await?;

    let (Some(latest), Some(previous)) = (latest, previous) else {
        return Ok(WindowDelta::InsufficientSnapshots { window, latest });
    };

    let current = snapshot_map(store, tenant, window, Some(latest)).await?;
    let old = snapshot_map(store, tenant, window, Some(previous)).await?;

    let users: Vec<String> = current
        .keys()
        .chain(old.keys())
        .cloned()
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();
    let names = store.display_names(tenant, &users).await?;

    Ok(WindowDelta::Computed(classify(
        window, latest, previous, &current, &old, &names,
    )))
}

/// Compute deltas for every window, in report order.
pub async fn compute_all_windows<S: SnapshotStore + ?Sized>(
    store: &S,
    tenant: &str,
) -> Result<Vec<WindowDelta>, DeltaError> {
    let mut deltas = Vec::with_capacity(Window::ALL.len());
    for window in Window::ALL {
        deltas.push(compute_delta(store, tenant, window).await?);
    }
    Ok(deltas)
}

/// Classify two loaded capture batches. Pure; no store access.
pub fn classify(
    window: Window,
    latest: CaptureTime,
    previous: CaptureTime,
    current: &HashMap<String, Standing>,
    old: &HashMap<String, Standing>,
    names: &HashMap<String, String>,
) -> DeltaResult {
    let users: BTreeSet<&String> = current.keys().chain(old.keys()).collect();

    let mut up_movers = Vec::new();
    let mut down_movers = Vec::new();
    let mut new_entrants = Vec::new();
    let mut dropouts = Vec::new();

    for user_id in users {
        let name = names
            .get(user_id)
            .cloned()
            .unwrap_or_else(|| fallback_name(user_id));

        match (current.get(user_id), old.get(user_id)) {
            (Some(now), None) => new_entrants.push(PresenceEntry {
                user_id: user_id.clone(),
                name,
                points: now.points,
                rank: now.rank,
            }),
            (None, Some(before)) => dropouts.push(PresenceEntry {
                user_id: user_id.clone(),
                name,
                points: before.points,
                rank: before.rank,
            }),
            (Some(now), Some(before)) => {
                let rank_delta =
                    normalize_rank(before.rank).saturating_sub(normalize_rank(now.rank));
                let points_delta = now.points.saturating_sub(before.points);
                let entry = MoverEntry {
                    user_id: user_id.clone(),
                    name,
                    old_rank: before.rank,
                    new_rank: now.rank,
                    old_points: before.points,
                    new_points: now.points,
                    rank_delta,
                    points_delta,
                };
                if rank_delta > 0 || points_delta > 0 {
                    up_movers.push(entry);
                } else if rank_delta < 0 || points_delta < 0 {
                    down_movers.push(entry);
                } else {
                    // unchanged users land with the up-movers
                    up_movers.push(entry);
                }
            }
            (None, None) => {}
        }
    }

    up_movers.sort_by(|a, b| {
        b.sort_key()
            .cmp(&a.sort_key())
            .then_with(|| a.user_id.cmp(&b.user_id))
    });
    up_movers.truncate(TOP_N);

    down_movers.sort_by(|a, b| {
        a.sort_key()
            .cmp(&b.sort_key())
            .then_with(|| a.user_id.cmp(&b.user_id))
    });
    down_movers.truncate(TOP_N);

    new_entrants.sort_by(presence_order);
    dropouts.sort_by(presence_order);

    DeltaResult {
        window,
        latest,
        previous,
        up_movers,
        down_movers,
        new_entrants,
        dropouts,
    }
}

fn presence_order(a: &PresenceEntry, b: &PresenceEntry) -> Ordering {
    normalize_rank(a.rank)
        .cmp(&normalize_rank(b.rank))
        .then_with(|| a.user_id.cmp(&b.user_id))
}
