//! Raw capture discovery and JSON access helpers.
//!
//! The external fetcher writes one JSON file per route and run under
//! `<raw.dir>/<tenant>/`. This module finds the newest file for a route
//! and provides path lookups over the loosely-shaped JSON it contains.

use anyhow::{Context, Result};
use globset::{Glob, GlobMatcher};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use walkdir::WalkDir;

/// A raw capture read from disk.
#[derive(Debug, Clone)]
pub struct RawCapture {
    pub path: PathBuf,
    pub json: Value,
    pub content_hash: String,
    pub size_bytes: i64,
}

/// Newest file directly under `dir` whose file name matches `pattern`.
///
/// Returns `Ok(None)` when the directory does not exist or nothing matches.
pub fn latest_raw_file(dir: &Path, pattern: &str) -> Result<Option<PathBuf>> {
    if !dir.is_dir() {
        return Ok(None);
    }

    let matcher: GlobMatcher = Glob::new(pattern)?.compile_matcher();

    let mut newest: Option<(SystemTime, PathBuf)> = None;
    for entry in WalkDir::new(dir).min_depth(1).max_depth(1) {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        if !matcher.is_match(entry.file_name()) {
            continue;
        }

        let modified = entry
            .metadata()?
            .modified()
            .unwrap_or(SystemTime::UNIX_EPOCH);
        let path = entry.into_path();

        // newest mtime wins; equal mtimes fall back to the larger file name
        let replace = match &newest {
            None => true,
            Some((ts, p)) => modified > *ts || (modified == *ts && path > *p),
        };
        if replace {
            newest = Some((modified, path));
        }
    }

    Ok(newest.map(|(_, p)| p))
}

/// Read and parse a raw capture, hashing its bytes.
pub fn read_capture(path: &Path) -> Result<RawCapture> {
    let bytes =
        std::fs::read(path).with_context(|| format!("Failed to read raw file: {}", path.display()))?;

    let json: Value = serde_json::from_slice(&bytes)
        .with_context(|| format!("Invalid JSON in raw file: {}", path.display()))?;

    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    let content_hash = format!("{:x}", hasher.finalize());

    Ok(RawCapture {
        path: path.to_path_buf(),
        json,
        content_hash,
        size_bytes: bytes.len() as i64,
    })
}

/// Follow one dotted path such as `user.metadata.bio` or `items[0].id`.
pub fn get_path<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    let mut cur = value;
    for part in path.split('.') {
        match part.find('[') {
            Some(open) if part.ends_with(']') => {
                let key = &part[..open];
                let index: usize = part[open + 1..part.len() - 1].parse().ok()?;
                if !key.is_empty() {
                    cur = cur.get(key)?;
                }
                cur = cur.get(index)?;
            }
            _ => cur = cur.get(part)?,
        }
    }
    if cur.is_null() {
        None
    } else {
        Some(cur)
    }
}

/// Evaluate candidate paths in order and return the first non-null hit.
pub fn first_present<'a>(value: &'a Value, paths: &[&str]) -> Option<&'a Value> {
    paths.iter().find_map(|p| get_path(value, p))
}

/// Render a scalar JSON value as text; empty strings count as absent.
pub fn as_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if s.trim().is_empty() => None,
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Read an integer that may arrive as a number or a numeric string.
pub fn as_int(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}
