//! Fork a run by copying a WAL prefix under a new `run_id`.
//!
//! The copied events get their `run_id` rewritten, and any embedded
//! `payload.wal_locator` is pointed at the destination so audit views of
//! the fork are not misleading. A subsequent run with the new id picks
//! the prefix up through the normal resume rules.

use std::io::Write;
use std::path::{Path, PathBuf};

use serde_json::Value;

use relay_domain::error::{Error, Result};

/// Copy events `[0..=up_to_index_inclusive]` from `src` to `dst`,
/// rewriting each event for the new run. Overwrites `dst`.
pub fn fork_run_events_jsonl(
    src_wal_path: &Path,
    dst_wal_path: &Path,
    new_run_id: &str,
    up_to_index_inclusive: u64,
) -> Result<()> {
    if new_run_id.trim().is_empty() {
        return Err(Error::Config("new_run_id must be non-empty".into()));
    }
    if !src_wal_path.exists() {
        return Err(Error::Wal(format!(
            "source WAL not found: {}",
            src_wal_path.display()
        )));
    }
    if let Some(parent) = dst_wal_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let raw = std::fs::read_to_string(src_wal_path)?;
    let dst_locator = dst_wal_path.to_string_lossy().into_owned();

    let mut out_lines: Vec<String> = Vec::new();
    for (idx, line) in raw.lines().enumerate() {
        if idx as u64 > up_to_index_inclusive {
            break;
        }
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let mut obj: Value = serde_json::from_str(line)
            .map_err(|e| Error::Wal(format!("malformed WAL line {idx}: {e}")))?;
        if let Some(map) = obj.as_object_mut() {
            map.insert("run_id".into(), new_run_id.into());
            if let Some(payload) = map.get_mut("payload").and_then(|p| p.as_object_mut()) {
                if payload
                    .get("wal_locator")
                    .map(|v| v.is_string())
                    .unwrap_or(false)
                {
                    payload.insert("wal_locator".into(), dst_locator.clone().into());
                }
            }
        }
        out_lines.push(obj.to_string());
    }

    let mut file = std::fs::File::create(dst_wal_path)?;
    for line in &out_lines {
        file.write_all(line.as_bytes())?;
        file.write_all(b"\n")?;
    }
    Ok(())
}

/// Fork under the standard run-dir convention; returns the new WAL path.
pub fn fork_run(
    workspace_root: &Path,
    src_run_id: &str,
    dst_run_id: &str,
    up_to_index_inclusive: u64,
) -> Result<PathBuf> {
    let runs = workspace_root.join(".skills_runtime_sdk").join("runs");
    let src = runs.join(src_run_id).join("events.jsonl");
    let dst = runs.join(dst_run_id).join("events.jsonl");
    fork_run_events_jsonl(&src, &dst, dst_run_id, up_to_index_inclusive)?;
    Ok(dst)
}
