//! Run directory layout under the workspace root.
//!
//! `<workspace_root>/.skills_runtime_sdk/runs/<run_id>/events.jsonl` for
//! the WAL, with artifacts next to it.

use std::path::{Path, PathBuf};

pub const RUNTIME_DIR: &str = ".skills_runtime_sdk";

pub fn run_dir(workspace_root: &Path, run_id: &str) -> PathBuf {
    workspace_root.join(RUNTIME_DIR).join("runs").join(run_id)
}

pub fn wal_path(workspace_root: &Path, run_id: &str) -> PathBuf {
    run_dir(workspace_root, run_id).join("events.jsonl")
}

pub fn artifacts_dir(workspace_root: &Path, run_id: &str) -> PathBuf {
    run_dir(workspace_root, run_id).join("artifacts")
}
