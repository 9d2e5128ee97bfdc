//! Filesystem JSONL WAL: one UTF-8 JSON object per line, append-only.
//!
//! Path convention:
//! `<workspace_root>/.skills_runtime_sdk/runs/<run_id>/events.jsonl`.
//! The file is never rewritten; resume appends to it.

use std::io::Write;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;

use relay_domain::error::Result;
use relay_domain::event::AgentEvent;

use crate::backend::WalBackend;

/// Append-only JSONL WAL.
pub struct JsonlWal {
    path: PathBuf,
    /// Next 0-based line index, derived by scanning the file at open.
    next_index: Mutex<u64>,
}

impl JsonlWal {
    /// Open (or create the parent directory for) a JSONL WAL at `path`.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let next_index = Self::scan_next_index(&path)?;
        Ok(Self {
            path,
            next_index: Mutex::new(next_index),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn scan_next_index(path: &Path) -> Result<u64> {
        if !path.exists() {
            return Ok(0);
        }
        let raw = std::fs::read_to_string(path)?;
        Ok(raw.lines().filter(|l| !l.trim().is_empty()).count() as u64)
    }
}

impl WalBackend for JsonlWal {
    fn append(&self, event: &AgentEvent) -> Result<u64> {
        let line = serde_json::to_string(event)?;
        let mut next = self.next_index.lock();
        let index = *next;
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        file.write_all(line.as_bytes())?;
        file.write_all(b"\n")?;
        *next += 1;
        Ok(index)
    }

    fn iter_events(&self, run_id: Option<&str>) -> Result<Vec<AgentEvent>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let raw = std::fs::read_to_string(&self.path)?;
        let mut events = Vec::new();
        for line in raw.lines() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<AgentEvent>(line) {
                Ok(ev) => {
                    if run_id.is_none() || run_id == Some(ev.run_id.as_str()) {
                        events.push(ev);
                    }
                }
                Err(e) => {
                    tracing::warn!(
                        path = %self.path.display(),
                        error = %e,
                        "skipping malformed WAL line"
                    );
                }
            }
        }
        Ok(events)
    }

    fn locator(&self) -> String {
        match self.path.canonicalize() {
            Ok(p) => p.to_string_lossy().into_owned(),
            Err(_) => self.path.to_string_lossy().into_owned(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ev(run_id: &str, kind: &str) -> AgentEvent {
        AgentEvent::new(kind, run_id, serde_json::json!({"n": kind}))
    }

    #[test]
    fn append_and_iter_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let wal = JsonlWal::open(dir.path().join("runs/r1/events.jsonl")).unwrap();

        assert_eq!(wal.append(&ev("r1", "run_started")).unwrap(), 0);
        assert_eq!(wal.append(&ev("r1", "run_completed")).unwrap(), 1);

        let events = wal.iter_events(Some("r1")).unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].kind, "run_started");
        assert_eq!(events[1].kind, "run_completed");
    }

    #[test]
    fn reopen_continues_indices() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("events.jsonl");
        {
            let wal = JsonlWal::open(&path).unwrap();
            wal.append(&ev("r1", "a")).unwrap();
            wal.append(&ev("r1", "b")).unwrap();
        }
        let wal = JsonlWal::open(&path).unwrap();
        assert_eq!(wal.append(&ev("r1", "c")).unwrap(), 2);
    }

    #[test]
    fn iter_tolerates_unknown_keys_and_skips_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("events.jsonl");
        std::fs::write(
            &path,
            concat!(
                r#"{"type":"run_started","timestamp":"2026-01-01T00:00:00Z","run_id":"r1","payload":{},"extra_key":"ignored"}"#,
                "\n",
                "not json\n",
                r#"{"type":"run_completed","timestamp":"2026-01-01T00:00:01Z","run_id":"r1","payload":{"final_output":"hi"}}"#,
                "\n",
            ),
        )
        .unwrap();

        let wal = JsonlWal::open(&path).unwrap();
        let events = wal.iter_events(None).unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[1].payload["final_output"], "hi");
    }

    #[test]
    fn non_ascii_is_preserved_verbatim() {
        let dir = tempfile::tempdir().unwrap();
        let wal = JsonlWal::open(dir.path().join("events.jsonl")).unwrap();
        wal.append(&AgentEvent::new(
            "run_started",
            "r1",
            serde_json::json!({"task": "总结对话"}),
        ))
        .unwrap();
        let raw = std::fs::read_to_string(wal.path()).unwrap();
        assert!(raw.contains("总结对话"));
        assert!(!raw.contains("\\u"));
    }

    #[test]
    fn threaded_appends_keep_one_event_per_line() {
        use std::sync::Arc;
        let dir = tempfile::tempdir().unwrap();
        let wal = Arc::new(JsonlWal::open(dir.path().join("events.jsonl")).unwrap());
        let mut handles = Vec::new();
        for t in 0..4 {
            let wal = Arc::clone(&wal);
            handles.push(std::thread::spawn(move || {
                for i in 0..25 {
                    wal.append(&ev("r1", &format!("t{t}_{i}"))).unwrap();
                }
            }));
        }
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(wal.iter_events(None).unwrap().len(), 100);
    }
}
