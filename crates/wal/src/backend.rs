//! WAL backend contract and the in-memory implementation.

use parking_lot::Mutex;

use relay_domain::error::Result;
use relay_domain::event::AgentEvent;

/// Append-only event log backend.
///
/// Contract:
/// - `append` returns a 0-based monotonic index per backend instance and
///   is safe under cross-thread contention.
/// - `iter_events` returns events in append order as a snapshot,
///   optionally filtered by `run_id`.
/// - `locator` returns a stable identifier (filesystem path or
///   `wal://...` URI).
pub trait WalBackend: Send + Sync {
    fn append(&self, event: &AgentEvent) -> Result<u64>;

    fn iter_events(&self, run_id: Option<&str>) -> Result<Vec<AgentEvent>>;

    fn locator(&self) -> String;
}

/// In-memory WAL for cloud/unattended runs and offline regression.
///
/// Only replayable within the owning process; cross-process resume needs
/// a durable backend.
pub struct InMemoryWal {
    locator: String,
    events: Mutex<Vec<AgentEvent>>,
}

impl InMemoryWal {
    pub fn new() -> Self {
        Self::with_locator("wal://in-memory")
    }

    pub fn with_locator(locator: impl Into<String>) -> Self {
        Self {
            locator: locator.into(),
            events: Mutex::new(Vec::new()),
        }
    }
}

impl Default for InMemoryWal {
    fn default() -> Self {
        Self::new()
    }
}

impl WalBackend for InMemoryWal {
    fn append(&self, event: &AgentEvent) -> Result<u64> {
        let mut events = self.events.lock();
        let index = events.len() as u64;
        events.push(event.clone());
        Ok(index)
    }

    fn iter_events(&self, run_id: Option<&str>) -> Result<Vec<AgentEvent>> {
        let snapshot = self.events.lock().clone();
        Ok(match run_id {
            None => snapshot,
            Some(id) => snapshot.into_iter().filter(|e| e.run_id == id).collect(),
        })
    }

    fn locator(&self) -> String {
        self.locator.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ev(run_id: &str, kind: &str) -> AgentEvent {
        AgentEvent::new(kind, run_id, serde_json::json!({}))
    }

    #[test]
    fn append_returns_monotonic_indices() {
        let wal = InMemoryWal::new();
        assert_eq!(wal.append(&ev("r1", "a")).unwrap(), 0);
        assert_eq!(wal.append(&ev("r1", "b")).unwrap(), 1);
        assert_eq!(wal.append(&ev("r2", "c")).unwrap(), 2);
    }

    #[test]
    fn iter_filters_by_run_id() {
        let wal = InMemoryWal::new();
        wal.append(&ev("r1", "a")).unwrap();
        wal.append(&ev("r2", "b")).unwrap();
        wal.append(&ev("r1", "c")).unwrap();

        let all = wal.iter_events(None).unwrap();
        assert_eq!(all.len(), 3);

        let r1 = wal.iter_events(Some("r1")).unwrap();
        assert_eq!(r1.len(), 2);
        assert_eq!(r1[0].kind, "a");
        assert_eq!(r1[1].kind, "c");
    }

    #[test]
    fn locator_is_stable() {
        let wal = InMemoryWal::new();
        assert_eq!(wal.locator(), "wal://in-memory");
        let custom = InMemoryWal::with_locator("wal://in-memory#run_id=r1");
        assert_eq!(custom.locator(), "wal://in-memory#run_id=r1");
    }

    #[test]
    fn concurrent_appends_do_not_lose_events() {
        use std::sync::Arc;
        let wal = Arc::new(InMemoryWal::new());
        let mut handles = Vec::new();
        for t in 0..8 {
            let wal = Arc::clone(&wal);
            handles.push(std::thread::spawn(move || {
                for i in 0..50 {
                    wal.append(&ev("r1", &format!("t{t}_{i}"))).unwrap();
                }
            }));
        }
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(wal.iter_events(None).unwrap().len(), 400);
    }
}
