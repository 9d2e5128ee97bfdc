//! Single-exit event pipeline.
//!
//! The loop needs one place that guarantees the ordering invariant:
//! 1) append to the WAL, 2) call observability hooks, 3) push to the
//! caller's stream. Side events already persisted elsewhere (tool
//! execution contexts append directly) use `stream_only` to avoid a
//! duplicate WAL entry.

use std::sync::Arc;

use tokio::sync::mpsc;

use relay_domain::error::Result;
use relay_domain::event::AgentEvent;

use crate::backend::WalBackend;

/// Observability hook. Failures are logged and never abort the run.
pub type EventHook = Arc<dyn Fn(&AgentEvent) -> Result<()> + Send + Sync>;

/// The single exit for run events.
#[derive(Clone)]
pub struct WalEmitter {
    wal: Arc<dyn WalBackend>,
    hooks: Arc<[EventHook]>,
    stream: mpsc::UnboundedSender<AgentEvent>,
}

impl WalEmitter {
    pub fn new(
        wal: Arc<dyn WalBackend>,
        hooks: Vec<EventHook>,
        stream: mpsc::UnboundedSender<AgentEvent>,
    ) -> Self {
        Self {
            wal,
            hooks: hooks.into(),
            stream,
        }
    }

    fn call_hooks(&self, ev: &AgentEvent) {
        for hook in self.hooks.iter() {
            if let Err(e) = hook(ev) {
                // Observability must not take down the run.
                tracing::warn!(event = %ev.kind, error = %e, "event hook failed");
            }
        }
    }

    /// WAL append → hooks → stream. The event is durable before any hook
    /// or stream consumer observes it.
    pub fn emit(&self, ev: AgentEvent) -> Result<()> {
        self.wal.append(&ev)?;
        self.call_hooks(&ev);
        let _ = self.stream.send(ev);
        Ok(())
    }

    /// Hooks + stream only; used for events another component already
    /// appended to the WAL.
    pub fn stream_only(&self, ev: AgentEvent) {
        self.call_hooks(&ev);
        let _ = self.stream.send(ev);
    }

    /// WAL only; used when buffering tool-side events for an ordered
    /// flush after approval bookkeeping.
    pub fn append(&self, ev: &AgentEvent) -> Result<()> {
        self.wal.append(ev)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::InMemoryWal;
    use parking_lot::Mutex;

    fn ev(kind: &str) -> AgentEvent {
        AgentEvent::new(kind, "r1", serde_json::json!({}))
    }

    #[test]
    fn emit_appends_before_hooks_observe() {
        let wal = Arc::new(InMemoryWal::new());
        let seen_in_wal: Arc<Mutex<Vec<usize>>> = Arc::new(Mutex::new(Vec::new()));

        let wal_for_hook = Arc::clone(&wal);
        let seen = Arc::clone(&seen_in_wal);
        let hook: EventHook = Arc::new(move |_ev| {
            // At hook time the event must already be in the WAL.
            seen.lock()
                .push(wal_for_hook.iter_events(None).unwrap().len());
            Ok(())
        });

        let (tx, mut rx) = mpsc::unbounded_channel();
        let emitter = WalEmitter::new(wal, vec![hook], tx);
        emitter.emit(ev("run_started")).unwrap();
        emitter.emit(ev("run_completed")).unwrap();

        assert_eq!(*seen_in_wal.lock(), vec![1, 2]);
        assert_eq!(rx.try_recv().unwrap().kind, "run_started");
        assert_eq!(rx.try_recv().unwrap().kind, "run_completed");
    }

    #[test]
    fn hook_failure_does_not_abort_emission() {
        let wal = Arc::new(InMemoryWal::new());
        let failing: EventHook =
            Arc::new(|_| Err(relay_domain::error::Error::Other("hook down".into())));
        let (tx, mut rx) = mpsc::unbounded_channel();
        let emitter = WalEmitter::new(Arc::clone(&wal) as Arc<dyn WalBackend>, vec![failing], tx);

        emitter.emit(ev("run_started")).unwrap();
        assert_eq!(wal.iter_events(None).unwrap().len(), 1);
        assert_eq!(rx.try_recv().unwrap().kind, "run_started");
    }

    #[test]
    fn stream_only_skips_wal() {
        let wal = Arc::new(InMemoryWal::new());
        let (tx, mut rx) = mpsc::unbounded_channel();
        let emitter = WalEmitter::new(Arc::clone(&wal) as Arc<dyn WalBackend>, Vec::new(), tx);

        emitter.stream_only(ev("tool_side"));
        assert!(wal.iter_events(None).unwrap().is_empty());
        assert_eq!(rx.try_recv().unwrap().kind, "tool_side");
    }

    #[test]
    fn append_skips_hooks_and_stream() {
        let wal = Arc::new(InMemoryWal::new());
        let (tx, mut rx) = mpsc::unbounded_channel();
        let emitter = WalEmitter::new(Arc::clone(&wal) as Arc<dyn WalBackend>, Vec::new(), tx);

        emitter.append(&ev("buffered")).unwrap();
        assert_eq!(wal.iter_events(None).unwrap().len(), 1);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn dropped_receiver_does_not_fail_emit() {
        let wal = Arc::new(InMemoryWal::new());
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);
        let emitter = WalEmitter::new(Arc::clone(&wal) as Arc<dyn WalBackend>, Vec::new(), tx);
        emitter.emit(ev("run_started")).unwrap();
        assert_eq!(wal.iter_events(None).unwrap().len(), 1);
    }
}
