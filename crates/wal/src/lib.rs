//! Append-only event log (WAL) backends, the single-exit event emitter,
//! and replay/fork helpers for resuming runs.

pub mod backend;
pub mod emitter;
pub mod fork;
pub mod jsonl;
pub mod replay;

pub use backend::{InMemoryWal, WalBackend};
pub use emitter::{EventHook, WalEmitter};
pub use jsonl::JsonlWal;
pub use replay::{events_after_last_run_started, rebuild_resume_replay_state, ResumeReplayState};
