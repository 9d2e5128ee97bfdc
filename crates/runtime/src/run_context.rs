//! Shared mutable state for one run.
//!
//! All events leave through [`RunContext::emit`] so the WAL append →
//! hooks → stream order holds for the whole run, and every terminal
//! path produces exactly one `run_completed | run_failed |
//! run_cancelled` event through the helpers here.

use std::path::PathBuf;
use std::sync::Arc;

use serde_json::Value;

use relay_domain::error::Result;
use relay_domain::event::AgentEvent;
use relay_domain::message::Message;
use relay_domain::run::{RunError, RunResult, RunStatus};
use relay_wal::{WalBackend, WalEmitter};

pub struct RunContext {
    pub run_id: String,
    pub run_dir: PathBuf,
    pub wal: Arc<dyn WalBackend>,
    pub wal_locator: String,
    pub emitter: WalEmitter,
    pub history: Vec<Message>,
    pub artifacts_dir: PathBuf,

    pub compactions_performed: u32,
    pub compaction_artifacts: Vec<String>,
    terminal_notices: Vec<Value>,
}

impl RunContext {
    pub fn new(
        run_id: String,
        run_dir: PathBuf,
        wal: Arc<dyn WalBackend>,
        emitter: WalEmitter,
        artifacts_dir: PathBuf,
    ) -> Self {
        let wal_locator = wal.locator();
        Self {
            run_id,
            run_dir,
            wal,
            wal_locator,
            emitter,
            history: Vec::new(),
            artifacts_dir,
            compactions_performed: 0,
            compaction_artifacts: Vec::new(),
            terminal_notices: Vec::new(),
        }
    }

    /// Durable event exit (WAL append → hooks → stream).
    pub fn emit(&self, ev: AgentEvent) -> Result<()> {
        self.emitter.emit(ev)
    }

    pub fn event(&self, kind: &str, payload: Value) -> AgentEvent {
        AgentEvent::new(kind, self.run_id.clone(), payload)
    }

    /// Write a text artifact (`NNN_<kind>.md`) and return its path.
    pub fn write_text_artifact(&mut self, kind: &str, content: &str) -> Result<String> {
        std::fs::create_dir_all(&self.artifacts_dir)?;
        let index = self.compaction_artifacts.len() + 1;
        let name = format!("{index:03}_{kind}.md");
        let path = self.artifacts_dir.join(name);
        std::fs::write(&path, content)?;
        let path_str = path.to_string_lossy().into_owned();
        self.compaction_artifacts.push(path_str.clone());
        Ok(path_str)
    }

    /// Recompute terminal notices from the run counters.
    pub fn refresh_terminal_notices(&mut self) {
        self.terminal_notices.clear();
        if self.compactions_performed == 0 {
            return;
        }
        self.terminal_notices.push(serde_json::json!({
            "kind": "context_compacted",
            "count": self.compactions_performed,
            "message": format!(
                "History was compacted {} time(s) during this run; the summary may omit details.",
                self.compactions_performed
            ),
            "suggestion": "Consider splitting the task or starting a new run seeded with the handoff summary.",
        }));
    }

    fn base_metadata(&mut self) -> Value {
        self.refresh_terminal_notices();
        let mut metadata = serde_json::json!({});
        if !self.terminal_notices.is_empty() {
            metadata["notices"] = Value::Array(self.terminal_notices.clone());
        }
        metadata
    }

    fn events_path(&self) -> Option<String> {
        // The back-compat alias applies to filesystem WALs only.
        if self.wal_locator.starts_with("wal://") {
            None
        } else {
            Some(self.wal_locator.clone())
        }
    }

    /// Terminal: `run_completed`.
    pub fn finish_completed(
        &mut self,
        final_output: String,
        extra_metadata: Option<Value>,
    ) -> Result<RunResult> {
        let mut metadata = self.base_metadata();
        if let Some(extra) = extra_metadata {
            if let (Some(into), Some(from)) = (metadata.as_object_mut(), extra.as_object()) {
                for (k, v) in from {
                    into.insert(k.clone(), v.clone());
                }
            }
        }
        self.emit(self.event(
            "run_completed",
            serde_json::json!({
                "final_output": final_output,
                "artifacts": self.compaction_artifacts,
                "metadata": metadata,
                "wal_locator": self.wal_locator,
            }),
        ))?;
        Ok(RunResult {
            status: RunStatus::Completed,
            run_id: self.run_id.clone(),
            final_output,
            wal_locator: self.wal_locator.clone(),
            events_path: self.events_path(),
            artifacts: self.compaction_artifacts.clone(),
            metadata,
            error: None,
        })
    }

    /// Terminal: `run_failed`.
    pub fn finish_failed(&mut self, error: RunError) -> Result<RunResult> {
        let mut payload = error.to_payload();
        payload["wal_locator"] = self.wal_locator.clone().into();
        self.emit(self.event("run_failed", payload))?;
        Ok(RunResult {
            status: RunStatus::Failed,
            run_id: self.run_id.clone(),
            final_output: error.message.clone(),
            wal_locator: self.wal_locator.clone(),
            events_path: self.events_path(),
            artifacts: self.compaction_artifacts.clone(),
            metadata: self.base_metadata(),
            error: Some(error),
        })
    }

    /// Terminal: `run_cancelled`.
    pub fn finish_cancelled(&mut self, message: &str) -> Result<RunResult> {
        self.emit(self.event(
            "run_cancelled",
            serde_json::json!({"message": message, "wal_locator": self.wal_locator}),
        ))?;
        Ok(RunResult {
            status: RunStatus::Cancelled,
            run_id: self.run_id.clone(),
            final_output: message.to_owned(),
            wal_locator: self.wal_locator.clone(),
            events_path: self.events_path(),
            artifacts: self.compaction_artifacts.clone(),
            metadata: self.base_metadata(),
            error: None,
        })
    }
}
