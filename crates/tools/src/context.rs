//! Execution context handed to every tool handler.
//!
//! The context is the only surface handlers get: workspace-rooted path
//! resolution, run-scoped environment, secret redaction, and a buffered
//! side-event channel that keeps the approval/event ordering intact.

use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;

use relay_domain::cancel::CancelToken;
use relay_domain::error::Result;
use relay_domain::event::AgentEvent;
use relay_domain::skill::SkillResolver;
use relay_wal::WalBackend;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Provider contracts
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Human-input adapter. The runtime never reads stdin itself.
#[async_trait]
pub trait HumanIoProvider: Send + Sync {
    /// Ask a human a question and return the answer text. `context` is a
    /// UI-only envelope and must never carry secret values.
    async fn request_human_input(
        &self,
        call_id: &str,
        question: &str,
        choices: Option<&[String]>,
        context: Option<&Value>,
        timeout_ms: Option<u64>,
    ) -> Result<String>;
}

/// Sandbox adapter contract (implementations live outside the core).
///
/// `wrap` rewrites an argv so it runs under the requested policy; an
/// `Err` maps to a `sandbox_denied` tool result.
pub trait SandboxAdapter: Send + Sync {
    fn wrap(&self, argv: Vec<String>, policy: &str) -> Result<Vec<String>>;
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// ToolExecutionContext
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// What handlers see during one dispatch.
#[derive(Clone)]
pub struct ToolExecutionContext {
    pub workspace_root: PathBuf,
    pub run_id: String,
    pub wal: Option<Arc<dyn WalBackend>>,
    pub human_io: Option<Arc<dyn HumanIoProvider>>,
    /// Run-scoped environment overlay (never serialized into events).
    pub env: HashMap<String, String>,
    pub cancel: CancelToken,
    pub redaction_values: Vec<String>,
    pub default_timeout_ms: u64,
    pub max_file_bytes: u64,
    pub sandbox_policy_default: String,
    pub sandbox_adapter: Option<Arc<dyn SandboxAdapter>>,
    pub skills: Option<Arc<dyn SkillResolver>>,
    /// Side events queued for the dispatcher's ordered stream flush.
    event_sink: Arc<Mutex<Vec<AgentEvent>>>,
}

impl ToolExecutionContext {
    pub fn new(workspace_root: impl Into<PathBuf>, run_id: impl Into<String>) -> Self {
        Self {
            workspace_root: workspace_root.into(),
            run_id: run_id.into(),
            wal: None,
            human_io: None,
            env: HashMap::new(),
            cancel: CancelToken::new(),
            redaction_values: Vec::new(),
            default_timeout_ms: 60_000,
            max_file_bytes: 1_048_576,
            sandbox_policy_default: "inherit".into(),
            sandbox_adapter: None,
            skills: None,
            event_sink: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Resolve a requested path to an absolute path under the workspace
    /// root.
    ///
    /// Rejects `..` components up front, then canonicalizes the nearest
    /// existing ancestor so symlink escapes are caught before the final
    /// containment check.
    pub fn resolve_path(&self, requested: &str) -> std::result::Result<PathBuf, String> {
        let requested_path = Path::new(requested);

        for component in requested_path.components() {
            if matches!(component, Component::ParentDir) {
                return Err("path must not contain '..' components".to_owned());
            }
        }

        let canonical_root = self.workspace_root.canonicalize().map_err(|e| {
            format!(
                "cannot resolve workspace root '{}': {e}",
                self.workspace_root.display()
            )
        })?;

        let candidate = if requested_path.is_absolute() {
            requested_path.to_path_buf()
        } else {
            canonical_root.join(requested_path)
        };

        let resolved = if candidate.exists() {
            candidate
                .canonicalize()
                .map_err(|e| format!("cannot resolve path '{}': {e}", candidate.display()))?
        } else {
            // Canonicalize the longest existing ancestor, then re-append
            // the missing tail.
            let mut existing = candidate.as_path();
            let mut tail: Vec<&std::ffi::OsStr> = Vec::new();
            loop {
                if existing.exists() {
                    break;
                }
                match existing.parent() {
                    Some(parent) => {
                        if let Some(name) = existing.file_name() {
                            tail.push(name);
                        }
                        existing = parent;
                    }
                    None => break,
                }
            }
            let mut resolved = existing.canonicalize().map_err(|e| {
                format!("cannot resolve ancestor of '{}': {e}", candidate.display())
            })?;
            for part in tail.into_iter().rev() {
                resolved.push(part);
            }
            resolved
        };

        if !resolved.starts_with(&canonical_root) {
            return Err(format!(
                "path '{requested}' resolves outside the workspace root"
            ));
        }

        Ok(resolved)
    }

    /// Process env + run-scoped env + per-call extras, in that order.
    pub fn merged_env(&self, extra: &HashMap<String, String>) -> HashMap<String, String> {
        let mut merged: HashMap<String, String> = std::env::vars().collect();
        merged.extend(self.env.iter().map(|(k, v)| (k.clone(), v.clone())));
        merged.extend(extra.iter().map(|(k, v)| (k.clone(), v.clone())));
        merged
    }

    /// Substitute known secret values (length ≥ 4) with `<redacted>`.
    pub fn redact_text(&self, text: &str) -> String {
        let mut out = text.to_owned();
        for value in &self.redaction_values {
            let v = value.trim();
            if v.len() < 4 {
                continue;
            }
            out = out.replace(v, "<redacted>");
        }
        out
    }

    /// Emit a tool-side event: durably appended to the WAL now, streamed
    /// by the dispatcher after the handler returns.
    pub fn emit_event(&self, ev: AgentEvent) -> Result<()> {
        if let Some(wal) = &self.wal {
            wal.append(&ev)?;
        }
        self.event_sink.lock().push(ev);
        Ok(())
    }

    /// Drain buffered side events (dispatcher only).
    pub fn take_pending_events(&self) -> Vec<AgentEvent> {
        std::mem::take(&mut *self.event_sink.lock())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx_in(dir: &Path) -> ToolExecutionContext {
        ToolExecutionContext::new(dir, "r1")
    }

    #[test]
    fn resolve_path_allows_relative_inside_workspace() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = ctx_in(dir.path());
        let resolved = ctx.resolve_path("sub/file.txt").unwrap();
        assert!(resolved.starts_with(dir.path().canonicalize().unwrap()));
    }

    #[test]
    fn resolve_path_rejects_parent_components() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = ctx_in(dir.path());
        assert!(ctx.resolve_path("../outside.txt").is_err());
        assert!(ctx.resolve_path("a/../../outside.txt").is_err());
    }

    #[test]
    fn resolve_path_rejects_absolute_outside_workspace() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = ctx_in(dir.path());
        assert!(ctx.resolve_path("/etc/passwd").is_err());
    }

    #[cfg(unix)]
    #[test]
    fn resolve_path_rejects_symlink_escape() {
        let dir = tempfile::tempdir().unwrap();
        let outside = tempfile::tempdir().unwrap();
        std::os::unix::fs::symlink(outside.path(), dir.path().join("link")).unwrap();
        let ctx = ctx_in(dir.path());
        assert!(ctx.resolve_path("link/escape.txt").is_err());
    }

    #[test]
    fn merged_env_layering() {
        let dir = tempfile::tempdir().unwrap();
        let mut ctx = ctx_in(dir.path());
        ctx.env.insert("RUN_SCOPED".into(), "run".into());
        let mut extra = HashMap::new();
        extra.insert("RUN_SCOPED".into(), "call".into());
        let merged = ctx.merged_env(&extra);
        assert_eq!(merged.get("RUN_SCOPED").map(String::as_str), Some("call"));
    }

    #[test]
    fn redact_text_replaces_known_values() {
        let dir = tempfile::tempdir().unwrap();
        let mut ctx = ctx_in(dir.path());
        ctx.redaction_values = vec!["sk-abcdef".into(), "xy".into()];
        assert_eq!(ctx.redact_text("key sk-abcdef xy"), "key <redacted> xy");
    }

    #[test]
    fn emit_event_buffers_for_flush() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = ctx_in(dir.path());
        ctx.emit_event(AgentEvent::new("plan_updated", "r1", serde_json::json!({})))
            .unwrap();
        let drained = ctx.take_pending_events();
        assert_eq!(drained.len(), 1);
        assert!(ctx.take_pending_events().is_empty());
    }
}
