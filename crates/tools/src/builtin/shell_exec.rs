//! Run a command (argv form) under the workspace root.
//!
//! Timeouts map to `timeout`, a polled cancellation to `cancelled`, a
//! non-zero exit to `exit_code`. A sandbox adapter, when present, wraps
//! the argv for the requested policy; a refused wrap is `sandbox_denied`.

use std::collections::HashMap;
use std::process::Stdio;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::process::Command;

use relay_domain::tool::{ToolCall, ToolErrorKind, ToolResult, ToolResultPayload, ToolSpec};

use crate::context::ToolExecutionContext;
use crate::registry::ToolHandler;

const MAX_CAPTURED_BYTES: usize = 131_072;

#[derive(Debug, Deserialize)]
struct ShellExecArgs {
    argv: Vec<String>,
    #[serde(default)]
    cwd: Option<String>,
    #[serde(default)]
    env: Option<HashMap<String, String>>,
    #[serde(default)]
    timeout_ms: Option<u64>,
    #[serde(default)]
    sandbox: Option<String>,
}

pub fn spec() -> ToolSpec {
    ToolSpec {
        name: "shell_exec".into(),
        description: "Run a command (argv form) inside the workspace and capture its output.".into(),
        parameters: serde_json::json!({
            "type": "object",
            "properties": {
                "argv": {
                    "type": "array",
                    "items": { "type": "string" },
                    "description": "Command and arguments"
                },
                "cwd": { "type": "string", "description": "Working directory relative to the workspace root" },
                "env": { "type": "object", "description": "Extra environment variables" },
                "timeout_ms": { "type": "integer", "description": "Hard timeout in milliseconds" },
                "sandbox": { "type": "string", "description": "Sandbox policy (inherit|none|restricted)" }
            },
            "required": ["argv"]
        }),
        requires_approval: Some(true),
        sandbox_policy: Some("inherit".into()),
        idempotency: Some(relay_domain::tool::Idempotency::Unknown),
    }
}

fn clip(bytes: &[u8]) -> (String, bool) {
    if bytes.len() <= MAX_CAPTURED_BYTES {
        return (String::from_utf8_lossy(bytes).into_owned(), false);
    }
    (
        String::from_utf8_lossy(&bytes[..MAX_CAPTURED_BYTES]).into_owned(),
        true,
    )
}

pub struct ShellExecTool;

#[async_trait]
impl ToolHandler for ShellExecTool {
    async fn call(&self, call: &ToolCall, ctx: &ToolExecutionContext) -> ToolResult {
        let args: ShellExecArgs = match serde_json::from_value(call.args.clone()) {
            Ok(a) => a,
            Err(e) => {
                return ToolResult::error_payload(
                    ToolErrorKind::Validation,
                    format!("invalid shell_exec arguments: {e}"),
                )
            }
        };
        if args.argv.is_empty() {
            return ToolResult::error_payload(ToolErrorKind::Validation, "argv must be non-empty");
        }
        if ctx.cancel.is_cancelled() {
            return ToolResult::error_payload(ToolErrorKind::Cancelled, "run was cancelled");
        }

        let policy = args
            .sandbox
            .clone()
            .unwrap_or_else(|| ctx.sandbox_policy_default.clone());
        let argv = match &ctx.sandbox_adapter {
            Some(adapter) => match adapter.wrap(args.argv.clone(), &policy) {
                Ok(wrapped) => wrapped,
                Err(e) => {
                    return ToolResult::error_payload(
                        ToolErrorKind::SandboxDenied,
                        format!("sandbox refused the command: {e}"),
                    )
                }
            },
            None => args.argv.clone(),
        };

        let cwd = match &args.cwd {
            Some(requested) => match ctx.resolve_path(requested) {
                Ok(p) => p,
                Err(msg) => return ToolResult::error_payload(ToolErrorKind::Permission, msg),
            },
            None => ctx.workspace_root.clone(),
        };

        let mut cmd = Command::new(&argv[0]);
        cmd.args(&argv[1..])
            .current_dir(&cwd)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .env_clear()
            .envs(ctx.merged_env(args.env.as_ref().unwrap_or(&HashMap::new())))
            .kill_on_drop(true);

        let started = std::time::Instant::now();
        let timeout_ms = args.timeout_ms.unwrap_or(ctx.default_timeout_ms);
        let timeout = std::time::Duration::from_millis(timeout_ms);

        let child = match cmd.spawn() {
            Ok(c) => c,
            Err(e) => {
                return ToolResult::error_payload(
                    ToolErrorKind::NotFound,
                    format!("failed to spawn '{}': {e}", argv[0]),
                )
            }
        };

        let output = match tokio::time::timeout(timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                return ToolResult::error_payload(
                    ToolErrorKind::Unknown,
                    format!("command failed: {e}"),
                )
            }
            Err(_) => {
                return ToolResult::from_payload(
                    ToolResultPayload {
                        ok: false,
                        stderr: format!("command timed out after {timeout_ms}ms"),
                        duration_ms: started.elapsed().as_millis() as u64,
                        error_kind: Some(ToolErrorKind::Timeout),
                        retryable: true,
                        ..Default::default()
                    },
                    Some("command timed out"),
                );
            }
        };

        let (stdout, out_clipped) = clip(&output.stdout);
        let (stderr, err_clipped) = clip(&output.stderr);
        let exit_code = output.status.code();
        let ok = exit_code == Some(0);

        ToolResult::from_payload(
            ToolResultPayload {
                ok,
                stdout: ctx.redact_text(&stdout),
                stderr: ctx.redact_text(&stderr),
                exit_code,
                duration_ms: started.elapsed().as_millis() as u64,
                truncated: out_clipped || err_clipped,
                error_kind: if ok {
                    None
                } else {
                    Some(ToolErrorKind::ExitCode)
                },
                ..Default::default()
            },
            if ok { None } else { Some("non-zero exit code") },
        )
    }
}
