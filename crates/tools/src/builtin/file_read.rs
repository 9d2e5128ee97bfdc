//! Read a file from the workspace with optional line offset/limit.

use async_trait::async_trait;
use serde::Deserialize;

use relay_domain::tool::{ToolCall, ToolErrorKind, ToolResult, ToolResultPayload, ToolSpec};

use crate::context::ToolExecutionContext;
use crate::registry::ToolHandler;

#[derive(Debug, Deserialize)]
struct FileReadArgs {
    path: String,
    #[serde(default)]
    offset: Option<usize>,
    #[serde(default)]
    limit: Option<usize>,
}

pub fn spec() -> ToolSpec {
    ToolSpec {
        name: "file_read".into(),
        description: "Read a UTF-8 text file from the workspace. Supports line offset/limit.".into(),
        parameters: serde_json::json!({
            "type": "object",
            "properties": {
                "path": { "type": "string", "description": "Path relative to the workspace root" },
                "offset": { "type": "integer", "description": "Line number to start from (0-based)" },
                "limit": { "type": "integer", "description": "Maximum number of lines to return" }
            },
            "required": ["path"]
        }),
        requires_approval: Some(false),
        sandbox_policy: None,
        idempotency: Some(relay_domain::tool::Idempotency::Safe),
    }
}

pub struct FileReadTool;

#[async_trait]
impl ToolHandler for FileReadTool {
    async fn call(&self, call: &ToolCall, ctx: &ToolExecutionContext) -> ToolResult {
        let args: FileReadArgs = match serde_json::from_value(call.args.clone()) {
            Ok(a) => a,
            Err(e) => {
                return ToolResult::error_payload(
                    ToolErrorKind::Validation,
                    format!("invalid file_read arguments: {e}"),
                )
            }
        };

        let path = match ctx.resolve_path(&args.path) {
            Ok(p) => p,
            Err(msg) => return ToolResult::error_payload(ToolErrorKind::Permission, msg),
        };
        if !path.exists() {
            return ToolResult::error_payload(
                ToolErrorKind::NotFound,
                format!("file not found: {}", args.path),
            );
        }

        let started = std::time::Instant::now();
        let mut raw = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) => {
                return ToolResult::error_payload(
                    ToolErrorKind::Unknown,
                    format!("failed to read '{}': {e}", args.path),
                )
            }
        };

        let mut truncated = false;
        if raw.len() as u64 > ctx.max_file_bytes {
            raw.truncate(ctx.max_file_bytes as usize);
            // Back off to a char boundary.
            while !raw.is_empty() && std::str::from_utf8(&raw).is_err() {
                raw.pop();
            }
            truncated = true;
        }
        let content = match String::from_utf8(raw) {
            Ok(s) => s,
            Err(_) => {
                return ToolResult::error_payload(
                    ToolErrorKind::Validation,
                    format!("file is not valid UTF-8: {}", args.path),
                )
            }
        };

        let lines: Vec<&str> = content.lines().collect();
        let total_lines = lines.len();
        let offset = args.offset.unwrap_or(0);
        let limit = args.limit.unwrap_or(total_lines.saturating_sub(offset));
        let selected: Vec<&str> = lines.into_iter().skip(offset).take(limit).collect();
        let lines_returned = selected.len();

        ToolResult::from_payload(
            ToolResultPayload {
                ok: true,
                stdout: ctx.redact_text(&selected.join("\n")),
                exit_code: Some(0),
                duration_ms: started.elapsed().as_millis() as u64,
                truncated,
                data: Some(serde_json::json!({
                    "path": args.path,
                    "total_lines": total_lines,
                    "offset": offset,
                    "lines_returned": lines_returned,
                })),
                ..Default::default()
            },
            None,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn call(args: serde_json::Value) -> ToolCall {
        ToolCall {
            call_id: "c1".into(),
            name: "file_read".into(),
            args,
            raw_arguments: None,
        }
    }

    #[tokio::test]
    async fn reads_with_offset_and_limit() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), "l0\nl1\nl2\nl3\n").unwrap();
        let ctx = ToolExecutionContext::new(dir.path(), "r1");

        let result = FileReadTool
            .call(
                &call(serde_json::json!({"path": "a.txt", "offset": 1, "limit": 2})),
                &ctx,
            )
            .await;
        assert!(result.ok);
        let details = result.details_object();
        assert_eq!(details["stdout"], "l1\nl2");
        assert_eq!(details["data"]["total_lines"], 4);
    }

    #[tokio::test]
    async fn missing_file_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = ToolExecutionContext::new(dir.path(), "r1");
        let result = FileReadTool
            .call(&call(serde_json::json!({"path": "ghost.txt"})), &ctx)
            .await;
        assert_eq!(result.error_kind, Some(ToolErrorKind::NotFound));
    }

    #[tokio::test]
    async fn escape_attempt_is_permission_error() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = ToolExecutionContext::new(dir.path(), "r1");
        let result = FileReadTool
            .call(&call(serde_json::json!({"path": "../etc/passwd"})), &ctx)
            .await;
        assert_eq!(result.error_kind, Some(ToolErrorKind::Permission));
    }

    #[tokio::test]
    async fn oversized_file_is_truncated() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("big.txt"), "x".repeat(4096)).unwrap();
        let mut ctx = ToolExecutionContext::new(dir.path(), "r1");
        ctx.max_file_bytes = 100;
        let result = FileReadTool
            .call(&call(serde_json::json!({"path": "big.txt"})), &ctx)
            .await;
        assert!(result.ok);
        assert_eq!(result.details_object()["truncated"], true);
    }
}
