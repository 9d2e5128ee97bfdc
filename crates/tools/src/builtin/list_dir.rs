//! List a workspace directory (sorted, names + kind + size).

use async_trait::async_trait;
use serde::Deserialize;

use relay_domain::tool::{ToolCall, ToolErrorKind, ToolResult, ToolResultPayload, ToolSpec};

use crate::context::ToolExecutionContext;
use crate::registry::ToolHandler;

#[derive(Debug, Deserialize)]
struct ListDirArgs {
    #[serde(default = "default_dot")]
    path: String,
}

fn default_dot() -> String {
    ".".into()
}

pub fn spec() -> ToolSpec {
    ToolSpec {
        name: "list_dir".into(),
        description: "List entries of a workspace directory.".into(),
        parameters: serde_json::json!({
            "type": "object",
            "properties": {
                "path": { "type": "string", "description": "Directory path relative to the workspace root (default '.')" }
            }
        }),
        requires_approval: Some(false),
        sandbox_policy: None,
        idempotency: Some(relay_domain::tool::Idempotency::Safe),
    }
}

pub struct ListDirTool;

#[async_trait]
impl ToolHandler for ListDirTool {
    async fn call(&self, call: &ToolCall, ctx: &ToolExecutionContext) -> ToolResult {
        let args: ListDirArgs = match serde_json::from_value(call.args.clone()) {
            Ok(a) => a,
            Err(e) => {
                return ToolResult::error_payload(
                    ToolErrorKind::Validation,
                    format!("invalid list_dir arguments: {e}"),
                )
            }
        };

        let path = match ctx.resolve_path(&args.path) {
            Ok(p) => p,
            Err(msg) => return ToolResult::error_payload(ToolErrorKind::Permission, msg),
        };
        if !path.is_dir() {
            return ToolResult::error_payload(
                ToolErrorKind::NotFound,
                format!("not a directory: {}", args.path),
            );
        }

        let started = std::time::Instant::now();
        let mut read_dir = match tokio::fs::read_dir(&path).await {
            Ok(rd) => rd,
            Err(e) => {
                return ToolResult::error_payload(
                    ToolErrorKind::Unknown,
                    format!("failed to list '{}': {e}", args.path),
                )
            }
        };

        let mut entries = Vec::new();
        while let Ok(Some(entry)) = read_dir.next_entry().await {
            let meta = entry.metadata().await.ok();
            let name = entry.file_name().to_string_lossy().into_owned();
            let is_dir = meta.as_ref().map(|m| m.is_dir()).unwrap_or(false);
            let size = meta.map(|m| m.len()).unwrap_or(0);
            entries.push(serde_json::json!({
                "name": name,
                "is_dir": is_dir,
                "size": size,
            }));
        }
        entries.sort_by(|a, b| {
            a["name"]
                .as_str()
                .unwrap_or_default()
                .cmp(b["name"].as_str().unwrap_or_default())
        });

        let listing = entries
            .iter()
            .map(|e| {
                format!(
                    "{}{}",
                    e["name"].as_str().unwrap_or_default(),
                    if e["is_dir"].as_bool().unwrap_or(false) {
                        "/"
                    } else {
                        ""
                    }
                )
            })
            .collect::<Vec<_>>()
            .join("\n");

        ToolResult::from_payload(
            ToolResultPayload {
                ok: true,
                stdout: listing,
                exit_code: Some(0),
                duration_ms: started.elapsed().as_millis() as u64,
                data: Some(serde_json::json!({
                    "path": args.path,
                    "entries": entries,
                })),
                ..Default::default()
            },
            None,
        )
    }
}
