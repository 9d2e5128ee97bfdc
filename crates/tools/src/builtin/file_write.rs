//! Write a file into the workspace (atomic: temp sibling + rename).

use async_trait::async_trait;
use serde::Deserialize;
use tokio::io::AsyncWriteExt;

use relay_domain::tool::{ToolCall, ToolErrorKind, ToolResult, ToolResultPayload, ToolSpec};

use crate::context::ToolExecutionContext;
use crate::registry::ToolHandler;

#[derive(Debug, Deserialize)]
struct FileWriteArgs {
    path: String,
    content: String,
    #[serde(default)]
    create_dirs: bool,
}

pub fn spec() -> ToolSpec {
    ToolSpec {
        name: "file_write".into(),
        description: "Create or overwrite a UTF-8 text file in the workspace.".into(),
        parameters: serde_json::json!({
            "type": "object",
            "properties": {
                "path": { "type": "string", "description": "Path relative to the workspace root" },
                "content": { "type": "string", "description": "Full file content" },
                "create_dirs": { "type": "boolean", "description": "Create missing parent directories" }
            },
            "required": ["path", "content"]
        }),
        requires_approval: Some(true),
        sandbox_policy: None,
        idempotency: Some(relay_domain::tool::Idempotency::Unsafe),
    }
}

pub struct FileWriteTool;

#[async_trait]
impl ToolHandler for FileWriteTool {
    async fn call(&self, call: &ToolCall, ctx: &ToolExecutionContext) -> ToolResult {
        let args: FileWriteArgs = match serde_json::from_value(call.args.clone()) {
            Ok(a) => a,
            Err(e) => {
                return ToolResult::error_payload(
                    ToolErrorKind::Validation,
                    format!("invalid file_write arguments: {e}"),
                )
            }
        };

        let path = match ctx.resolve_path(&args.path) {
            Ok(p) => p,
            Err(msg) => return ToolResult::error_payload(ToolErrorKind::Permission, msg),
        };

        if args.content.len() as u64 > ctx.max_file_bytes {
            return ToolResult::error_payload(
                ToolErrorKind::Validation,
                format!(
                    "content is {} bytes, exceeding the {} byte limit",
                    args.content.len(),
                    ctx.max_file_bytes
                ),
            );
        }

        let started = std::time::Instant::now();
        if let Some(parent) = path.parent() {
            if !parent.exists() {
                if !args.create_dirs {
                    return ToolResult::error_payload(
                        ToolErrorKind::NotFound,
                        format!("parent directory does not exist: {}", args.path),
                    );
                }
                if let Err(e) = tokio::fs::create_dir_all(parent).await {
                    return ToolResult::error_payload(
                        ToolErrorKind::Unknown,
                        format!("failed to create directories for '{}': {e}", args.path),
                    );
                }
            }
        }

        let tmp = path.with_extension(format!("tmp.{}", uuid::Uuid::new_v4().simple()));
        let write_result = async {
            let mut file = tokio::fs::File::create(&tmp).await?;
            file.write_all(args.content.as_bytes()).await?;
            file.flush().await?;
            tokio::fs::rename(&tmp, &path).await
        }
        .await;

        if let Err(e) = write_result {
            let _ = tokio::fs::remove_file(&tmp).await;
            return ToolResult::error_payload(
                ToolErrorKind::Unknown,
                format!("failed to write '{}': {e}", args.path),
            );
        }

        ToolResult::from_payload(
            ToolResultPayload {
                ok: true,
                exit_code: Some(0),
                duration_ms: started.elapsed().as_millis() as u64,
                data: Some(serde_json::json!({
                    "path": args.path,
                    "bytes_written": args.content.len(),
                })),
                ..Default::default()
            },
            None,
        )
    }
}
