//! Ask the human a question through the configured provider.
//!
//! Emits `human_request` before waiting and `human_response` after the
//! answer arrives; with no provider configured the call fails with
//! `human_required` so the model can route around it.

use async_trait::async_trait;
use serde::Deserialize;

use relay_domain::event::AgentEvent;
use relay_domain::tool::{ToolCall, ToolErrorKind, ToolResult, ToolSpec};

use crate::context::ToolExecutionContext;
use crate::registry::ToolHandler;

#[derive(Debug, Deserialize)]
struct AskHumanArgs {
    question: String,
    #[serde(default)]
    choices: Option<Vec<String>>,
    #[serde(default)]
    timeout_ms: Option<u64>,
}

pub fn spec() -> ToolSpec {
    ToolSpec {
        name: "ask_human".into(),
        description: "Ask the human operator a question and wait for the answer.".into(),
        parameters: serde_json::json!({
            "type": "object",
            "properties": {
                "question": { "type": "string" },
                "choices": { "type": "array", "items": { "type": "string" } },
                "timeout_ms": { "type": "integer" }
            },
            "required": ["question"]
        }),
        requires_approval: Some(false),
        sandbox_policy: None,
        idempotency: Some(relay_domain::tool::Idempotency::Safe),
    }
}

pub struct AskHumanTool;

#[async_trait]
impl ToolHandler for AskHumanTool {
    async fn call(&self, call: &ToolCall, ctx: &ToolExecutionContext) -> ToolResult {
        let args: AskHumanArgs = match serde_json::from_value(call.args.clone()) {
            Ok(a) => a,
            Err(e) => {
                return ToolResult::error_payload(
                    ToolErrorKind::Validation,
                    format!("invalid ask_human arguments: {e}"),
                )
            }
        };

        let Some(human_io) = ctx.human_io.clone() else {
            return ToolResult::error_payload(
                ToolErrorKind::HumanRequired,
                "no human-I/O provider is configured",
            );
        };

        if let Err(e) = ctx.emit_event(AgentEvent::new(
            "human_request",
            ctx.run_id.clone(),
            serde_json::json!({
                "call_id": call.call_id,
                "question": args.question,
                "choices": args.choices,
            }),
        )) {
            return ToolResult::error_payload(
                ToolErrorKind::Unknown,
                format!("failed to record human request: {e}"),
            );
        }

        let timeout_ms = args.timeout_ms.or(Some(ctx.default_timeout_ms));
        let answer = match human_io
            .request_human_input(
                &call.call_id,
                &args.question,
                args.choices.as_deref(),
                None,
                timeout_ms,
            )
            .await
        {
            Ok(answer) => answer,
            Err(e) => {
                return ToolResult::error_payload(
                    ToolErrorKind::Timeout,
                    format!("human input unavailable: {e}"),
                )
            }
        };

        if let Err(e) = ctx.emit_event(AgentEvent::new(
            "human_response",
            ctx.run_id.clone(),
            serde_json::json!({"call_id": call.call_id, "answer": answer}),
        )) {
            return ToolResult::error_payload(
                ToolErrorKind::Unknown,
                format!("failed to record human response: {e}"),
            );
        }

        ToolResult::ok_payload(
            answer.clone(),
            Some(serde_json::json!({"answer": answer})),
            0,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::HumanIoProvider;
    use relay_domain::error::Result;
    use serde_json::Value;
    use std::sync::Arc;

    struct ScriptedHuman(&'static str);

    #[async_trait]
    impl HumanIoProvider for ScriptedHuman {
        async fn request_human_input(
            &self,
            _call_id: &str,
            _question: &str,
            _choices: Option<&[String]>,
            _context: Option<&Value>,
            _timeout_ms: Option<u64>,
        ) -> Result<String> {
            Ok(self.0.to_owned())
        }
    }

    fn call() -> ToolCall {
        ToolCall {
            call_id: "c1".into(),
            name: "ask_human".into(),
            args: serde_json::json!({"question": "continue?", "choices": ["yes", "no"]}),
            raw_arguments: None,
        }
    }

    #[tokio::test]
    async fn round_trip_emits_request_and_response() {
        let dir = tempfile::tempdir().unwrap();
        let mut ctx = ToolExecutionContext::new(dir.path(), "r1");
        ctx.human_io = Some(Arc::new(ScriptedHuman("yes")));

        let result = AskHumanTool.call(&call(), &ctx).await;
        assert!(result.ok);
        assert_eq!(result.details_object()["data"]["answer"], "yes");

        let events = ctx.take_pending_events();
        let kinds: Vec<&str> = events.iter().map(|e| e.kind.as_str()).collect();
        assert_eq!(kinds, vec!["human_request", "human_response"]);
        assert_eq!(events[1].payload["answer"], "yes");
    }

    #[tokio::test]
    async fn no_provider_is_human_required() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = ToolExecutionContext::new(dir.path(), "r1");
        let result = AskHumanTool.call(&call(), &ctx).await;
        assert_eq!(result.error_kind, Some(ToolErrorKind::HumanRequired));
    }
}
