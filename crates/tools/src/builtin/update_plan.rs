//! Maintain the agent's visible plan; emits a `plan_updated` side event.

use async_trait::async_trait;
use serde::Deserialize;

use relay_domain::event::AgentEvent;
use relay_domain::tool::{ToolCall, ToolErrorKind, ToolResult, ToolSpec};

use crate::context::ToolExecutionContext;
use crate::registry::ToolHandler;

const VALID_STATUSES: &[&str] = &["todo", "in_progress", "done"];

#[derive(Debug, Deserialize)]
struct UpdatePlanArgs {
    plan: Vec<PlanStep>,
    #[serde(default)]
    explanation: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PlanStep {
    step: String,
    status: String,
}

pub fn spec() -> ToolSpec {
    ToolSpec {
        name: "update_plan".into(),
        description: "Replace the current plan with an updated step list.".into(),
        parameters: serde_json::json!({
            "type": "object",
            "properties": {
                "plan": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "properties": {
                            "step": { "type": "string" },
                            "status": { "type": "string", "enum": ["todo", "in_progress", "done"] }
                        },
                        "required": ["step", "status"]
                    }
                },
                "explanation": { "type": "string" }
            },
            "required": ["plan"]
        }),
        requires_approval: Some(false),
        sandbox_policy: None,
        idempotency: Some(relay_domain::tool::Idempotency::Safe),
    }
}

pub struct UpdatePlanTool;

#[async_trait]
impl ToolHandler for UpdatePlanTool {
    async fn call(&self, call: &ToolCall, ctx: &ToolExecutionContext) -> ToolResult {
        let args: UpdatePlanArgs = match serde_json::from_value(call.args.clone()) {
            Ok(a) => a,
            Err(e) => {
                return ToolResult::error_payload(
                    ToolErrorKind::Validation,
                    format!("invalid update_plan arguments: {e}"),
                )
            }
        };
        if args.plan.is_empty() {
            return ToolResult::error_payload(ToolErrorKind::Validation, "plan must be non-empty");
        }
        for (i, step) in args.plan.iter().enumerate() {
            if step.step.trim().is_empty() {
                return ToolResult::error_payload(
                    ToolErrorKind::Validation,
                    format!("plan step {i} has an empty description"),
                );
            }
            if !VALID_STATUSES.contains(&step.status.as_str()) {
                return ToolResult::error_payload(
                    ToolErrorKind::Validation,
                    format!(
                        "plan step {i} has invalid status '{}' (expected todo|in_progress|done)",
                        step.status
                    ),
                );
            }
        }

        let plan_json: Vec<serde_json::Value> = args
            .plan
            .iter()
            .map(|s| serde_json::json!({"step": s.step, "status": s.status}))
            .collect();

        let mut payload = serde_json::json!({
            "call_id": call.call_id,
            "plan": plan_json,
        });
        if let Some(explanation) = &args.explanation {
            payload["explanation"] = explanation.clone().into();
        }
        if let Err(e) = ctx.emit_event(AgentEvent::new("plan_updated", ctx.run_id.clone(), payload))
        {
            return ToolResult::error_payload(
                ToolErrorKind::Unknown,
                format!("failed to record plan update: {e}"),
            );
        }

        ToolResult::ok_payload(
            format!("plan updated ({} steps)", args.plan.len()),
            Some(serde_json::json!({"steps": args.plan.len()})),
            0,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn call(args: serde_json::Value) -> ToolCall {
        ToolCall {
            call_id: "c1".into(),
            name: "update_plan".into(),
            args,
            raw_arguments: None,
        }
    }

    #[tokio::test]
    async fn valid_plan_emits_side_event() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = ToolExecutionContext::new(dir.path(), "r1");
        let result = UpdatePlanTool
            .call(
                &call(serde_json::json!({
                    "plan": [
                        {"step": "read the file", "status": "done"},
                        {"step": "edit the file", "status": "in_progress"}
                    ],
                    "explanation": "making progress"
                })),
                &ctx,
            )
            .await;
        assert!(result.ok);
        let events = ctx.take_pending_events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, "plan_updated");
        assert_eq!(events[0].payload["plan"][1]["status"], "in_progress");
        assert_eq!(events[0].payload["explanation"], "making progress");
    }

    #[tokio::test]
    async fn invalid_status_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = ToolExecutionContext::new(dir.path(), "r1");
        let result = UpdatePlanTool
            .call(
                &call(serde_json::json!({"plan": [{"step": "x", "status": "later"}]})),
                &ctx,
            )
            .await;
        assert_eq!(result.error_kind, Some(ToolErrorKind::Validation));
        assert!(ctx.take_pending_events().is_empty());
    }
}
