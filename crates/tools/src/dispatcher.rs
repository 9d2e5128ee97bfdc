//! Tool dispatch with a stable event sequence.
//!
//! The registry routes a call to its handler; this wrapper controls when
//! the `tool_call_started`/`tool_call_finished` events fire and flushes
//! handler side events between them, so the audit sequence is never
//! interleaved with approval bookkeeping:
//! started → side events → finished.

use relay_domain::event::AgentEvent;
use relay_domain::tool::{ToolCall, ToolErrorKind, ToolResult};

use crate::context::ToolExecutionContext;
use crate::registry::ToolRegistry;

/// Emits `tool_call_started`/`finished` through the durable exit and
/// side events through the stream-only exit.
pub struct ToolDispatcher<'a> {
    registry: &'a ToolRegistry,
}

impl<'a> ToolDispatcher<'a> {
    pub fn new(registry: &'a ToolRegistry) -> Self {
        Self { registry }
    }

    /// Execute one tool call with the event-order contract.
    ///
    /// When `raw_arguments` is present but does not parse as JSON the
    /// call fails closed with `validation` and only `tool_call_finished`
    /// is emitted; the tool never started.
    pub async fn dispatch_one<E, S>(
        &self,
        call: &ToolCall,
        ctx: &ToolExecutionContext,
        turn_id: &str,
        step_id: &str,
        mut emit_event: E,
        mut emit_stream: S,
    ) -> ToolResult
    where
        E: FnMut(AgentEvent),
        S: FnMut(AgentEvent),
    {
        let mk_event = |kind: &str, payload: serde_json::Value| {
            AgentEvent::new(kind, ctx.run_id.clone(), payload)
                .with_turn(turn_id)
                .with_step(step_id)
        };

        if let Some(raw) = call.raw_arguments.as_deref() {
            if serde_json::from_str::<serde_json::Value>(raw).is_err() {
                let result = ToolResult::error_payload(
                    ToolErrorKind::Validation,
                    format!("tool call arguments are not valid JSON for '{}'", call.name),
                );
                emit_event(mk_event(
                    "tool_call_finished",
                    serde_json::json!({
                        "call_id": call.call_id,
                        "tool": call.name,
                        "result": result.details_object(),
                    }),
                ));
                return result;
            }
        }

        emit_event(mk_event(
            "tool_call_started",
            serde_json::json!({"call_id": call.call_id, "tool": call.name}),
        ));

        // Start each dispatch with a clean side-event buffer.
        ctx.take_pending_events();
        let result = self.registry.dispatch(call, ctx, turn_id, step_id).await;

        // Side events were already WAL-appended by ctx.emit_event; only
        // the stream leg is owed here.
        for side_event in ctx.take_pending_events() {
            emit_stream(side_event);
        }

        emit_event(mk_event(
            "tool_call_finished",
            serde_json::json!({
                "call_id": call.call_id,
                "tool": call.name,
                "result": result.details_object(),
            }),
        ));

        result
    }
}
