//! The turn/step state machine driving LLM calls and tool dispatch.
//!
//! A run proceeds through repeating turns until terminal:
//! stream the model's response; text-only output completes the run;
//! tool calls pass through the safety gate (allow / ask / deny), the
//! approval flow, and the budget checks before dispatch appends their
//! results to history for the next turn.

use std::collections::HashSet;
use std::sync::Arc;

use futures_util::StreamExt;
use tokio::sync::mpsc;

use relay_domain::error::{Error, Result};
use relay_domain::event::AgentEvent;
use relay_domain::message::Message;
use relay_domain::run::{RunError, RunErrorKind, RunResult, RunStatus};
use relay_domain::skill::SkillResolver;
use relay_domain::stream::ChatStreamEvent;
use relay_domain::tool::{ToolCall, ToolResult};
use relay_llm::ChatRequest;
use relay_safety::sanitize::{redact_text, sanitize_tool_call_arguments};
use relay_safety::{
    compute_approval_key, ApprovalDecision, ApprovalRequest, GateAction, GateDecision, SafetyGate,
};
use relay_tools::{ToolDispatcher, ToolExecutionContext};
use relay_wal::{JsonlWal, WalBackend, WalEmitter};

use crate::agent::AgentInner;
use crate::controller::LoopController;
use crate::paths;
use crate::prompts;
use crate::recovery::{self, RecoveryOutcome};
use crate::resume;
use crate::run_context::RunContext;
use crate::skills::{ensure_skill_env_vars, SkillEnvOutcome};

/// Result for failures so early (or so late) that no WAL exists to
/// carry a terminal event.
pub(crate) fn degenerate_failure(run_id: &str, message: String) -> RunResult {
    RunResult {
        status: RunStatus::Failed,
        run_id: run_id.to_owned(),
        final_output: message.clone(),
        wal_locator: String::new(),
        events_path: None,
        artifacts: Vec::new(),
        metadata: serde_json::json!({}),
        error: Some(RunError::new(RunErrorKind::Unknown, message)),
    }
}

pub(crate) async fn run_loop(
    inner: Arc<AgentInner>,
    task: String,
    run_id: String,
    initial_history: Option<Vec<Message>>,
    tx: mpsc::UnboundedSender<AgentEvent>,
) -> RunResult {
    let mut state = match LoopState::prepare(inner, task, run_id.clone(), initial_history, tx) {
        Ok(state) => state,
        Err(e) => return degenerate_failure(&run_id, format!("failed to start run: {e}")),
    };
    match state.run().await {
        Ok(result) => result,
        Err(e) => {
            // Emit/IO failure inside the loop; try once to close the run
            // with a classified terminal event.
            let error = RunError::classify(&e);
            state
                .ctx
                .finish_failed(error)
                .unwrap_or_else(|_| degenerate_failure(&run_id, e.to_string()))
        }
    }
}

enum StepOutcome {
    Continue,
    Terminal(RunResult),
}

enum ApprovalOutcome {
    Execute,
    Denied(ToolResult),
    Terminal(RunResult),
}

#[derive(Default)]
struct PendingToolCall {
    call_id: String,
    name: String,
    arguments: String,
}

struct LoopState {
    inner: Arc<AgentInner>,
    ctx: RunContext,
    controller: LoopController,
    gate: SafetyGate,
    approved_for_session: HashSet<String>,
    skill_bodies: Vec<String>,
    task: String,
}

impl LoopState {
    fn prepare(
        inner: Arc<AgentInner>,
        task: String,
        run_id: String,
        initial_history: Option<Vec<Message>>,
        tx: mpsc::UnboundedSender<AgentEvent>,
    ) -> Result<Self> {
        let run_dir = paths::run_dir(&inner.workspace_root, &run_id);
        let artifacts_dir = paths::artifacts_dir(&inner.workspace_root, &run_id);
        let wal: Arc<dyn WalBackend> = match &inner.wal_override {
            Some(wal) => Arc::clone(wal),
            None => Arc::new(JsonlWal::open(paths::wal_path(
                &inner.workspace_root,
                &run_id,
            ))?),
        };
        let emitter = WalEmitter::new(Arc::clone(&wal), inner.hooks.clone(), tx);

        let resume_info = resume::prepare_resume(
            wal.as_ref(),
            &run_id,
            initial_history.is_some(),
            inner.config.run.resume_strategy,
        );

        let mut ctx = RunContext::new(run_id, run_dir, wal, emitter, artifacts_dir);
        let mut controller = LoopController::new(
            inner.config.run.max_steps,
            inner.config.run.max_wall_time_sec,
            inner.cancel.clone(),
        );
        let gate = SafetyGate::new(inner.config.safety.clone(), inner.redaction_values.clone());

        let mut approved_for_session = HashSet::new();
        if let Some(history) = initial_history {
            ctx.history = history;
        } else if let Some(replay) = resume_info.replay {
            ctx.history = replay.history;
            approved_for_session = replay.approved_for_session_keys;
            controller.denied_approvals_by_key = replay.denied_approvals_by_key;
        } else if let Some(summary) = &resume_info.summary {
            ctx.history.push(resume::resume_summary_message(summary));
        }

        Ok(Self {
            inner,
            ctx,
            controller,
            gate,
            approved_for_session,
            skill_bodies: Vec::new(),
            task,
        })
    }

    fn skills_ref(&self) -> Option<&dyn SkillResolver> {
        self.inner.skills.as_deref()
    }

    fn redact(&self, text: &str) -> String {
        redact_text(text, &self.inner.redaction_values)
    }

    async fn run(&mut self) -> Result<RunResult> {
        self.ctx.emit(self.ctx.event(
            "run_started",
            serde_json::json!({
                "task": self.redact(&self.task),
                "config_summary": {
                    "model": self.inner.model,
                    "max_steps": self.inner.config.run.max_steps,
                    "safety_mode": self.inner.config.safety.mode,
                    "context_recovery_mode": self.inner.config.recovery.context_recovery_mode,
                    "resume_strategy": self.inner.config.run.resume_strategy,
                },
                "wal_locator": self.ctx.wal_locator,
            }),
        ))?;

        if let Err(e) = self.inject_skills().await {
            let error = RunError::classify(&e);
            return self.ctx.finish_failed(error);
        }

        self.ctx.history.push(Message::user(self.task.clone()));

        loop {
            if self.controller.is_cancelled() {
                return self.ctx.finish_cancelled("cancelled by user");
            }
            if self.controller.wall_time_exceeded() {
                if let Some(result) = self
                    .handle_budget_exhaustion("wall_time", "wall time budget exceeded")
                    .await?
                {
                    return Ok(result);
                }
            }

            let turn_id = self.controller.next_turn_id();
            match self.turn(&turn_id).await? {
                StepOutcome::Continue => continue,
                StepOutcome::Terminal(result) => return Ok(result),
            }
        }
    }

    /// Resolve skill mentions in the task, run the env gate, and collect
    /// bodies for the system context.
    async fn inject_skills(&mut self) -> Result<()> {
        let Some(resolver) = self.inner.skills.clone() else {
            return Ok(());
        };
        let resolved = resolver.resolve_mentions(&self.task);
        for skill in resolved {
            let emitter = self.ctx.emitter.clone();
            let mut emit = |ev: AgentEvent| emitter.emit(ev);
            let outcome = ensure_skill_env_vars(
                &skill,
                self.inner.config.skills.env_var_missing_policy,
                &self.inner.env_store,
                self.inner.human_io.as_ref(),
                self.inner.config.run.human_timeout_ms,
                &self.ctx.run_id,
                "turn_0",
                &mut emit,
            )
            .await?;
            if outcome == SkillEnvOutcome::Skipped {
                continue;
            }
            self.ctx.emit(
                self.ctx
                    .event(
                        "skill_injected",
                        serde_json::json!({
                            "mention_text": skill.mention_text,
                            "skill_name": skill.name,
                            "namespace": skill.namespace,
                            "skill_locator": skill.locator,
                        }),
                    )
                    .with_turn("turn_0"),
            )?;
            self.skill_bodies.push(skill.body);
        }
        Ok(())
    }

    /// One LLM request/response cycle.
    async fn turn(&mut self, turn_id: &str) -> Result<StepOutcome> {
        let (messages, _dropped) = prompts::build_messages(
            &self.inner.system_prompt,
            &self.skill_bodies,
            &self.ctx.history,
            &self.inner.config.run,
        );
        let specs = self.inner.registry.list_specs();

        self.ctx.emit(
            self.ctx
                .event(
                    "llm_request_started",
                    serde_json::json!({
                        "messages_count": messages.len(),
                        "tools_count": specs.len(),
                        "model": self.inner.model,
                    }),
                )
                .with_turn(turn_id.to_owned()),
        )?;

        let request = ChatRequest {
            model: self.inner.model.clone(),
            messages,
            tools: specs,
            run_id: Some(self.ctx.run_id.clone()),
            turn_id: Some(turn_id.to_owned()),
            ..ChatRequest::default()
        };

        let mut stream = match self.inner.backend.stream_chat(&request).await {
            Ok(stream) => stream,
            Err(Error::ContextLengthExceeded(detail)) => {
                return self.recover_context(turn_id, &detail).await;
            }
            Err(e) => {
                let error = RunError::classify(&e);
                return Ok(StepOutcome::Terminal(self.ctx.finish_failed(error)?));
            }
        };

        let mut text_buf = String::new();
        let mut pending: Vec<PendingToolCall> = Vec::new();
        let mut finish_reason: Option<String> = None;
        let mut context_blown: Option<String> = None;

        while let Some(item) = stream.next().await {
            // Poll cancellation at each chunk boundary.
            if self.controller.is_cancelled() {
                return Ok(StepOutcome::Terminal(
                    self.ctx.finish_cancelled("cancelled by user")?,
                ));
            }
            match item {
                Ok(ChatStreamEvent::TextDelta { text }) => {
                    let text = self.redact(&text);
                    self.ctx.emit(
                        self.ctx
                            .event(
                                "llm_response_delta",
                                serde_json::json!({"delta_type": "text", "text": text}),
                            )
                            .with_turn(turn_id.to_owned()),
                    )?;
                    text_buf.push_str(&text);
                }
                Ok(ChatStreamEvent::ToolCalls { tool_calls }) => {
                    for delta in tool_calls {
                        let idx = match pending.iter().position(|p| p.call_id == delta.call_id) {
                            Some(idx) => idx,
                            None => {
                                pending.push(PendingToolCall {
                                    call_id: delta.call_id.clone(),
                                    ..Default::default()
                                });
                                pending.len() - 1
                            }
                        };
                        if let Some(name) = delta.name {
                            pending[idx].name.push_str(&name);
                        }
                        pending[idx].arguments.push_str(&delta.arguments);
                    }
                }
                Ok(ChatStreamEvent::Completed {
                    finish_reason: reason,
                    ..
                }) => {
                    finish_reason = reason;
                }
                Err(Error::ContextLengthExceeded(detail)) => {
                    context_blown = Some(detail);
                    break;
                }
                Err(e) => {
                    let error = RunError::classify(&e);
                    return Ok(StepOutcome::Terminal(self.ctx.finish_failed(error)?));
                }
            }
        }

        if finish_reason.as_deref() == Some("length") && context_blown.is_none() {
            context_blown = Some("finish_reason=length".to_owned());
        }
        if let Some(detail) = context_blown {
            return self.recover_context(turn_id, &detail).await;
        }

        // Arguments were accumulated per call_id; parse only now.
        let calls = assemble_tool_calls(pending);

        if calls.is_empty() {
            self.ctx.history.push(Message::assistant(text_buf.clone()));
            let result = self.ctx.finish_completed(text_buf, None)?;
            return Ok(StepOutcome::Terminal(result));
        }

        // Sanitized tool-call arguments, identical to tool_call_requested.
        let sanitized_calls: Vec<serde_json::Value> = calls
            .iter()
            .map(|c| {
                serde_json::json!({
                    "call_id": c.call_id,
                    "name": c.name,
                    "arguments": sanitize_tool_call_arguments(
                        &c.name,
                        &c.args,
                        &self.inner.redaction_values,
                        self.skills_ref(),
                    ),
                })
            })
            .collect();
        self.ctx.emit(
            self.ctx
                .event(
                    "llm_response_delta",
                    serde_json::json!({"delta_type": "tool_calls", "tool_calls": sanitized_calls}),
                )
                .with_turn(turn_id.to_owned()),
        )?;

        self.ctx
            .history
            .push(Message::assistant_with_tool_calls(&text_buf, &calls));

        for call in &calls {
            match self.process_tool_call(call, turn_id).await? {
                StepOutcome::Continue => {}
                terminal @ StepOutcome::Terminal(_) => return Ok(terminal),
            }
        }

        Ok(StepOutcome::Continue)
    }

    /// Offer a human the chance to raise an exhausted budget.
    ///
    /// Returns `None` when the budget was raised; otherwise the terminal
    /// `budget_exceeded` result. Unattended runs (no human-I/O provider)
    /// fail fast unconditionally.
    async fn handle_budget_exhaustion(
        &mut self,
        budget: &str,
        message: &str,
    ) -> Result<Option<RunResult>> {
        if let Some(human_io) = self.inner.human_io.clone() {
            let call_id = format!("budget_{}", uuid::Uuid::new_v4().simple());
            let question = format!(
                "The run hit its {budget} budget ({message}). Increase the budget and continue, \
                 or stop here?"
            );
            let choices = vec!["increase_budget".to_owned(), "stop".to_owned()];
            self.ctx.emit(self.ctx.event(
                "human_request",
                serde_json::json!({
                    "call_id": call_id,
                    "question": question,
                    "choices": choices,
                    "context": {"kind": "budget", "budget": budget},
                }),
            ))?;
            let answer = human_io
                .request_human_input(
                    &call_id,
                    &question,
                    Some(choices.as_slice()),
                    None,
                    self.inner.config.run.human_timeout_ms,
                )
                .await
                .unwrap_or_else(|e| {
                    tracing::warn!(error = %e, "budget prompt failed; stopping");
                    "stop".to_owned()
                });
            self.ctx.emit(self.ctx.event(
                "human_response",
                serde_json::json!({"call_id": call_id, "answer": answer}),
            ))?;
            if answer == "increase_budget" {
                self.controller.increase_budget(
                    self.inner.config.run.increase_budget_extra_steps,
                    self.inner.config.run.increase_budget_extra_wall_time_sec,
                );
                return Ok(None);
            }
        }
        Ok(Some(self.ctx.finish_failed(RunError::new(
            RunErrorKind::BudgetExceeded,
            message.to_owned(),
        ))?))
    }

    async fn recover_context(&mut self, turn_id: &str, detail: &str) -> Result<StepOutcome> {
        let outcome = recovery::handle_context_length(
            &mut self.ctx,
            &self.inner.backend,
            &self.inner.model,
            &self.task,
            turn_id,
            &self.inner.config.recovery,
            self.inner.human_io.as_ref(),
            self.inner.config.run.human_timeout_ms,
            detail,
        )
        .await?;
        Ok(match outcome {
            RecoveryOutcome::Continue => StepOutcome::Continue,
            RecoveryOutcome::Completed(result) => StepOutcome::Terminal(*result),
            RecoveryOutcome::Failed(error) => {
                StepOutcome::Terminal(self.ctx.finish_failed(error)?)
            }
        })
    }

    /// Gate → approvals → budget → dispatch for one call.
    async fn process_tool_call(&mut self, call: &ToolCall, turn_id: &str) -> Result<StepOutcome> {
        let step_id = self.controller.next_step_id();

        let event_args = sanitize_tool_call_arguments(
            &call.name,
            &call.args,
            &self.inner.redaction_values,
            self.skills_ref(),
        );
        self.ctx.emit(
            self.ctx
                .event(
                    "tool_call_requested",
                    serde_json::json!({
                        "call_id": call.call_id,
                        "tool": call.name,
                        "arguments": event_args,
                    }),
                )
                .with_turn(turn_id.to_owned())
                .with_step(step_id.clone()),
        )?;

        let decision = self.gate.evaluate(
            call,
            self.inner.registry.is_custom_tool(&call.name),
            self.skills_ref(),
        );

        match decision.action {
            GateAction::Deny => {
                let result = self.gate.build_denied_result(call, &decision);
                self.finish_without_execution(call, turn_id, &step_id, result)?;
                Ok(StepOutcome::Continue)
            }
            GateAction::Ask => {
                match self
                    .run_approval_flow(call, &decision, turn_id, &step_id)
                    .await?
                {
                    ApprovalOutcome::Execute => self.execute(call, turn_id, &step_id).await,
                    ApprovalOutcome::Denied(result) => {
                        self.finish_without_execution(call, turn_id, &step_id, result)?;
                        Ok(StepOutcome::Continue)
                    }
                    ApprovalOutcome::Terminal(result) => Ok(StepOutcome::Terminal(result)),
                }
            }
            GateAction::Allow => self.execute(call, turn_id, &step_id).await,
        }
    }

    /// Record a call that never started: `tool_call_finished` only, plus
    /// the tool message so the model sees the denial.
    fn finish_without_execution(
        &mut self,
        call: &ToolCall,
        turn_id: &str,
        step_id: &str,
        result: ToolResult,
    ) -> Result<()> {
        self.ctx.emit(
            self.ctx
                .event(
                    "tool_call_finished",
                    serde_json::json!({
                        "call_id": call.call_id,
                        "tool": call.name,
                        "result": result.details_object(),
                    }),
                )
                .with_turn(turn_id.to_owned())
                .with_step(step_id.to_owned()),
        )?;
        self.ctx
            .history
            .push(Message::tool_result(&call.call_id, &result.content));
        Ok(())
    }

    async fn run_approval_flow(
        &mut self,
        call: &ToolCall,
        decision: &GateDecision,
        turn_id: &str,
        _step_id: &str,
    ) -> Result<ApprovalOutcome> {
        let approval_key = compute_approval_key(&call.name, &decision.sanitized_request);

        self.ctx.emit(
            self.ctx
                .event(
                    "approval_requested",
                    serde_json::json!({
                        "approval_key": approval_key,
                        "tool": call.name,
                        "summary": decision.summary,
                        "request": decision.sanitized_request,
                    }),
                )
                .with_turn(turn_id.to_owned()),
        )?;

        if self.approved_for_session.contains(&approval_key) {
            self.ctx.emit(
                self.ctx
                    .event(
                        "approval_decided",
                        serde_json::json!({
                            "approval_key": approval_key,
                            "decision": "approved_for_session",
                            "reason": "cached",
                        }),
                    )
                    .with_turn(turn_id.to_owned()),
            )?;
            return Ok(ApprovalOutcome::Execute);
        }

        let Some(provider) = self.inner.approval_provider.clone() else {
            // An approval requirement without a provider would loop the
            // model through pointless retries; fail fast instead.
            let result = self.ctx.finish_failed(RunError::new(
                RunErrorKind::ConfigError,
                format!(
                    "tool '{}' requires approval but no approval provider is configured",
                    call.name
                ),
            ))?;
            return Ok(ApprovalOutcome::Terminal(result));
        };

        let request = ApprovalRequest {
            approval_key: approval_key.clone(),
            tool: call.name.clone(),
            summary: decision.summary.clone(),
            details: decision.sanitized_request.clone(),
        };
        let timeout_ms = self.inner.config.safety.approval_timeout_ms;
        let (verdict, reason): (ApprovalDecision, Option<&str>) = match timeout_ms {
            Some(ms) => {
                match tokio::time::timeout(
                    std::time::Duration::from_millis(ms),
                    provider.request_approval(&request, timeout_ms),
                )
                .await
                {
                    Ok(Ok(verdict)) => (verdict, None),
                    Ok(Err(e)) => {
                        tracing::warn!(error = %e, "approval provider failed; denying");
                        (ApprovalDecision::Denied, Some("provider_error"))
                    }
                    Err(_) => (ApprovalDecision::Denied, Some("timeout")),
                }
            }
            None => match provider.request_approval(&request, None).await {
                Ok(verdict) => (verdict, None),
                Err(e) => {
                    tracing::warn!(error = %e, "approval provider failed; denying");
                    (ApprovalDecision::Denied, Some("provider_error"))
                }
            },
        };

        let mut decided_payload = serde_json::json!({
            "approval_key": approval_key,
            "decision": verdict.as_str(),
        });
        if let Some(reason) = reason {
            decided_payload["reason"] = reason.into();
        }
        self.ctx.emit(
            self.ctx
                .event("approval_decided", decided_payload)
                .with_turn(turn_id.to_owned()),
        )?;

        match verdict {
            ApprovalDecision::Approved => Ok(ApprovalOutcome::Execute),
            ApprovalDecision::ApprovedForSession => {
                self.approved_for_session.insert(approval_key);
                Ok(ApprovalOutcome::Execute)
            }
            ApprovalDecision::Abort => {
                let result = self.ctx.finish_cancelled("aborted by approver")?;
                Ok(ApprovalOutcome::Terminal(result))
            }
            ApprovalDecision::Denied => {
                self.controller.record_denied_approval(&approval_key);
                if self
                    .controller
                    .should_abort_due_to_repeated_denial(&approval_key)
                {
                    let result = self.ctx.finish_failed(RunError::new(
                        RunErrorKind::ApprovalDenied,
                        format!(
                            "approval denied repeatedly for tool '{}'; aborting to avoid a retry loop",
                            call.name
                        ),
                    ))?;
                    return Ok(ApprovalOutcome::Terminal(result));
                }
                let mut denied = decision.clone();
                denied.reason = "approval denied".into();
                Ok(ApprovalOutcome::Denied(
                    self.gate.build_denied_result(call, &denied),
                ))
            }
        }
    }

    /// Budget checks, then the dispatcher.
    async fn execute(
        &mut self,
        call: &ToolCall,
        turn_id: &str,
        step_id: &str,
    ) -> Result<StepOutcome> {
        if self.controller.is_cancelled() {
            return Ok(StepOutcome::Terminal(
                self.ctx.finish_cancelled("cancelled by user")?,
            ));
        }
        if self.controller.wall_time_exceeded() {
            if let Some(result) = self
                .handle_budget_exhaustion("wall_time", "wall time budget exceeded")
                .await?
            {
                return Ok(StepOutcome::Terminal(result));
            }
        }
        if !self.controller.try_consume_tool_step() {
            let message = format!("max steps ({}) exceeded", self.inner.config.run.max_steps);
            match self.handle_budget_exhaustion("max_steps", &message).await? {
                Some(result) => return Ok(StepOutcome::Terminal(result)),
                // The budget was raised; the retry must succeed now.
                None => {
                    if !self.controller.try_consume_tool_step() {
                        return Ok(StepOutcome::Terminal(self.ctx.finish_failed(
                            RunError::new(RunErrorKind::BudgetExceeded, message),
                        )?));
                    }
                }
            }
        }

        let tool_ctx = self.build_tool_ctx();
        let dispatcher = ToolDispatcher::new(&self.inner.registry);
        let emitter = self.ctx.emitter.clone();
        let emitter_stream = emitter.clone();
        let result = dispatcher
            .dispatch_one(
                call,
                &tool_ctx,
                turn_id,
                step_id,
                move |ev| {
                    if let Err(e) = emitter.emit(ev) {
                        tracing::warn!(error = %e, "failed to emit tool event");
                    }
                },
                move |ev| emitter_stream.stream_only(ev),
            )
            .await;

        self.ctx
            .history
            .push(Message::tool_result(&call.call_id, &result.content));
        Ok(StepOutcome::Continue)
    }

    fn build_tool_ctx(&self) -> ToolExecutionContext {
        let mut tool_ctx =
            ToolExecutionContext::new(&self.inner.workspace_root, self.ctx.run_id.clone());
        tool_ctx.wal = Some(Arc::clone(&self.ctx.wal));
        tool_ctx.human_io = self.inner.human_io.clone();
        tool_ctx.env = self.inner.env_store.lock().clone();
        tool_ctx.cancel = self.inner.cancel.clone();
        tool_ctx.redaction_values = self.inner.redaction_values.clone();
        tool_ctx.default_timeout_ms = self.inner.config.tools.default_timeout_ms;
        tool_ctx.max_file_bytes = self.inner.config.tools.max_file_bytes;
        tool_ctx.sandbox_policy_default = self.inner.config.tools.sandbox_policy_default.clone();
        tool_ctx.sandbox_adapter = self.inner.sandbox_adapter.clone();
        tool_ctx.skills = self.inner.skills.clone();
        tool_ctx
    }
}

/// Parse assembled argument fragments into tool calls.
///
/// Unparseable arguments keep their raw string and an empty object so
/// the dispatcher can fail the call closed; empty arguments are the
/// empty object (some providers omit them entirely).
fn assemble_tool_calls(pending: Vec<PendingToolCall>) -> Vec<ToolCall> {
    pending
        .into_iter()
        .map(|p| {
            let trimmed = p.arguments.trim();
            let (args, raw_arguments) = if trimmed.is_empty() {
                (serde_json::json!({}), None)
            } else {
                match serde_json::from_str::<serde_json::Value>(trimmed) {
                    Ok(value) => (value, Some(p.arguments.clone())),
                    Err(_) => (serde_json::json!({}), Some(p.arguments.clone())),
                }
            };
            ToolCall {
                call_id: p.call_id,
                name: p.name,
                args,
                raw_arguments,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn assemble_parses_complete_arguments() {
        let calls = assemble_tool_calls(vec![PendingToolCall {
            call_id: "c1".into(),
            name: "file_read".into(),
            arguments: "{\"path\":\"a.txt\"}".into(),
        }]);
        assert_eq!(calls[0].args["path"], "a.txt");
        assert!(calls[0].raw_arguments.is_some());
    }

    #[test]
    fn assemble_keeps_raw_for_bad_json() {
        let calls = assemble_tool_calls(vec![PendingToolCall {
            call_id: "c1".into(),
            name: "file_read".into(),
            arguments: "{\"path\":".into(),
        }]);
        assert_eq!(calls[0].args, serde_json::json!({}));
        assert_eq!(calls[0].raw_arguments.as_deref(), Some("{\"path\":"));
    }

    #[test]
    fn assemble_treats_empty_as_empty_object() {
        let calls = assemble_tool_calls(vec![PendingToolCall {
            call_id: "c1".into(),
            name: "list_dir".into(),
            arguments: "  ".into(),
        }]);
        assert_eq!(calls[0].args, serde_json::json!({}));
        assert!(calls[0].raw_arguments.is_none());
    }
}
