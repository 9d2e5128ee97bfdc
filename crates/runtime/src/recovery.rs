//! Context-length recovery: fail fast, compact, or ask the human.
//!
//! The compaction turn runs with tools disabled against the same
//! backend, produces a handoff summary, and replaces the whole history
//! with one prefixed assistant message.

use std::sync::Arc;

use futures_util::StreamExt;

use relay_domain::config::{ContextRecoveryMode, RecoveryConfig};
use relay_domain::error::{Error, Result};
use relay_domain::message::Message;
use relay_domain::run::{RunError, RunErrorKind, RunResult};
use relay_domain::stream::ChatStreamEvent;
use relay_llm::{ChatBackend, ChatRequest};
use relay_tools::HumanIoProvider;

use crate::prompts;
use crate::run_context::RunContext;

/// What the loop should do after a context-length signal.
pub enum RecoveryOutcome {
    /// History was compacted; run another turn.
    Continue,
    /// The run ended (handoff path).
    Completed(Box<RunResult>),
    /// Terminal failure.
    Failed(RunError),
}

/// Entry point: emits `context_length_exceeded`, then applies the
/// configured mode.
#[allow(clippy::too_many_arguments)]
pub async fn handle_context_length(
    ctx: &mut RunContext,
    backend: &Arc<dyn ChatBackend>,
    model: &str,
    task: &str,
    turn_id: &str,
    cfg: &RecoveryConfig,
    human_io: Option<&Arc<dyn HumanIoProvider>>,
    human_timeout_ms: Option<u64>,
    detail: &str,
) -> Result<RecoveryOutcome> {
    ctx.emit(
        ctx.event(
            "context_length_exceeded",
            serde_json::json!({"message": detail}),
        )
        .with_turn(turn_id.to_owned()),
    )?;

    apply_mode(
        ctx,
        backend,
        model,
        task,
        turn_id,
        cfg,
        cfg.context_recovery_mode,
        human_io,
        human_timeout_ms,
        detail,
    )
    .await
}

#[allow(clippy::too_many_arguments)]
async fn apply_mode(
    ctx: &mut RunContext,
    backend: &Arc<dyn ChatBackend>,
    model: &str,
    task: &str,
    turn_id: &str,
    cfg: &RecoveryConfig,
    mode: ContextRecoveryMode,
    human_io: Option<&Arc<dyn HumanIoProvider>>,
    human_timeout_ms: Option<u64>,
    detail: &str,
) -> Result<RecoveryOutcome> {
    match mode {
        ContextRecoveryMode::FailFast => Ok(RecoveryOutcome::Failed(RunError::new(
            RunErrorKind::ContextLengthExceeded,
            detail.to_owned(),
        ))),
        ContextRecoveryMode::CompactFirst => {
            if ctx.compactions_performed >= cfg.max_compactions_per_run {
                // Compaction budget spent: equivalent to fail_fast.
                return Ok(RecoveryOutcome::Failed(RunError::new(
                    RunErrorKind::ContextLengthExceeded,
                    format!(
                        "{detail} (after {} compactions)",
                        ctx.compactions_performed
                    ),
                )));
            }
            let summary = match generate_summary(ctx, backend, model, task, cfg).await {
                Ok(summary) => summary,
                Err(e) => return Ok(RecoveryOutcome::Failed(RunError::classify(&e))),
            };
            let artifact_path = ctx.write_text_artifact("context_compaction", &summary)?;
            ctx.history = vec![Message::assistant(summary)];
            ctx.compactions_performed += 1;
            ctx.emit(
                ctx.event(
                    "context_compacted",
                    serde_json::json!({
                        "count": ctx.compactions_performed,
                        "artifact_path": artifact_path,
                    }),
                )
                .with_turn(turn_id.to_owned()),
            )?;
            Ok(RecoveryOutcome::Continue)
        }
        ContextRecoveryMode::AskFirst => {
            let Some(human_io) = human_io else {
                // No one to ask: degrade to the configured fallback.
                let fallback = if cfg.ask_first_fallback_mode == ContextRecoveryMode::AskFirst {
                    ContextRecoveryMode::CompactFirst
                } else {
                    cfg.ask_first_fallback_mode
                };
                return Box::pin(apply_mode(
                    ctx,
                    backend,
                    model,
                    task,
                    turn_id,
                    cfg,
                    fallback,
                    None,
                    human_timeout_ms,
                    detail,
                ))
                .await;
            };

            let call_id = format!("ctx_{}", uuid::Uuid::new_v4().simple());
            let question =
                "The conversation exceeded the model's context window. Compact the history \
                 and continue, or stop here with a handoff summary for a new run?";
            let choices = vec!["compact".to_owned(), "handoff_new_run".to_owned()];
            ctx.emit(
                ctx.event(
                    "human_request",
                    serde_json::json!({
                        "call_id": call_id,
                        "question": question,
                        "choices": choices,
                        "context": {"kind": "context_recovery"},
                    }),
                )
                .with_turn(turn_id.to_owned()),
            )?;

            let answer = human_io
                .request_human_input(
                    &call_id,
                    question,
                    Some(choices.as_slice()),
                    None,
                    human_timeout_ms,
                )
                .await
                .unwrap_or_else(|e| {
                    tracing::warn!(error = %e, "context recovery prompt failed; compacting");
                    "compact".to_owned()
                });
            ctx.emit(
                ctx.event(
                    "human_response",
                    serde_json::json!({"call_id": call_id, "answer": answer}),
                )
                .with_turn(turn_id.to_owned()),
            )?;

            if answer == "handoff_new_run" {
                let summary = match generate_summary(ctx, backend, model, task, cfg).await {
                    Ok(summary) => summary,
                    Err(e) => return Ok(RecoveryOutcome::Failed(RunError::classify(&e))),
                };
                let artifact_path = ctx.write_text_artifact("handoff", &summary)?;
                let result = ctx.finish_completed(
                    summary,
                    Some(serde_json::json!({"handoff": {"artifact_path": artifact_path}})),
                )?;
                return Ok(RecoveryOutcome::Completed(Box::new(result)));
            }

            Box::pin(apply_mode(
                ctx,
                backend,
                model,
                task,
                turn_id,
                cfg,
                ContextRecoveryMode::CompactFirst,
                Some(human_io),
                human_timeout_ms,
                detail,
            ))
            .await
        }
    }
}

/// Run the tools-disabled compaction turn and return the prefixed
/// handoff summary.
async fn generate_summary(
    ctx: &RunContext,
    backend: &Arc<dyn ChatBackend>,
    model: &str,
    task: &str,
    cfg: &RecoveryConfig,
) -> Result<String> {
    let transcript = prompts::format_history_for_compaction(
        &ctx.history,
        cfg.compaction_history_max_chars,
        cfg.compaction_keep_last_messages,
    );
    let request = ChatRequest {
        model: model.to_owned(),
        messages: prompts::build_compaction_messages(task, &transcript),
        tools: Vec::new(),
        run_id: Some(ctx.run_id.clone()),
        ..ChatRequest::default()
    };

    let mut stream = backend.stream_chat(&request).await?;
    let mut text = String::new();
    while let Some(item) = stream.next().await {
        match item? {
            ChatStreamEvent::TextDelta { text: delta } => text.push_str(&delta),
            ChatStreamEvent::ToolCalls { .. } => {
                // Tools are disabled for compaction; ignore stray calls.
            }
            ChatStreamEvent::Completed { .. } => break,
        }
    }
    if text.trim().is_empty() {
        return Err(Error::Llm("compaction turn produced no summary".into()));
    }
    Ok(format!("{}{}", prompts::SUMMARY_PREFIX, text.trim()))
}
