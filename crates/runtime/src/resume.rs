//! Resume preparation: summary and replay strategies.
//!
//! Caller-provided history always wins. Replay rebuilds the previous
//! segment's history and approval caches from the WAL; the summary
//! strategy condenses the tail window into one synthetic assistant
//! message.

use relay_domain::config::ResumeStrategy;
use relay_domain::event::AgentEvent;
use relay_domain::message::Message;
use relay_wal::{rebuild_resume_replay_state, ResumeReplayState, WalBackend};

const TAIL_WINDOW: usize = 200;
const MAX_RECENT_TOOLS: usize = 5;
const MAX_SUMMARY_CHARS: usize = 4096;

/// Everything the loop needs to continue an existing `run_id`.
#[derive(Default)]
pub struct ResumeInfo {
    pub existing_events_count: usize,
    pub replay: Option<ResumeReplayState>,
    pub summary: Option<String>,
}

/// Inspect the WAL for `run_id` and compute resume state.
pub fn prepare_resume(
    wal: &dyn WalBackend,
    run_id: &str,
    have_initial_history: bool,
    strategy: ResumeStrategy,
) -> ResumeInfo {
    let events = match wal.iter_events(Some(run_id)) {
        Ok(events) => events,
        Err(e) => {
            tracing::warn!(error = %e, run_id, "failed to read WAL for resume; starting fresh");
            return ResumeInfo::default();
        }
    };
    let existing_events_count = events.len();
    if existing_events_count == 0 || have_initial_history {
        return ResumeInfo {
            existing_events_count,
            replay: None,
            summary: None,
        };
    }

    let replay = if strategy == ResumeStrategy::Replay {
        // Replay asks more of the WAL structure; fall back silently to
        // the summary strategy when it yields nothing usable.
        let state = rebuild_resume_replay_state(&events);
        if state.history.is_empty()
            && state.approved_for_session_keys.is_empty()
            && state.denied_approvals_by_key.is_empty()
        {
            tracing::warn!(run_id, "resume replay produced no state; falling back to summary");
            None
        } else {
            Some(state)
        }
    } else {
        None
    };

    let summary = if replay.is_some() {
        None
    } else {
        let tail_start = events.len().saturating_sub(TAIL_WINDOW);
        build_resume_summary(existing_events_count, &events[tail_start..])
    };

    ResumeInfo {
        existing_events_count,
        replay,
        summary,
    }
}

/// One `[Resume Summary]` assistant message derived from the tail window.
pub fn build_resume_summary(
    existing_events_count: usize,
    tail: &[AgentEvent],
) -> Option<String> {
    if existing_events_count == 0 {
        return None;
    }

    let mut last_run_started: Option<&AgentEvent> = None;
    let mut last_terminal: Option<&AgentEvent> = None;
    let mut recent_tools: Vec<&AgentEvent> = Vec::new();

    for ev in tail.iter().rev() {
        if last_terminal.is_none()
            && matches!(ev.kind.as_str(), "run_completed" | "run_failed" | "run_cancelled")
        {
            last_terminal = Some(ev);
        }
        if last_run_started.is_none() && ev.kind == "run_started" {
            last_run_started = Some(ev);
        }
        if ev.kind == "tool_call_finished" && recent_tools.len() < MAX_RECENT_TOOLS {
            recent_tools.push(ev);
        }
        if last_terminal.is_some()
            && last_run_started.is_some()
            && recent_tools.len() >= MAX_RECENT_TOOLS
        {
            break;
        }
    }

    let prev_task = last_run_started
        .and_then(|ev| ev.payload.get("task"))
        .and_then(|v| v.as_str())
        .unwrap_or_default();
    let terminal_kind = last_terminal.map(|ev| ev.kind.as_str()).unwrap_or("unknown");
    let terminal_text = last_terminal
        .map(|ev| {
            if ev.kind == "run_completed" {
                ev.payload
                    .get("final_output")
                    .and_then(|v| v.as_str())
                    .unwrap_or_default()
            } else {
                ev.payload
                    .get("message")
                    .and_then(|v| v.as_str())
                    .unwrap_or_default()
            }
        })
        .unwrap_or_default();

    let mut lines = vec!["[Resume Summary]".to_owned()];
    if !prev_task.is_empty() {
        lines.push(format!("previous_task: {prev_task}"));
    }
    lines.push(format!("previous_events: {existing_events_count}"));
    lines.push(format!("previous_terminal: {terminal_kind}"));
    if !terminal_text.is_empty() {
        lines.push(format!("previous_terminal_text: {terminal_text}"));
        if !recent_tools.is_empty() {
            lines.push("recent_tools:".to_owned());
            for ev in recent_tools.iter().rev() {
                // Prefer payload.tool; older WAL writers used payload.name.
                let tool = ev
                    .payload
                    .get("tool")
                    .or_else(|| ev.payload.get("name"))
                    .and_then(|v| v.as_str())
                    .filter(|s| !s.is_empty())
                    .unwrap_or("unknown_tool");
                let result = ev.payload.get("result");
                let ok = result.and_then(|r| r.get("ok")).cloned();
                let error_kind = result.and_then(|r| r.get("error_kind")).cloned();
                lines.push(format!(
                    "- {tool} ok={} error_kind={}",
                    ok.map(|v| v.to_string()).unwrap_or_else(|| "null".into()),
                    error_kind
                        .map(|v| v.to_string())
                        .unwrap_or_else(|| "null".into()),
                ));
            }
        }
    }

    let mut out = lines.join("\n").trim().to_owned();
    if out.len() > MAX_SUMMARY_CHARS {
        out.truncate(MAX_SUMMARY_CHARS);
        out.push_str("\n...<truncated>");
    }
    Some(out)
}

/// The summary becomes one assistant message in the fresh history.
pub fn resume_summary_message(summary: &str) -> Message {
    Message::assistant(summary)
}
