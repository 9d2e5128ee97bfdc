//! Rebuild resume state from a WAL prefix.
//!
//! A `run_id` can be resumed multiple times, so the WAL may hold several
//! `run_started`/terminal segments. Replay walks only the most recent
//! segment: it best matches the history the previous run ended with and
//! avoids re-injecting stale fragments.

use std::collections::{HashMap, HashSet};

use relay_domain::event::AgentEvent;
use relay_domain::message::Message;

/// State reconstructed from a WAL for `resume_strategy = replay`.
#[derive(Debug, Clone, Default)]
pub struct ResumeReplayState {
    pub history: Vec<Message>,
    pub approved_for_session_keys: HashSet<String>,
    pub denied_approvals_by_key: HashMap<String, u32>,
}

/// Slice to the events after the most recent `run_started`.
pub fn events_after_last_run_started(events: &[AgentEvent]) -> &[AgentEvent] {
    let last = events
        .iter()
        .rposition(|ev| ev.kind == "run_started");
    match last {
        Some(idx) => &events[idx + 1..],
        None => events,
    }
}

/// Rebuild history and approval caches from WAL events.
///
/// History carries tool messages from `tool_call_finished` and assistant
/// messages from `run_completed.final_output`; the approvals cache comes
/// from `approval_decided` events.
pub fn rebuild_resume_replay_state(events: &[AgentEvent]) -> ResumeReplayState {
    let segment = events_after_last_run_started(events);

    let mut state = ResumeReplayState::default();
    for ev in segment {
        match ev.kind.as_str() {
            "tool_call_finished" => {
                let call_id = ev
                    .payload
                    .get("call_id")
                    .and_then(|v| v.as_str())
                    .unwrap_or("")
                    .trim();
                if call_id.is_empty() {
                    continue;
                }
                let Some(result) = ev.payload.get("result").filter(|v| v.is_object()) else {
                    continue;
                };
                state
                    .history
                    .push(Message::tool_result(call_id, result.to_string()));
            }
            "run_completed" => {
                if let Some(final_output) = ev
                    .payload
                    .get("final_output")
                    .and_then(|v| v.as_str())
                    .filter(|s| !s.is_empty())
                {
                    state.history.push(Message::assistant(final_output));
                }
            }
            "approval_decided" => {
                let key = ev
                    .payload
                    .get("approval_key")
                    .and_then(|v| v.as_str())
                    .unwrap_or("")
                    .trim()
                    .to_owned();
                if key.is_empty() {
                    continue;
                }
                match ev.payload.get("decision").and_then(|v| v.as_str()) {
                    Some("approved_for_session") => {
                        state.approved_for_session_keys.insert(key);
                    }
                    Some("denied") => {
                        *state.denied_approvals_by_key.entry(key).or_insert(0) += 1;
                    }
                    _ => {}
                }
            }
            _ => {}
        }
    }
    state
}
