//! Shared fixtures for the runtime integration suites.
#![allow(dead_code)]

use std::collections::VecDeque;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use relay_domain::error::{Error, Result};
use relay_domain::event::AgentEvent;
use relay_domain::stream::{BoxStream, ChatStreamEvent, ToolCallDelta};
use relay_llm::{ChatBackend, ChatRequest};
use relay_safety::{ApprovalDecision, ApprovalProvider, ApprovalRequest};
use relay_wal::{JsonlWal, WalBackend};

/// One scripted LLM interaction: a successful event stream or a
/// transport failure.
pub enum ScriptStep {
    Events(Vec<ChatStreamEvent>),
    Fail(Error),
}

/// Backend driven by a fixed script; records every request it sees.
pub struct ScriptBackend {
    steps: Mutex<VecDeque<ScriptStep>>,
    requests: Mutex<Vec<ChatRequest>>,
}

impl ScriptBackend {
    pub fn new(steps: Vec<ScriptStep>) -> Self {
        Self {
            steps: Mutex::new(steps.into()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<ChatRequest> {
        self.requests.lock().clone()
    }
}

#[async_trait]
impl ChatBackend for ScriptBackend {
    async fn stream_chat(
        &self,
        request: &ChatRequest,
    ) -> Result<BoxStream<'static, Result<ChatStreamEvent>>> {
        self.requests.lock().push(request.clone());
        let step = self
            .steps
            .lock()
            .pop_front()
            .ok_or_else(|| Error::Llm("script exhausted".into()))?;
        match step {
            ScriptStep::Fail(e) => Err(e),
            ScriptStep::Events(mut events) => {
                let has_completed = events
                    .iter()
                    .any(|e| matches!(e, ChatStreamEvent::Completed { .. }));
                if !has_completed {
                    events.push(ChatStreamEvent::Completed {
                        finish_reason: Some("stop".into()),
                        usage: None,
                    });
                }
                let stream = async_stream::stream! {
                    for ev in events {
                        yield Ok(ev);
                    }
                };
                Ok(Box::pin(stream))
            }
        }
    }
}

/// Stream events for one text turn.
pub fn text_turn(text: &str) -> ScriptStep {
    ScriptStep::Events(vec![
        ChatStreamEvent::TextDelta { text: text.into() },
        ChatStreamEvent::Completed {
            finish_reason: Some("stop".into()),
            usage: None,
        },
    ])
}

/// Stream events for one tool-call turn (fully-assembled arguments).
pub fn tool_call_turn(call_id: &str, tool: &str, args: serde_json::Value) -> ScriptStep {
    ScriptStep::Events(vec![
        ChatStreamEvent::ToolCalls {
            tool_calls: vec![ToolCallDelta::complete(call_id, tool, args.to_string())],
        },
        ChatStreamEvent::Completed {
            finish_reason: Some("tool_calls".into()),
            usage: None,
        },
    ])
}

/// Approval provider with a fixed verdict.
pub struct FixedApprover(pub ApprovalDecision);

#[async_trait]
impl ApprovalProvider for FixedApprover {
    async fn request_approval(
        &self,
        _request: &ApprovalRequest,
        _timeout_ms: Option<u64>,
    ) -> Result<ApprovalDecision> {
        Ok(self.0)
    }
}

/// Approval provider that records the requests it was shown.
pub struct RecordingApprover {
    pub verdict: ApprovalDecision,
    pub seen: Mutex<Vec<ApprovalRequest>>,
}

impl RecordingApprover {
    pub fn new(verdict: ApprovalDecision) -> Self {
        Self {
            verdict,
            seen: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl ApprovalProvider for RecordingApprover {
    async fn request_approval(
        &self,
        request: &ApprovalRequest,
        _timeout_ms: Option<u64>,
    ) -> Result<ApprovalDecision> {
        self.seen.lock().push(request.clone());
        Ok(self.verdict)
    }
}

/// All WAL events for a run under the standard path convention.
pub fn wal_events(workspace: &Path, run_id: &str) -> Vec<AgentEvent> {
    let path = workspace
        .join(".skills_runtime_sdk")
        .join("runs")
        .join(run_id)
        .join("events.jsonl");
    JsonlWal::open(path).unwrap().iter_events(None).unwrap()
}

pub fn kinds(events: &[AgentEvent]) -> Vec<String> {
    events.iter().map(|e| e.kind.clone()).collect()
}

/// Assert `needles` appear in order (not necessarily adjacent) in
/// `haystack`.
pub fn assert_subsequence(haystack: &[String], needles: &[&str]) {
    let mut it = haystack.iter();
    for needle in needles {
        assert!(
            it.any(|k| k == needle),
            "event '{needle}' missing or out of order in {haystack:?}"
        );
    }
}

pub fn arc_backend(steps: Vec<ScriptStep>) -> Arc<ScriptBackend> {
    Arc::new(ScriptBackend::new(steps))
}

/// Library-provided scripted backend (no failure injection).
pub fn fake_backend(calls: Vec<relay_llm::FakeChatCall>) -> Arc<relay_llm::FakeChatBackend> {
    Arc::new(relay_llm::FakeChatBackend::new(calls))
}

/// One tool-call turn as a [`relay_llm::FakeChatCall`].
pub fn fake_tool_call(call_id: &str, tool: &str, args: serde_json::Value) -> relay_llm::FakeChatCall {
    relay_llm::FakeChatCall::new(vec![
        ChatStreamEvent::ToolCalls {
            tool_calls: vec![ToolCallDelta::complete(call_id, tool, args.to_string())],
        },
        ChatStreamEvent::Completed {
            finish_reason: Some("tool_calls".into()),
            usage: None,
        },
    ])
}
