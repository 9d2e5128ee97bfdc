//! End-to-end loop behavior against scripted backends.

mod common;

use std::sync::Arc;

use common::*;
use relay_domain::config::{AgentConfig, SafetyMode};
use relay_domain::run::{RunErrorKind, RunStatus};
use relay_runtime::{Agent, RunOptions};
use relay_safety::ApprovalDecision;

fn ask_config() -> AgentConfig {
    let mut config = AgentConfig::default();
    config.safety.mode = SafetyMode::Ask;
    config
}

#[tokio::test]
async fn minimal_text_completion() {
    let dir = tempfile::tempdir().unwrap();
    let backend = arc_backend(vec![text_turn("hi")]);
    let agent = Agent::builder(backend)
        .model("fake-model")
        .workspace_root(dir.path())
        .build()
        .unwrap();

    let result = agent.run("say hi").await;
    assert_eq!(result.status, RunStatus::Completed);
    assert_eq!(result.final_output, "hi");
    assert!(!result.wal_locator.is_empty());
    assert_eq!(result.events_path.as_deref(), Some(result.wal_locator.as_str()));

    let events = wal_events(dir.path(), &result.run_id);
    assert_subsequence(
        &kinds(&events),
        &[
            "run_started",
            "llm_request_started",
            "llm_response_delta",
            "run_completed",
        ],
    );

    // Timestamps are monotonic non-decreasing in append order.
    let timestamps: Vec<&String> = events.iter().map(|e| &e.timestamp).collect();
    let mut sorted = timestamps.clone();
    sorted.sort();
    assert_eq!(timestamps, sorted);
}

#[tokio::test]
async fn approved_tool_then_complete() {
    let dir = tempfile::tempdir().unwrap();
    let backend = arc_backend(vec![
        tool_call_turn(
            "c1",
            "file_write",
            serde_json::json!({"path": "hello.txt", "content": "hi", "create_dirs": true}),
        ),
        text_turn("done"),
    ]);
    let agent = Agent::builder(backend)
        .model("fake-model")
        .workspace_root(dir.path())
        .config(ask_config())
        .approval_provider(Arc::new(FixedApprover(ApprovalDecision::Approved)))
        .build()
        .unwrap();

    let result = agent.run("write a file").await;
    assert_eq!(result.status, RunStatus::Completed);
    assert_eq!(result.final_output, "done");
    assert_eq!(
        std::fs::read_to_string(dir.path().join("hello.txt")).unwrap(),
        "hi"
    );

    let events = wal_events(dir.path(), &result.run_id);
    assert_subsequence(
        &kinds(&events),
        &[
            "run_started",
            "llm_request_started",
            "tool_call_requested",
            "approval_requested",
            "approval_decided",
            "tool_call_started",
            "tool_call_finished",
            "llm_request_started",
            "run_completed",
        ],
    );

    let decided = events
        .iter()
        .find(|e| e.kind == "approval_decided")
        .unwrap();
    assert_eq!(decided.payload["decision"], "approved");

    // The sanitized approval request carries a content descriptor, not
    // the file content.
    let requested = events
        .iter()
        .find(|e| e.kind == "approval_requested")
        .unwrap();
    assert!(requested.payload["request"]["content"]["content_sha256"].is_string());
    assert!(requested.payload["request"]["content"].get("bytes").is_some());
}

#[tokio::test]
async fn denied_approval_does_not_execute_tool() {
    let dir = tempfile::tempdir().unwrap();
    let backend = arc_backend(vec![
        tool_call_turn(
            "c1",
            "file_write",
            serde_json::json!({"path": "blocked.txt", "content": "hi"}),
        ),
        text_turn("understood"),
    ]);
    let agent = Agent::builder(backend)
        .model("fake-model")
        .workspace_root(dir.path())
        .config(ask_config())
        .approval_provider(Arc::new(FixedApprover(ApprovalDecision::Denied)))
        .build()
        .unwrap();

    let result = agent.run("try to write").await;
    assert_eq!(result.status, RunStatus::Completed);
    assert!(!dir.path().join("blocked.txt").exists());

    let events = wal_events(dir.path(), &result.run_id);
    let event_kinds = kinds(&events);
    // The tool never started.
    assert!(!event_kinds.contains(&"tool_call_started".to_owned()));
    let finished = events
        .iter()
        .find(|e| e.kind == "tool_call_finished")
        .unwrap();
    assert_eq!(finished.payload["result"]["error_kind"], "permission");
}

#[tokio::test]
async fn repeated_denial_aborts_run() {
    let dir = tempfile::tempdir().unwrap();
    let args = serde_json::json!({"path": "blocked.txt", "content": "hi"});
    let backend = arc_backend(vec![
        tool_call_turn("c1", "file_write", args.clone()),
        tool_call_turn("c2", "file_write", args),
        // Never reached: the second denial terminates the run.
        text_turn("unreachable"),
    ]);
    let agent = Agent::builder(backend)
        .model("fake-model")
        .workspace_root(dir.path())
        .config(ask_config())
        .approval_provider(Arc::new(FixedApprover(ApprovalDecision::Denied)))
        .build()
        .unwrap();

    let result = agent.run("keep trying").await;
    assert_eq!(result.status, RunStatus::Failed);
    assert_eq!(
        result.error.as_ref().unwrap().error_kind,
        RunErrorKind::ApprovalDenied
    );

    let events = wal_events(dir.path(), &result.run_id);
    let failed = events.iter().rfind(|e| e.kind == "run_failed").unwrap();
    assert_eq!(failed.payload["error_kind"], "approval_denied");
}

#[tokio::test]
async fn missing_approval_provider_fails_fast() {
    let dir = tempfile::tempdir().unwrap();
    let backend = arc_backend(vec![
        tool_call_turn(
            "c1",
            "shell_exec",
            serde_json::json!({"argv": ["echo", "hi"]}),
        ),
        text_turn("unreachable"),
    ]);
    let agent = Agent::builder(backend)
        .model("fake-model")
        .workspace_root(dir.path())
        .config(ask_config())
        .build()
        .unwrap();

    let result = agent.run("run a command").await;
    assert_eq!(result.status, RunStatus::Failed);
    assert_eq!(
        result.error.as_ref().unwrap().error_kind,
        RunErrorKind::ConfigError
    );
}

#[tokio::test]
async fn max_steps_budget_fails_run() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("a.txt"), "content").unwrap();
    let mut config = AgentConfig::default();
    config.run.max_steps = 1;

    let backend = arc_backend(vec![
        tool_call_turn("c1", "file_read", serde_json::json!({"path": "a.txt"})),
        tool_call_turn("c2", "file_read", serde_json::json!({"path": "a.txt"})),
        text_turn("unreachable"),
    ]);
    let agent = Agent::builder(backend)
        .model("fake-model")
        .workspace_root(dir.path())
        .config(config)
        .build()
        .unwrap();

    let result = agent.run("read twice").await;
    assert_eq!(result.status, RunStatus::Failed);
    let error = result.error.as_ref().unwrap();
    assert_eq!(error.error_kind, RunErrorKind::BudgetExceeded);
    assert!(!error.retryable);

    let events = wal_events(dir.path(), &result.run_id);
    // Exactly one executed tool call before the budget fired.
    let started = events.iter().filter(|e| e.kind == "tool_call_started").count();
    assert_eq!(started, 1);
    let failed = events.iter().rfind(|e| e.kind == "run_failed").unwrap();
    assert_eq!(failed.payload["error_kind"], "budget_exceeded");
    assert_eq!(failed.payload["retryable"], false);
}

#[tokio::test]
async fn human_can_raise_an_exhausted_step_budget() {
    use async_trait::async_trait;
    use relay_domain::error::Result as DomainResult;
    use relay_tools::HumanIoProvider;
    use serde_json::Value;

    struct RaiseBudget;

    #[async_trait]
    impl HumanIoProvider for RaiseBudget {
        async fn request_human_input(
            &self,
            _call_id: &str,
            _question: &str,
            _choices: Option<&[String]>,
            _context: Option<&Value>,
            _timeout_ms: Option<u64>,
        ) -> DomainResult<String> {
            Ok("increase_budget".into())
        }
    }

    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("a.txt"), "content").unwrap();
    let mut config = AgentConfig::default();
    config.run.max_steps = 1;
    config.run.increase_budget_extra_steps = 5;

    let backend = arc_backend(vec![
        tool_call_turn("c1", "file_read", serde_json::json!({"path": "a.txt"})),
        tool_call_turn("c2", "file_read", serde_json::json!({"path": "a.txt"})),
        text_turn("finished after raise"),
    ]);
    let agent = Agent::builder(backend)
        .model("fake-model")
        .workspace_root(dir.path())
        .config(config)
        .human_io(Arc::new(RaiseBudget))
        .build()
        .unwrap();

    let result = agent.run("read twice").await;
    assert_eq!(result.status, RunStatus::Completed);
    assert_eq!(result.final_output, "finished after raise");

    let events = wal_events(dir.path(), &result.run_id);
    let started = events.iter().filter(|e| e.kind == "tool_call_started").count();
    assert_eq!(started, 2);
    let response = events.iter().find(|e| e.kind == "human_response").unwrap();
    assert_eq!(response.payload["answer"], "increase_budget");
}

#[tokio::test]
async fn started_and_finished_pair_per_executed_call() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("a.txt"), "x").unwrap();
    let backend = arc_backend(vec![
        tool_call_turn("c1", "file_read", serde_json::json!({"path": "a.txt"})),
        text_turn("done"),
    ]);
    let agent = Agent::builder(backend)
        .model("fake-model")
        .workspace_root(dir.path())
        .build()
        .unwrap();

    let result = agent.run("read it").await;
    let events = wal_events(dir.path(), &result.run_id);

    let started: Vec<_> = events
        .iter()
        .filter(|e| e.kind == "tool_call_started")
        .collect();
    let finished: Vec<_> = events
        .iter()
        .filter(|e| e.kind == "tool_call_finished")
        .collect();
    assert_eq!(started.len(), 1);
    assert_eq!(finished.len(), 1);
    assert_eq!(started[0].payload["call_id"], finished[0].payload["call_id"]);

    let started_idx = events.iter().position(|e| e.kind == "tool_call_started");
    let finished_idx = events.iter().position(|e| e.kind == "tool_call_finished");
    assert!(started_idx < finished_idx);
}

#[tokio::test]
async fn custom_tool_allowlisted_runs_without_approval() {
    use async_trait::async_trait;
    use relay_domain::tool::{ToolCall, ToolResult, ToolSpec};
    use relay_tools::{ToolExecutionContext, ToolHandler};

    struct PingTool;

    #[async_trait]
    impl ToolHandler for PingTool {
        async fn call(&self, _call: &ToolCall, _ctx: &ToolExecutionContext) -> ToolResult {
            ToolResult::ok_payload("pong", None, 0)
        }
    }

    let dir = tempfile::tempdir().unwrap();
    let mut config = ask_config();
    config.safety.tool_allowlist = vec!["ping".into()];

    let backend = arc_backend(vec![
        tool_call_turn("c1", "ping", serde_json::json!({})),
        text_turn("done"),
    ]);
    let agent = Agent::builder(backend)
        .model("fake-model")
        .workspace_root(dir.path())
        .config(config)
        .tool(
            ToolSpec {
                name: "ping".into(),
                description: "ping".into(),
                parameters: serde_json::json!({"type": "object", "properties": {}}),
                requires_approval: None,
                sandbox_policy: None,
                idempotency: None,
            },
            Arc::new(PingTool),
        )
        .build()
        .unwrap();

    let result = agent.run("ping").await;
    assert_eq!(result.status, RunStatus::Completed);

    let events = wal_events(dir.path(), &result.run_id);
    let event_kinds = kinds(&events);
    assert!(!event_kinds.contains(&"approval_requested".to_owned()));
    let finished = events
        .iter()
        .find(|e| e.kind == "tool_call_finished")
        .unwrap();
    assert_eq!(finished.payload["result"]["stdout"], "pong");
}

#[tokio::test]
async fn invalid_raw_arguments_fail_closed() {
    use relay_domain::stream::{ChatStreamEvent, ToolCallDelta};

    let dir = tempfile::tempdir().unwrap();
    let backend = arc_backend(vec![
        ScriptStep::Events(vec![
            ChatStreamEvent::ToolCalls {
                tool_calls: vec![ToolCallDelta::complete("c1", "file_read", "{\"path\":")],
            },
            ChatStreamEvent::Completed {
                finish_reason: Some("tool_calls".into()),
                usage: None,
            },
        ]),
        text_turn("recovered"),
    ]);
    let agent = Agent::builder(backend)
        .model("fake-model")
        .workspace_root(dir.path())
        .build()
        .unwrap();

    let result = agent.run("bad args").await;
    assert_eq!(result.status, RunStatus::Completed);

    let events = wal_events(dir.path(), &result.run_id);
    assert!(!kinds(&events).contains(&"tool_call_started".to_owned()));
    let finished = events
        .iter()
        .find(|e| e.kind == "tool_call_finished")
        .unwrap();
    assert_eq!(finished.payload["result"]["error_kind"], "validation");
}

#[tokio::test]
async fn cancelled_run_emits_run_cancelled() {
    let dir = tempfile::tempdir().unwrap();
    let backend = arc_backend(vec![text_turn("never read")]);
    let agent = Agent::builder(backend)
        .model("fake-model")
        .workspace_root(dir.path())
        .build()
        .unwrap();

    agent.cancel_token().cancel();
    let result = agent.run("do something").await;
    assert_eq!(result.status, RunStatus::Cancelled);

    let events = wal_events(dir.path(), &result.run_id);
    assert_eq!(events.last().unwrap().kind, "run_cancelled");
    assert!(events.last().unwrap().payload["wal_locator"].is_string());
}

#[tokio::test]
async fn run_stream_yields_events_live() {
    let dir = tempfile::tempdir().unwrap();
    let backend = arc_backend(vec![text_turn("hi")]);
    let agent = Agent::builder(backend)
        .model("fake-model")
        .workspace_root(dir.path())
        .build()
        .unwrap();

    let (run_id, mut rx, handle) = agent.run_stream("say hi", RunOptions::default());
    let mut streamed = Vec::new();
    while let Some(ev) = rx.recv().await {
        assert_eq!(ev.run_id, run_id);
        streamed.push(ev.kind);
    }
    let result = handle.await.unwrap();
    assert_eq!(result.status, RunStatus::Completed);
    assert_eq!(streamed.first().map(String::as_str), Some("run_started"));
    assert_eq!(streamed.last().map(String::as_str), Some("run_completed"));
}

#[tokio::test]
async fn secrets_are_redacted_from_streamed_text() {
    let dir = tempfile::tempdir().unwrap();
    let backend = arc_backend(vec![text_turn("the token is sk-verysecret123")]);
    let agent = Agent::builder(backend)
        .model("fake-model")
        .workspace_root(dir.path())
        .redaction_value("sk-verysecret123")
        .build()
        .unwrap();

    let result = agent.run("leak it").await;
    assert_eq!(result.final_output, "the token is <redacted>");

    let events = wal_events(dir.path(), &result.run_id);
    for ev in &events {
        assert!(
            !ev.payload.to_string().contains("sk-verysecret123"),
            "secret leaked in {}",
            ev.kind
        );
    }
}
