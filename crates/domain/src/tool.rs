//! Tool contracts: registry specs, calls, and the result envelope.

use serde::{Deserialize, Serialize};
use serde_json::Value;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// ToolCall / ToolSpec
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// A tool invocation as assembled from the model's stream.
///
/// `raw_arguments` preserves the original JSON string; when it does not
/// parse, the dispatcher fails the call closed with `validation` instead
/// of executing with guessed arguments.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    pub call_id: String,
    pub name: String,
    #[serde(default)]
    pub args: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_arguments: Option<String>,
}

/// Hint used for retry policy and audit; never enforced by the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Idempotency {
    Safe,
    Unsafe,
    Unknown,
}

/// Registry entry exposed to the LLM via function calling.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    /// JSON Schema for the tool's parameters (must be an object schema).
    pub parameters: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requires_approval: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sandbox_policy: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub idempotency: Option<Idempotency>,
}

/// Map a [`ToolSpec`] to a chat.completions `tools[]` entry.
pub fn tool_spec_to_openai_tool(spec: &ToolSpec) -> Value {
    serde_json::json!({
        "type": "function",
        "function": {
            "name": spec.name,
            "description": spec.description,
            "parameters": spec.parameters,
        }
    })
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// ToolResult envelope
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Stable error classification inside a [`ToolResult`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolErrorKind {
    Validation,
    Permission,
    NotFound,
    Timeout,
    Cancelled,
    HumanRequired,
    SandboxDenied,
    ExitCode,
    Unknown,
}

impl ToolErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Validation => "validation",
            Self::Permission => "permission",
            Self::NotFound => "not_found",
            Self::Timeout => "timeout",
            Self::Cancelled => "cancelled",
            Self::HumanRequired => "human_required",
            Self::SandboxDenied => "sandbox_denied",
            Self::ExitCode => "exit_code",
            Self::Unknown => "unknown",
        }
    }
}

/// The structured body of a tool execution.
///
/// Serialized twice: as a JSON string into the tool message `content`
/// (re-injected into LLM history) and as an object into
/// `tool_call_finished.result`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResultPayload {
    pub ok: bool,
    #[serde(default)]
    pub stdout: String,
    #[serde(default)]
    pub stderr: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    #[serde(default)]
    pub duration_ms: u64,
    #[serde(default)]
    pub truncated: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ToolErrorKind>,
    #[serde(default)]
    pub retryable: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_after_ms: Option<u64>,
}

impl Default for ToolResultPayload {
    fn default() -> Self {
        Self {
            ok: false,
            stdout: String::new(),
            stderr: String::new(),
            exit_code: None,
            duration_ms: 0,
            truncated: false,
            data: None,
            error_kind: None,
            retryable: false,
            retry_after_ms: None,
        }
    }
}

/// Unified tool execution envelope returned by every handler.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    pub ok: bool,
    /// Wire form injected back into LLM history (a JSON string).
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ToolErrorKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

impl ToolResult {
    /// Build a result from a structured payload. `content` and `details`
    /// carry the same data in string and object form.
    pub fn from_payload(payload: ToolResultPayload, message: Option<&str>) -> Self {
        let details = serde_json::to_value(&payload).unwrap_or_else(|e| {
            tracing::warn!(error = %e, "failed to serialize tool result payload");
            Value::Null
        });
        Self {
            ok: payload.ok,
            content: details.to_string(),
            error_kind: payload.error_kind,
            message: message.map(str::to_owned),
            details: Some(details),
        }
    }

    /// Successful result with stdout and optional structured data.
    pub fn ok_payload(stdout: impl Into<String>, data: Option<Value>, duration_ms: u64) -> Self {
        Self::from_payload(
            ToolResultPayload {
                ok: true,
                stdout: stdout.into(),
                exit_code: Some(0),
                duration_ms,
                data,
                ..Default::default()
            },
            None,
        )
    }

    /// Failed result with the error message in `stderr`.
    pub fn error_payload(kind: ToolErrorKind, stderr: impl Into<String>) -> Self {
        let stderr = stderr.into();
        Self::from_payload(
            ToolResultPayload {
                ok: false,
                stderr: stderr.clone(),
                error_kind: Some(kind),
                ..Default::default()
            },
            Some(&stderr),
        )
    }

    /// `details` as an object, or an empty object when absent.
    pub fn details_object(&self) -> Value {
        self.details
            .clone()
            .unwrap_or_else(|| Value::Object(Default::default()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_payload_content_parses_back_to_details() {
        let result = ToolResult::ok_payload("hello", None, 12);
        let parsed: Value = serde_json::from_str(&result.content).unwrap();
        assert_eq!(parsed, result.details_object());
        assert_eq!(parsed["ok"], true);
        assert_eq!(parsed["stdout"], "hello");
    }

    #[test]
    fn error_payload_sets_kind_and_message() {
        let result = ToolResult::error_payload(ToolErrorKind::Timeout, "deadline passed");
        assert!(!result.ok);
        assert_eq!(result.error_kind, Some(ToolErrorKind::Timeout));
        assert_eq!(result.message.as_deref(), Some("deadline passed"));
        assert_eq!(result.details_object()["error_kind"], "timeout");
    }

    #[test]
    fn none_fields_are_omitted_from_wire_form() {
        let result = ToolResult::ok_payload("", None, 0);
        assert!(!result.content.contains("retry_after_ms"));
        assert!(!result.content.contains("\"data\""));
    }

    #[test]
    fn openai_tool_mapping_shape() {
        let spec = ToolSpec {
            name: "file_read".into(),
            description: "Read a file.".into(),
            parameters: serde_json::json!({"type": "object", "properties": {}}),
            requires_approval: None,
            sandbox_policy: None,
            idempotency: Some(Idempotency::Safe),
        };
        let mapped = tool_spec_to_openai_tool(&spec);
        assert_eq!(mapped["type"], "function");
        assert_eq!(mapped["function"]["name"], "file_read");
    }
}
