//! LLM conversation history elements (OpenAI chat.completions wire form).

use serde::{Deserialize, Serialize};

use crate::tool::ToolCall;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

/// A message in the conversation history.
///
/// `tool_call_id` is present iff `role == tool`; `tool_calls` is present
/// iff the assistant requested tool executions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<AssistantToolCall>>,
}

/// Assistant-side tool invocation in wire form (`function.arguments` is the
/// raw JSON string the model produced).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssistantToolCall {
    pub id: String,
    #[serde(rename = "type")]
    pub call_type: String,
    pub function: FunctionCall,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionCall {
    pub name: String,
    pub arguments: String,
}

// ── Convenience constructors ───────────────────────────────────────

impl Message {
    pub fn system(text: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: Some(text.into()),
            tool_call_id: None,
            tool_calls: None,
        }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: Some(text.into()),
            tool_call_id: None,
            tool_calls: None,
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: Some(text.into()),
            tool_call_id: None,
            tool_calls: None,
        }
    }

    /// Tool output message correlated back to its originating call.
    pub fn tool_result(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: Role::Tool,
            content: Some(content.into()),
            tool_call_id: Some(tool_call_id.into()),
            tool_calls: None,
        }
    }

    /// Assistant message carrying pending tool calls (text may be empty).
    pub fn assistant_with_tool_calls(text: &str, calls: &[ToolCall]) -> Self {
        let tool_calls = calls
            .iter()
            .map(|c| AssistantToolCall {
                id: c.call_id.clone(),
                call_type: "function".into(),
                function: FunctionCall {
                    name: c.name.clone(),
                    arguments: c
                        .raw_arguments
                        .clone()
                        .unwrap_or_else(|| c.args.to_string()),
                },
            })
            .collect();
        Self {
            role: Role::Assistant,
            content: if text.is_empty() {
                None
            } else {
                Some(text.to_owned())
            },
            tool_call_id: None,
            tool_calls: Some(tool_calls),
        }
    }
}
