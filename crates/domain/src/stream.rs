//! Events emitted during LLM streaming (provider-agnostic).

use serde::{Deserialize, Serialize};
use std::pin::Pin;

/// A boxed async stream, used for LLM streaming responses.
pub type BoxStream<'a, T> = Pin<Box<dyn futures_core::Stream<Item = T> + Send + 'a>>;

/// Streaming chunk from a chat backend.
///
/// Tool-call arguments may arrive as partial JSON fragments spread across
/// several `ToolCalls` events; consumers accumulate per `call_id` and parse
/// only once `Completed` arrives.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChatStreamEvent {
    /// A text token chunk.
    TextDelta { text: String },

    /// One or more (possibly partial) tool-call fragments.
    ToolCalls { tool_calls: Vec<ToolCallDelta> },

    /// Stream is finished.
    Completed {
        finish_reason: Option<String>,
        usage: Option<Usage>,
    },
}

/// A tool-call fragment: `name` appears on the first fragment for a
/// `call_id`; `arguments` is appended across fragments.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallDelta {
    pub call_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default)]
    pub arguments: String,
}

impl ToolCallDelta {
    /// A fully-assembled call in a single fragment (test fixtures, fakes).
    pub fn complete(call_id: impl Into<String>, name: impl Into<String>, arguments: impl Into<String>) -> Self {
        Self {
            call_id: call_id.into(),
            name: Some(name.into()),
            arguments: arguments.into(),
        }
    }
}

/// Token usage for a completion.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}
