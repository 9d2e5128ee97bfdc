//! Chat backend contract.

use async_trait::async_trait;
use serde_json::Value;

use relay_domain::error::Result;
use relay_domain::message::Message;
use relay_domain::stream::{BoxStream, ChatStreamEvent};
use relay_domain::tool::ToolSpec;

/// A single parameter object carrying everything a chat request needs,
/// so the backend signature stays stable as options grow.
#[derive(Debug, Clone, Default)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<Message>,
    pub tools: Vec<ToolSpec>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    pub response_format: Option<Value>,
    /// Correlation for downstream logging/limiting; backends may ignore.
    pub run_id: Option<String>,
    pub turn_id: Option<String>,
}

/// LLM transport abstraction (streaming chat.completions).
///
/// The returned stream yields `text_delta`/`tool_calls`/`completed`
/// events; tool-call arguments may arrive as partial fragments that the
/// consumer assembles per `call_id`.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    async fn stream_chat(
        &self,
        request: &ChatRequest,
    ) -> Result<BoxStream<'static, Result<ChatStreamEvent>>>;
}
