//! chat.completions SSE parsing.
//!
//! Chunks are buffered and split on `\n\n`; each `data:` payload feeds a
//! stateful parser that assembles tool calls across deltas (arguments
//! arrive as string fragments keyed by choice index) and flushes them
//! when the stream reports a finish reason.

use std::collections::BTreeMap;

use serde_json::Value;

use relay_domain::stream::{ChatStreamEvent, ToolCallDelta, Usage};

/// Extract complete `data:` payloads from an SSE buffer.
///
/// The buffer is drained in-place; a trailing partial event stays for
/// the next call.
pub fn drain_data_lines(buffer: &mut String) -> Vec<String> {
    let mut data_lines = Vec::new();
    while let Some(pos) = buffer.find("\n\n") {
        let block: String = buffer.drain(..pos).collect();
        buffer.drain(..2);
        for line in block.lines() {
            let line = line.trim();
            if let Some(data) = line.strip_prefix("data:") {
                let data = data.trim();
                if !data.is_empty() {
                    data_lines.push(data.to_owned());
                }
            }
        }
    }
    data_lines
}

#[derive(Debug, Default)]
struct PartialToolCall {
    call_id: String,
    name: String,
    arguments: String,
}

/// Stateful parser for one streaming chat.completions response.
#[derive(Debug, Default)]
pub struct ChatSseParser {
    tool_calls: BTreeMap<u64, PartialToolCall>,
    usage: Option<Usage>,
    completed: bool,
}

impl ChatSseParser {
    pub fn new() -> Self {
        Self::default()
    }

    fn flush_tool_calls(&mut self) -> Option<ChatStreamEvent> {
        if self.tool_calls.is_empty() {
            return None;
        }
        let assembled: Vec<ToolCallDelta> = std::mem::take(&mut self.tool_calls)
            .into_values()
            .map(|p| ToolCallDelta {
                call_id: p.call_id,
                name: if p.name.is_empty() {
                    None
                } else {
                    Some(p.name)
                },
                arguments: p.arguments,
            })
            .collect();
        Some(ChatStreamEvent::ToolCalls {
            tool_calls: assembled,
        })
    }

    fn complete(&mut self, finish_reason: Option<String>) -> Vec<ChatStreamEvent> {
        let mut events = Vec::new();
        if let Some(tool_calls) = self.flush_tool_calls() {
            events.push(tool_calls);
        }
        self.completed = true;
        events.push(ChatStreamEvent::Completed {
            finish_reason,
            usage: self.usage.take(),
        });
        events
    }

    /// Consume one `data:` payload and return the events it produced.
    pub fn feed_data(&mut self, data: &str) -> Vec<ChatStreamEvent> {
        if self.completed {
            return Vec::new();
        }
        if data == "[DONE]" {
            return self.complete(None);
        }

        let chunk: Value = match serde_json::from_str(data) {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!(error = %e, "skipping malformed SSE chunk");
                return Vec::new();
            }
        };

        if let Some(usage) = chunk.get("usage").filter(|u| u.is_object()) {
            self.usage = Some(Usage {
                prompt_tokens: usage["prompt_tokens"].as_u64().unwrap_or(0) as u32,
                completion_tokens: usage["completion_tokens"].as_u64().unwrap_or(0) as u32,
                total_tokens: usage["total_tokens"].as_u64().unwrap_or(0) as u32,
            });
        }

        let Some(choice) = chunk
            .get("choices")
            .and_then(|c| c.as_array())
            .and_then(|c| c.first())
        else {
            return Vec::new();
        };

        let mut events = Vec::new();

        if let Some(delta) = choice.get("delta") {
            if let Some(text) = delta.get("content").and_then(|c| c.as_str()) {
                if !text.is_empty() {
                    events.push(ChatStreamEvent::TextDelta {
                        text: text.to_owned(),
                    });
                }
            }
            if let Some(tool_calls) = delta.get("tool_calls").and_then(|t| t.as_array()) {
                for tc in tool_calls {
                    let index = tc.get("index").and_then(|i| i.as_u64()).unwrap_or(0);
                    let entry = self.tool_calls.entry(index).or_default();
                    if let Some(id) = tc.get("id").and_then(|i| i.as_str()) {
                        entry.call_id = id.to_owned();
                    }
                    if let Some(function) = tc.get("function") {
                        if let Some(name) = function.get("name").and_then(|n| n.as_str()) {
                            entry.name.push_str(name);
                        }
                        if let Some(args) = function.get("arguments").and_then(|a| a.as_str()) {
                            entry.arguments.push_str(args);
                        }
                    }
                }
            }
        }

        if let Some(finish_reason) = choice.get("finish_reason").and_then(|f| f.as_str()) {
            events.extend(self.complete(Some(finish_reason.to_owned())));
        }

        events
    }

    /// Flush at end-of-body for servers that never send `[DONE]`.
    pub fn finish(&mut self) -> Vec<ChatStreamEvent> {
        if self.completed {
            return Vec::new();
        }
        self.complete(None)
    }
}
