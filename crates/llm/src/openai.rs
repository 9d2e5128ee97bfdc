//! OpenAI-compatible `/chat/completions` streaming backend.
//!
//! Retry policy: 429/5xx and transport errors are retried with
//! exponential backoff (honoring integer-second `Retry-After`) up to
//! `max_retries`, but only before the response stream is handed to the
//! caller. Once any stream event could have been observed, the request
//! is never replayed.

use std::time::Duration;

use relay_domain::config::LlmConfig;
use relay_domain::error::{Error, Result};
use relay_domain::stream::{BoxStream, ChatStreamEvent};
use relay_domain::tool::tool_spec_to_openai_tool;

use crate::backend::{ChatBackend, ChatRequest};
use crate::sse::{drain_data_lines, ChatSseParser};

pub struct OpenAiChatBackend {
    cfg: LlmConfig,
    api_key_override: Option<String>,
    client: reqwest::Client,
}

impl OpenAiChatBackend {
    pub fn new(cfg: LlmConfig) -> Self {
        Self {
            cfg,
            api_key_override: None,
            client: reqwest::Client::new(),
        }
    }

    /// In-memory API key override; takes precedence over the env var.
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key_override = Some(api_key.into());
        self
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.cfg.base_url.trim_end_matches('/'))
    }

    fn api_key(&self) -> Result<String> {
        if let Some(key) = &self.api_key_override {
            return Ok(key.clone());
        }
        match std::env::var(&self.cfg.api_key_env) {
            Ok(key) if !key.is_empty() => Ok(key),
            _ => Err(Error::Config(format!(
                "missing API key env var: {}",
                self.cfg.api_key_env
            ))),
        }
    }

    fn build_payload(&self, request: &ChatRequest) -> Result<serde_json::Value> {
        let mut payload = serde_json::json!({
            "model": request.model,
            "messages": serde_json::to_value(&request.messages)?,
            "stream": true,
        });
        if !request.tools.is_empty() {
            payload["tools"] = request
                .tools
                .iter()
                .map(tool_spec_to_openai_tool)
                .collect::<Vec<_>>()
                .into();
        }
        if let Some(t) = request.temperature {
            payload["temperature"] = serde_json::json!(t);
        }
        if let Some(m) = request.max_tokens {
            payload["max_tokens"] = serde_json::json!(m);
        }
        if let Some(rf) = &request.response_format {
            payload["response_format"] = rf.clone();
        }
        Ok(payload)
    }
}

fn retry_after_ms(headers: &reqwest::header::HeaderMap) -> Option<u64> {
    let raw = headers.get("Retry-After")?.to_str().ok()?;
    let sec: u64 = raw.trim().parse().ok()?;
    if sec == 0 {
        return None;
    }
    Some(sec * 1000)
}

fn retryable_status(status: u16) -> bool {
    status == 429 || (500..=599).contains(&status)
}

fn looks_like_context_length(body: &str) -> bool {
    body.contains("context_length_exceeded") || body.contains("maximum context length")
}

/// Extract the OpenAI-style `{"error":{"message": ...}}` body message.
fn http_error_message(status: u16, body: &str) -> String {
    if let Ok(parsed) = serde_json::from_str::<serde_json::Value>(body) {
        if let Some(message) = parsed
            .get("error")
            .and_then(|e| e.get("message"))
            .and_then(|m| m.as_str())
            .filter(|m| !m.trim().is_empty())
        {
            return format!("HTTP {status}: {}", message.trim());
        }
    }
    format!("HTTP {status}")
}

async fn sleep_backoff(attempt: u32, retry_after_ms: Option<u64>) {
    let delay = match retry_after_ms {
        Some(ms) => Duration::from_millis(ms),
        None => {
            let base = (500u64 * (1u64 << attempt.min(4))).min(8_000);
            // Deterministic sub-10% jitter derived from the clock.
            let jitter = std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .map(|d| d.subsec_nanos() as u64 % (base / 10 + 1))
                .unwrap_or(0);
            Duration::from_millis(base + jitter)
        }
    };
    tokio::time::sleep(delay).await;
}

#[async_trait::async_trait]
impl ChatBackend for OpenAiChatBackend {
    async fn stream_chat(
        &self,
        request: &ChatRequest,
    ) -> Result<BoxStream<'static, Result<ChatStreamEvent>>> {
        let payload = self.build_payload(request)?;
        let key = self.api_key()?;
        let endpoint = self.endpoint();
        let timeout = Duration::from_secs(self.cfg.timeout_sec);

        let mut attempt: u32 = 0;
        let response = loop {
            let result = self
                .client
                .post(&endpoint)
                .bearer_auth(&key)
                .timeout(timeout)
                .json(&payload)
                .send()
                .await;

            match result {
                Ok(resp) if resp.status().is_success() => break resp,
                Ok(resp) => {
                    let status = resp.status().as_u16();
                    let retry_after = retry_after_ms(resp.headers());
                    let body = resp.text().await.unwrap_or_default();

                    if looks_like_context_length(&body) {
                        return Err(Error::ContextLengthExceeded(http_error_message(
                            status, &body,
                        )));
                    }
                    if retryable_status(status) && attempt < self.cfg.max_retries {
                        tracing::debug!(status, attempt, "retrying chat request");
                        sleep_backoff(attempt, retry_after).await;
                        attempt += 1;
                        continue;
                    }
                    return Err(Error::Http {
                        status,
                        message: http_error_message(status, &body),
                        retry_after_ms: retry_after,
                    });
                }
                Err(e) if e.is_timeout() => {
                    if attempt < self.cfg.max_retries {
                        sleep_backoff(attempt, None).await;
                        attempt += 1;
                        continue;
                    }
                    return Err(Error::Timeout(format!("chat request timed out: {e}")));
                }
                Err(e) => {
                    if attempt < self.cfg.max_retries {
                        sleep_backoff(attempt, None).await;
                        attempt += 1;
                        continue;
                    }
                    return Err(Error::Llm(format!("chat request failed: {e}")));
                }
            }
        };

        let stream = async_stream::stream! {
            let mut response = response;
            let mut buffer = String::new();
            let mut parser = ChatSseParser::new();

            loop {
                match response.chunk().await {
                    Ok(Some(bytes)) => {
                        buffer.push_str(&String::from_utf8_lossy(&bytes));
                        for data in drain_data_lines(&mut buffer) {
                            for ev in parser.feed_data(&data) {
                                yield Ok(ev);
                            }
                        }
                    }
                    Ok(None) => {
                        // Flush a trailing partial event, then close out.
                        if !buffer.trim().is_empty() {
                            buffer.push_str("\n\n");
                            for data in drain_data_lines(&mut buffer) {
                                for ev in parser.feed_data(&data) {
                                    yield Ok(ev);
                                }
                            }
                        }
                        for ev in parser.finish() {
                            yield Ok(ev);
                        }
                        break;
                    }
                    Err(e) => {
                        yield Err(Error::Llm(format!("stream read failed: {e}")));
                        break;
                    }
                }
            }
        };

        Ok(Box::pin(stream))
    }
}
