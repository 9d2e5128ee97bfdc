//! Scripted chat backend for offline regression.
//!
//! Each `stream_chat` consumes one scripted call; a missing trailing
//! `Completed` is appended automatically so fixtures stay terse.

use parking_lot::Mutex;

use relay_domain::error::{Error, Result};
use relay_domain::stream::{BoxStream, ChatStreamEvent};

use crate::backend::{ChatBackend, ChatRequest};

/// The expected output of one chat call.
#[derive(Debug, Clone)]
pub struct FakeChatCall {
    pub events: Vec<ChatStreamEvent>,
}

impl FakeChatCall {
    pub fn new(events: Vec<ChatStreamEvent>) -> Self {
        Self { events }
    }

    /// Single text completion.
    pub fn text(text: &str) -> Self {
        Self::new(vec![
            ChatStreamEvent::TextDelta { text: text.into() },
            ChatStreamEvent::Completed {
                finish_reason: Some("stop".into()),
                usage: None,
            },
        ])
    }
}

/// Drives the loop with a predetermined event script.
pub struct FakeChatBackend {
    calls: Mutex<std::vec::IntoIter<FakeChatCall>>,
    /// Requests observed, for assertions on message assembly.
    requests: Mutex<Vec<ChatRequest>>,
}

impl FakeChatBackend {
    pub fn new(calls: Vec<FakeChatCall>) -> Self {
        Self {
            calls: Mutex::new(calls.into_iter()),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Snapshot of every request this backend has received.
    pub fn requests(&self) -> Vec<ChatRequest> {
        self.requests.lock().clone()
    }
}

#[async_trait::async_trait]
impl ChatBackend for FakeChatBackend {
    async fn stream_chat(
        &self,
        request: &ChatRequest,
    ) -> Result<BoxStream<'static, Result<ChatStreamEvent>>> {
        self.requests.lock().push(request.clone());

        let call = self
            .calls
            .lock()
            .next()
            .ok_or_else(|| Error::Llm("FakeChatBackend script exhausted".into()))?;

        let mut events = call.events;
        let has_completed = events
            .iter()
            .any(|e| matches!(e, ChatStreamEvent::Completed { .. }));
        if !has_completed {
            events.push(ChatStreamEvent::Completed {
                finish_reason: Some("fake_eof".into()),
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

/// Backend that always fails with the given error factory; exercises the
/// transport classification paths.
pub struct FailingChatBackend<F>
where
    F: Fn() -> Error + Send + Sync,
{
    make_error: F,
}

impl<F> FailingChatBackend<F>
where
    F: Fn() -> Error + Send + Sync,
{
    pub fn new(make_error: F) -> Self {
        Self { make_error }
    }
}

#[async_trait::async_trait]
impl<F> ChatBackend for FailingChatBackend<F>
where
    F: Fn() -> Error + Send + Sync,
{
    async fn stream_chat(
        &self,
        _request: &ChatRequest,
    ) -> Result<BoxStream<'static, Result<ChatStreamEvent>>> {
        Err((self.make_error)())
    }
}
