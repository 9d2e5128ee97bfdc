//! LLM backend contract, the OpenAI-compatible streaming implementation,
//! and a scripted fake for offline regression.

pub mod backend;
pub mod fake;
pub mod openai;
pub mod sse;

pub use backend::{ChatBackend, ChatRequest};
pub use fake::{FakeChatBackend, FakeChatCall};
pub use openai::OpenAiChatBackend;
