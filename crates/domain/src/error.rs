/// Shared error type used across all relay crates.
///
/// Tool-level failures never travel through this type; they are returned
/// as `ToolResult` values so the loop can keep running. This enum carries
/// the failures that terminate (or get classified for) a run.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("IO: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP {status}: {message}")]
    Http {
        status: u16,
        message: String,
        retry_after_ms: Option<u64>,
    },

    #[error("timeout: {0}")]
    Timeout(String),

    #[error("LLM: {0}")]
    Llm(String),

    #[error("context length exceeded: {0}")]
    ContextLengthExceeded(String),

    #[error("config: {0}")]
    Config(String),

    #[error("missing required env var: {env_var}")]
    MissingEnvVar {
        env_var: String,
        skill_name: Option<String>,
        skill_path: Option<String>,
        policy: Option<String>,
    },

    #[error("WAL: {0}")]
    Wal(String),

    #[error("cancelled: {0}")]
    Cancelled(String),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, Error>;
