//! Terminal run errors, their classification, and the run result surface.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Error;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// RunError
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Stable machine-consumable classification for `run_failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunErrorKind {
    AuthError,
    RateLimited,
    ServerError,
    HttpError,
    ConfigError,
    ContextLengthExceeded,
    LlmError,
    MissingEnvVar,
    BudgetExceeded,
    ApprovalDenied,
    Unknown,
}

impl RunErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AuthError => "auth_error",
            Self::RateLimited => "rate_limited",
            Self::ServerError => "server_error",
            Self::HttpError => "http_error",
            Self::ConfigError => "config_error",
            Self::ContextLengthExceeded => "context_length_exceeded",
            Self::LlmError => "llm_error",
            Self::MissingEnvVar => "missing_env_var",
            Self::BudgetExceeded => "budget_exceeded",
            Self::ApprovalDenied => "approval_denied",
            Self::Unknown => "unknown",
        }
    }
}

/// Structured terminal failure, serialized into the `run_failed` payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunError {
    pub error_kind: RunErrorKind,
    pub message: String,
    pub retryable: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_after_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

impl RunError {
    pub fn new(error_kind: RunErrorKind, message: impl Into<String>) -> Self {
        Self {
            error_kind,
            message: message.into(),
            retryable: false,
            retry_after_ms: None,
            details: None,
        }
    }

    pub fn retryable(mut self) -> Self {
        self.retryable = true;
        self
    }

    pub fn with_retry_after_ms(mut self, ms: u64) -> Self {
        self.retry_after_ms = Some(ms);
        self
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }

    /// Stable `run_failed` payload fields.
    pub fn to_payload(&self) -> Value {
        let mut out = serde_json::json!({
            "error_kind": self.error_kind.as_str(),
            "message": self.message,
            "retryable": self.retryable,
        });
        if let Some(ms) = self.retry_after_ms {
            out["retry_after_ms"] = ms.into();
        }
        if let Some(details) = &self.details {
            out["details"] = details.clone();
        }
        out
    }

    /// Map a runtime error to its stable classification.
    ///
    /// Messages never embed secret values; callers redact before emission.
    pub fn classify(err: &Error) -> Self {
        match err {
            Error::Http {
                status,
                message,
                retry_after_ms,
            } => {
                let mut msg = message.clone();
                if msg.len() > 800 {
                    msg.truncate(800);
                    msg.push_str("...<truncated>");
                }
                let details = serde_json::json!({"status_code": status});
                match status {
                    401 | 403 => Self::new(RunErrorKind::AuthError, msg).with_details(details),
                    429 => {
                        let mut out = Self::new(RunErrorKind::RateLimited, msg)
                            .retryable()
                            .with_details(details);
                        if let Some(ms) = retry_after_ms {
                            out = out.with_retry_after_ms(*ms);
                        }
                        out
                    }
                    500..=599 => Self::new(RunErrorKind::ServerError, msg)
                        .retryable()
                        .with_details(details),
                    _ => Self::new(RunErrorKind::HttpError, msg).with_details(details),
                }
            }
            Error::Timeout(msg) => Self::new(RunErrorKind::LlmError, msg.clone())
                .retryable()
                .with_details(serde_json::json!({"kind": "timeout"})),
            Error::Llm(msg) => Self::new(RunErrorKind::LlmError, msg.clone()).retryable(),
            Error::ContextLengthExceeded(msg) => {
                Self::new(RunErrorKind::ContextLengthExceeded, msg.clone())
            }
            Error::Config(msg) => Self::new(RunErrorKind::ConfigError, msg.clone()),
            Error::MissingEnvVar {
                env_var,
                skill_name,
                skill_path,
                policy,
            } => {
                let mut details = serde_json::json!({"missing_env_vars": [env_var]});
                if let Some(name) = skill_name {
                    details["skill_name"] = name.clone().into();
                }
                if let Some(path) = skill_path {
                    details["skill_path"] = path.clone().into();
                }
                if let Some(policy) = policy {
                    details["policy"] = policy.clone().into();
                }
                Self::new(
                    RunErrorKind::MissingEnvVar,
                    format!("missing required env var: {env_var}"),
                )
                .with_details(details)
            }
            other => Self::new(RunErrorKind::Unknown, other.to_string()),
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// RunResult
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Completed,
    Failed,
    Cancelled,
}

/// Terminal summary returned to the caller once a run reaches a terminal
/// event. `wal_locator` points at the full audit trail.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunResult {
    pub status: RunStatus,
    pub run_id: String,
    pub final_output: String,
    pub wal_locator: String,
    /// Back-compat alias for filesystem WALs (same value as `wal_locator`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub events_path: Option<String>,
    #[serde(default)]
    pub artifacts: Vec<String>,
    #[serde(default)]
    pub metadata: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<RunError>,
}
