//! The atomic unit of truth: every state change in a run is an
//! [`AgentEvent`] appended to the WAL.

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A single entry in the run's event stream.
///
/// Events are strictly append-ordered within a `run_id`; timestamps are
/// monotonic non-decreasing per run. Readers must tolerate unknown
/// top-level keys (serde's default), so this type must never opt into
/// `deny_unknown_fields`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentEvent {
    /// Event type from the stable taxonomy (`run_started`,
    /// `tool_call_finished`, ...).
    #[serde(rename = "type")]
    pub kind: String,
    /// RFC3339 UTC timestamp with `Z` suffix. The wire key is always
    /// `timestamp`, never `ts`.
    pub timestamp: String,
    pub run_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub turn_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step_id: Option<String>,
    #[serde(default)]
    pub payload: Value,
}

impl AgentEvent {
    /// Create an event stamped with the current time.
    pub fn new(kind: impl Into<String>, run_id: impl Into<String>, payload: Value) -> Self {
        Self {
            kind: kind.into(),
            timestamp: now_rfc3339(),
            run_id: run_id.into(),
            turn_id: None,
            step_id: None,
            payload,
        }
    }

    pub fn with_turn(mut self, turn_id: impl Into<String>) -> Self {
        self.turn_id = Some(turn_id.into());
        self
    }

    pub fn with_step(mut self, step_id: impl Into<String>) -> Self {
        self.step_id = Some(step_id.into());
        self
    }
}

/// Current UTC time as an RFC3339 string ending in `Z`.
pub fn now_rfc3339() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}
