//! Approval contracts: decisions, requests, providers, and the stable
//! approval key.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

use relay_domain::error::Result;

/// Decision taken for a single approval request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalDecision {
    Approved,
    ApprovedForSession,
    Denied,
    Abort,
}

impl ApprovalDecision {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Approved => "approved",
            Self::ApprovedForSession => "approved_for_session",
            Self::Denied => "denied",
            Self::Abort => "abort",
        }
    }
}

/// Approval request shown to a human or rule engine.
///
/// `summary` and `details` are sanitized before construction and never
/// carry secret values.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApprovalRequest {
    /// Stable hash over `(tool, sanitized_request)`; keys the session
    /// approval cache across retries and resumes.
    pub approval_key: String,
    pub tool: String,
    pub summary: String,
    #[serde(default)]
    pub details: Value,
}

/// Approval adapter. The runtime never reads stdin or pops dialogs
/// itself; integrations resolve the request from their own surface.
#[async_trait]
pub trait ApprovalProvider: Send + Sync {
    /// Request a decision for one gated operation. `timeout_ms == None`
    /// leaves the waiting strategy to the implementation.
    async fn request_approval(
        &self,
        request: &ApprovalRequest,
        timeout_ms: Option<u64>,
    ) -> Result<ApprovalDecision>;
}

/// Hex SHA-256 over the canonical JSON of `{tool, request}`.
///
/// serde_json serializes object keys in sorted order with minimal
/// separators and preserves non-ASCII, which is exactly the canonical
/// form, so the key is deterministic under request-key reordering.
pub fn compute_approval_key(tool: &str, request: &Value) -> String {
    let canonical = serde_json::json!({"request": request, "tool": tool});
    let raw = serde_json::to_string(&canonical).unwrap_or_else(|e| {
        tracing::warn!(error = %e, "failed to canonicalize approval request");
        String::new()
    });
    hex::encode(Sha256::digest(raw.as_bytes()))
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Rule-based provider
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Predicate over an approval request; a `false` or erroring predicate
/// counts as no match.
pub type ApprovalCondition = Box<dyn Fn(&ApprovalRequest) -> bool + Send + Sync>;

/// An ordered approval rule: exact tool match plus an optional condition.
pub struct ApprovalRule {
    pub tool: String,
    pub condition: Option<ApprovalCondition>,
    pub decision: ApprovalDecision,
}

impl ApprovalRule {
    pub fn new(tool: impl Into<String>, decision: ApprovalDecision) -> Self {
        Self {
            tool: tool.into(),
            condition: None,
            decision,
        }
    }

    pub fn when(mut self, condition: ApprovalCondition) -> Self {
        self.condition = Some(condition);
        self
    }
}

/// Programmatic approvals for unattended runs.
///
/// Fail-closed: no matching rule means the default decision, and the
/// default defaults to `Denied`.
pub struct RuleBasedApprovalProvider {
    rules: Vec<ApprovalRule>,
    default: ApprovalDecision,
}

impl RuleBasedApprovalProvider {
    pub fn new(rules: Vec<ApprovalRule>) -> Self {
        Self {
            rules,
            default: ApprovalDecision::Denied,
        }
    }

    pub fn with_default(mut self, default: ApprovalDecision) -> Self {
        self.default = default;
        self
    }
}

#[async_trait]
impl ApprovalProvider for RuleBasedApprovalProvider {
    async fn request_approval(
        &self,
        request: &ApprovalRequest,
        _timeout_ms: Option<u64>,
    ) -> Result<ApprovalDecision> {
        let tool = request.tool.trim();
        for rule in &self.rules {
            if rule.tool.trim() != tool {
                continue;
            }
            match &rule.condition {
                None => return Ok(rule.decision),
                Some(cond) => {
                    if cond(request) {
                        return Ok(rule.decision);
                    }
                }
            }
        }
        Ok(self.default)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn approval_key_is_stable_under_key_reordering() {
        let a = serde_json::json!({"argv": ["echo", "hi"], "cwd": "/tmp"});
        let b = serde_json::json!({"cwd": "/tmp", "argv": ["echo", "hi"]});
        assert_eq!(
            compute_approval_key("shell_exec", &a),
            compute_approval_key("shell_exec", &b)
        );
    }

    #[test]
    fn approval_key_differs_by_tool_and_request() {
        let req = serde_json::json!({"argv": ["echo"]});
        assert_ne!(
            compute_approval_key("shell_exec", &req),
            compute_approval_key("exec_command", &req)
        );
        assert_ne!(
            compute_approval_key("shell_exec", &req),
            compute_approval_key("shell_exec", &serde_json::json!({"argv": ["ls"]}))
        );
    }

    fn request(tool: &str) -> ApprovalRequest {
        ApprovalRequest {
            approval_key: "k".into(),
            tool: tool.into(),
            summary: String::new(),
            details: serde_json::json!({}),
        }
    }

    #[tokio::test]
    async fn rules_match_in_order_and_default_denies() {
        let provider = RuleBasedApprovalProvider::new(vec![ApprovalRule::new(
            "file_write",
            ApprovalDecision::Approved,
        )]);
        assert_eq!(
            provider
                .request_approval(&request("file_write"), None)
                .await
                .unwrap(),
            ApprovalDecision::Approved
        );
        assert_eq!(
            provider
                .request_approval(&request("shell_exec"), None)
                .await
                .unwrap(),
            ApprovalDecision::Denied
        );
    }

    #[tokio::test]
    async fn condition_false_falls_through() {
        let provider = RuleBasedApprovalProvider::new(vec![
            ApprovalRule::new("shell_exec", ApprovalDecision::Approved)
                .when(Box::new(|req| req.summary.contains("echo"))),
            ApprovalRule::new("shell_exec", ApprovalDecision::Abort),
        ]);
        let mut req = request("shell_exec");
        req.summary = "Authorize shell_exec: rm".into();
        assert_eq!(
            provider.request_approval(&req, None).await.unwrap(),
            ApprovalDecision::Abort
        );
    }
}
