//! Deterministic allow/ask/deny policy decisions.
//!
//! The guard reports risk; this module combines it with the configured
//! mode and allow/deny lists. Rule order is part of the contract and is
//! covered by tests.

use relay_domain::config::{SafetyConfig, SafetyMode};
use serde::Serialize;

use crate::guard::{CommandRisk, RiskLevel};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PolicyAction {
    Allow,
    Ask,
    Deny,
}

/// Deterministic policy output. `matched_rule` names the rule that fired,
/// for diagnostics and audit.
#[derive(Debug, Clone, Serialize)]
pub struct PolicyDecision {
    pub action: PolicyAction,
    pub reason: String,
    pub matched_rule: Option<String>,
}

impl PolicyDecision {
    fn new(action: PolicyAction, reason: &str, matched_rule: Option<String>) -> Self {
        Self {
            action,
            reason: reason.into(),
            matched_rule,
        }
    }
}

/// Shell-quote one argv element (POSIX `shlex.quote` semantics): safe
/// tokens pass through, anything else is single-quoted with embedded
/// quotes escaped. Keeps a token containing e.g. `"git status; rm"` as
/// one quoted unit so it cannot spoof a multi-word prefix rule.
fn shell_quote(token: &str) -> String {
    if token.is_empty() {
        return "''".to_owned();
    }
    let safe = token
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || "_@%+=:,./-".contains(c));
    if safe {
        return token.to_owned();
    }
    format!("'{}'", token.replace('\'', "'\"'\"'"))
}

fn format_argv(argv: &[String]) -> String {
    argv.iter()
        .map(|t| shell_quote(t))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Match an argv against prefix rules.
///
/// A prefix containing spaces matches the full command string; a bare
/// word matches `argv[0]` exactly or the full-string prefix.
fn matches_prefixes<'a>(argv: &[String], prefixes: &'a [String]) -> Option<&'a str> {
    let full = format_argv(argv);
    let cmd0 = argv.first().map(String::as_str).unwrap_or("");
    for prefix in prefixes {
        let p = prefix.trim();
        if p.is_empty() {
            continue;
        }
        if p.contains(' ') {
            if full.starts_with(p) {
                return Some(p);
            }
            continue;
        }
        if cmd0 == p || full.starts_with(p) {
            return Some(p);
        }
    }
    None
}

/// Policy decision for shell-family tools.
pub fn evaluate_shell_policy(
    argv: &[String],
    risk: &CommandRisk,
    safety: &SafetyConfig,
    sandbox_permissions: Option<&str>,
) -> PolicyDecision {
    if let Some(rule) = matches_prefixes(argv, &safety.denylist) {
        return PolicyDecision::new(
            PolicyAction::Deny,
            "Command is denied by safety.denylist.",
            Some(rule.to_owned()),
        );
    }

    if safety.mode == SafetyMode::Deny {
        return PolicyDecision::new(
            PolicyAction::Deny,
            "Tool is denied by safety.mode=deny.",
            Some("mode=deny".into()),
        );
    }

    // Escalated sandbox permissions always go through approval, even
    // under mode=allow.
    if sandbox_permissions == Some("require_escalated") {
        return PolicyDecision::new(
            PolicyAction::Ask,
            "Tool requires escalated sandbox permissions.",
            Some("sandbox".into()),
        );
    }

    if let Some(rule) = matches_prefixes(argv, &safety.allowlist) {
        return PolicyDecision::new(
            PolicyAction::Allow,
            "Command is allowed by safety.allowlist.",
            Some(rule.to_owned()),
        );
    }

    if safety.mode == SafetyMode::Allow {
        return PolicyDecision::new(
            PolicyAction::Allow,
            "Allowed by safety.mode=allow.",
            Some("mode=allow".into()),
        );
    }

    if risk.risk_level == RiskLevel::High {
        return PolicyDecision::new(
            PolicyAction::Ask,
            "High-risk command requires approval.",
            Some("risk=high".into()),
        );
    }

    PolicyDecision::new(
        PolicyAction::Ask,
        "Approval required by safety.mode=ask.",
        Some("mode=ask".into()),
    )
}

/// Policy decision for file-family tools (writes and patches).
pub fn evaluate_file_policy(safety: &SafetyConfig) -> PolicyDecision {
    match safety.mode {
        SafetyMode::Deny => PolicyDecision::new(
            PolicyAction::Deny,
            "Tool is denied by safety.mode=deny.",
            Some("mode=deny".into()),
        ),
        SafetyMode::Allow => PolicyDecision::new(
            PolicyAction::Allow,
            "Allowed by safety.mode=allow.",
            Some("mode=allow".into()),
        ),
        SafetyMode::Ask => PolicyDecision::new(
            PolicyAction::Ask,
            "Approval required by safety.mode=ask.",
            Some("mode=ask".into()),
        ),
    }
}

/// Policy decision for user-registered (custom) tools.
///
/// Under `mode=ask` custom tools are fail-closed: only an explicit
/// `tool_allowlist` hit skips approval.
pub fn evaluate_custom_tool_policy(tool: &str, safety: &SafetyConfig) -> PolicyDecision {
    let tool = tool.trim();

    if !tool.is_empty() && safety.tool_denylist.iter().any(|t| t.trim() == tool) {
        return PolicyDecision::new(
            PolicyAction::Deny,
            "Tool is denied by safety.tool_denylist.",
            Some("tool_denylist".into()),
        );
    }

    match safety.mode {
        SafetyMode::Deny => PolicyDecision::new(
            PolicyAction::Deny,
            "Tool is denied by safety.mode=deny.",
            Some("mode=deny".into()),
        ),
        SafetyMode::Allow => PolicyDecision::new(
            PolicyAction::Allow,
            "Allowed by safety.mode=allow.",
            Some("mode=allow".into()),
        ),
        SafetyMode::Ask => {
            if !tool.is_empty() && safety.tool_allowlist.iter().any(|t| t.trim() == tool) {
                PolicyDecision::new(
                    PolicyAction::Allow,
                    "Tool is allowed by safety.tool_allowlist.",
                    Some("tool_allowlist".into()),
                )
            } else {
                PolicyDecision::new(
                    PolicyAction::Ask,
                    "Approval required by safety.mode=ask.",
                    Some("mode=ask".into()),
                )
            }
        }
    }
}
