//! The unified safety gate: couples policy, risk, and sanitization for a
//! single tool call, decoupled from the agent loop.

use serde_json::Value;

use relay_domain::config::SafetyConfig;
use relay_domain::skill::SkillResolver;
use relay_domain::tool::{ToolCall, ToolErrorKind, ToolResult, ToolResultPayload};

use crate::guard::{evaluate_command_risk, CommandRisk};
use crate::policy::{
    evaluate_custom_tool_policy, evaluate_file_policy, evaluate_shell_policy, PolicyAction,
    PolicyDecision,
};
use crate::sanitize::{
    approval_summary, sanitize_tool_call_arguments, CONTENT_FAMILY, SHELL_FAMILY,
};

/// Gate verdict for one tool call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateAction {
    Allow,
    Ask,
    Deny,
}

/// Full gate output: the action plus the sanitized request used for
/// approvals and event payloads.
#[derive(Debug, Clone)]
pub struct GateDecision {
    pub action: GateAction,
    pub reason: String,
    pub summary: String,
    pub sanitized_request: Value,
    pub matched_rule: Option<String>,
}

/// Policy category a tool falls into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyCategory {
    Shell,
    File,
    Custom,
    None,
}

/// Category for a tool name. Tools outside the builtin families are
/// `Custom` when the caller registered them, `None` otherwise (read-only
/// builtins need no gating).
pub fn policy_category_for(tool: &str, is_custom_tool: bool) -> PolicyCategory {
    if SHELL_FAMILY.contains(&tool) || tool == "skill_exec" {
        return PolicyCategory::Shell;
    }
    if CONTENT_FAMILY.contains(&tool) {
        return PolicyCategory::File;
    }
    if is_custom_tool {
        return PolicyCategory::Custom;
    }
    PolicyCategory::None
}

/// Unified safety gate bound to one run's configuration.
pub struct SafetyGate {
    safety: SafetyConfig,
    redaction_values: Vec<String>,
    sandbox_permissions: Option<String>,
}

impl SafetyGate {
    pub fn new(safety: SafetyConfig, redaction_values: Vec<String>) -> Self {
        Self {
            safety,
            redaction_values,
            sandbox_permissions: None,
        }
    }

    pub fn with_sandbox_permissions(mut self, permissions: Option<String>) -> Self {
        self.sandbox_permissions = permissions;
        self
    }

    fn extract_risk(&self, tool: &str, args: &Value) -> (Vec<String>, CommandRisk) {
        if SHELL_FAMILY.contains(&tool) {
            let argv: Vec<String> = args
                .get("argv")
                .and_then(|v| v.as_array())
                .map(|a| {
                    a.iter()
                        .filter_map(|v| v.as_str().map(str::to_owned))
                        .collect()
                })
                .unwrap_or_default();
            let risk = evaluate_command_risk(&argv);
            return (argv, risk);
        }
        (Vec::new(), CommandRisk::low())
    }

    /// Sanitized `(summary, request)` pair for approvals and events.
    pub fn sanitize(
        &self,
        call: &ToolCall,
        skills: Option<&dyn SkillResolver>,
    ) -> (String, Value) {
        let request = sanitize_tool_call_arguments(
            &call.name,
            &call.args,
            &self.redaction_values,
            skills,
        );
        let summary = approval_summary(&call.name, &request);
        (summary, request)
    }

    /// Evaluate one tool call against policy.
    pub fn evaluate(
        &self,
        call: &ToolCall,
        is_custom_tool: bool,
        skills: Option<&dyn SkillResolver>,
    ) -> GateDecision {
        let category = policy_category_for(&call.name, is_custom_tool);

        let (argv, risk) = self.extract_risk(&call.name, &call.args);
        let sandbox_permissions = call
            .args
            .get("sandbox_permissions")
            .and_then(|v| v.as_str())
            .map(str::to_owned)
            .or_else(|| self.sandbox_permissions.clone());

        let policy: PolicyDecision = match category {
            PolicyCategory::None => {
                return GateDecision {
                    action: GateAction::Allow,
                    reason: "No safety gate required".into(),
                    summary: String::new(),
                    sanitized_request: Value::Object(Default::default()),
                    matched_rule: None,
                };
            }
            PolicyCategory::Shell => evaluate_shell_policy(
                &argv,
                &risk,
                &self.safety,
                sandbox_permissions.as_deref(),
            ),
            PolicyCategory::File => evaluate_file_policy(&self.safety),
            PolicyCategory::Custom => evaluate_custom_tool_policy(&call.name, &self.safety),
        };

        let (summary, sanitized_request) = self.sanitize(call, skills);

        GateDecision {
            action: match policy.action {
                PolicyAction::Allow => GateAction::Allow,
                PolicyAction::Ask => GateAction::Ask,
                PolicyAction::Deny => GateAction::Deny,
            },
            reason: policy.reason,
            summary,
            sanitized_request,
            matched_rule: policy.matched_rule,
        }
    }

    /// Denied `ToolResult` for a gate (or approval) denial.
    pub fn build_denied_result(&self, call: &ToolCall, decision: &GateDecision) -> ToolResult {
        let reason = if decision.reason.is_empty() {
            "policy denied".to_owned()
        } else {
            decision.reason.clone()
        };
        ToolResult::from_payload(
            ToolResultPayload {
                ok: false,
                stderr: reason,
                data: Some(serde_json::json!({
                    "tool": call.name,
                    "reason": decision
                        .matched_rule
                        .clone()
                        .unwrap_or_else(|| "policy".into()),
                })),
                error_kind: Some(ToolErrorKind::Permission),
                ..Default::default()
            },
            Some("policy denied"),
        )
    }
}
