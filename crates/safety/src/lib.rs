//! Safety gate: policy evaluation, approvals, and argument sanitization.
//!
//! The gate decides allow/ask/deny for each tool call before anything
//! executes; sanitizers keep secrets and large payloads out of approval
//! requests and event payloads.

pub mod approvals;
pub mod gate;
pub mod guard;
pub mod policy;
pub mod sanitize;

pub use approvals::{
    compute_approval_key, ApprovalDecision, ApprovalProvider, ApprovalRequest, ApprovalRule,
    RuleBasedApprovalProvider,
};
pub use gate::{GateAction, GateDecision, SafetyGate};
pub use guard::{evaluate_command_risk, CommandRisk, RiskLevel};
pub use policy::{evaluate_custom_tool_policy, evaluate_shell_policy, PolicyAction, PolicyDecision};
