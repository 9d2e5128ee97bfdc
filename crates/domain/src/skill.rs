//! Skills resolution contract.
//!
//! The skills subsystem itself (scanning, bundle extraction) lives
//! outside the core; the loop only consumes this resolution interface to
//! inject skill bodies into the prompt and to bind `skill_exec` approvals
//! to a concrete bundle.

use serde::{Deserialize, Serialize};

/// A skill resolved from a mention in the task text.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolvedSkill {
    pub name: String,
    pub namespace: String,
    /// Stable locator (filesystem path or remote URI).
    pub locator: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    /// The mention text as it appeared in the task.
    pub mention_text: String,
    #[serde(default)]
    pub required_env_vars: Vec<String>,
    /// Markdown body injected into the system context.
    pub body: String,
}

/// Resolution of a `skill_exec` action against a concrete bundle.
///
/// `bundle_sha256` binds the approval key to the exact bundle contents;
/// `env_keys` lists the variable names the action will see (never values).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkillExecResolution {
    pub argv: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cwd: Option<String>,
    #[serde(default)]
    pub env_keys: Vec<String>,
    pub bundle_root: String,
    pub bundle_sha256: String,
}

/// Resolution interface the loop and the safety gate consume.
pub trait SkillResolver: Send + Sync {
    /// Resolve skill mentions (e.g. `$skills/name`) in the task text.
    fn resolve_mentions(&self, text: &str) -> Vec<ResolvedSkill>;

    /// Resolve a `skill_exec` mention + action to a concrete invocation.
    fn resolve_exec(&self, mention: &str, action: &str) -> Option<SkillExecResolution>;
}
