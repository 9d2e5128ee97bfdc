//! Agent configuration: run budgets, safety rules, context recovery,
//! skills policy, and LLM transport settings.
//!
//! Higher layers pass configuration explicitly; the core reads no
//! environment variables of its own.

use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Run
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResumeStrategy {
    Summary,
    Replay,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    /// Max tool-call executions per run (counts only calls that actually
    /// began executing).
    pub max_steps: u32,
    /// Wall-time budget in seconds. `None` disables the check.
    pub max_wall_time_sec: Option<u64>,
    /// Timeout for human-I/O answers.
    pub human_timeout_ms: Option<u64>,
    pub history_max_messages: usize,
    pub history_max_chars: usize,
    pub resume_strategy: ResumeStrategy,
    /// Budget added when a human approves raising an exhausted step
    /// budget; unattended runs stay strict fail-fast.
    pub increase_budget_extra_steps: u32,
    pub increase_budget_extra_wall_time_sec: u64,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            max_steps: 100,
            max_wall_time_sec: None,
            human_timeout_ms: None,
            history_max_messages: 200,
            history_max_chars: 400_000,
            resume_strategy: ResumeStrategy::Summary,
            increase_budget_extra_steps: 50,
            increase_budget_extra_wall_time_sec: 300,
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Safety
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SafetyMode {
    Allow,
    Ask,
    Deny,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SafetyConfig {
    pub mode: SafetyMode,
    /// Command-prefix rules for shell-family tools.
    pub allowlist: Vec<String>,
    pub denylist: Vec<String>,
    /// By-name rules for custom tools.
    pub tool_allowlist: Vec<String>,
    pub tool_denylist: Vec<String>,
    pub approval_timeout_ms: Option<u64>,
}

impl Default for SafetyConfig {
    fn default() -> Self {
        Self {
            mode: SafetyMode::Ask,
            allowlist: Vec::new(),
            denylist: Vec::new(),
            tool_allowlist: Vec::new(),
            tool_denylist: Vec::new(),
            approval_timeout_ms: None,
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Context recovery
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContextRecoveryMode {
    FailFast,
    CompactFirst,
    AskFirst,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecoveryConfig {
    pub context_recovery_mode: ContextRecoveryMode,
    /// Applied when `ask_first` is configured but no human-I/O provider
    /// is available.
    pub ask_first_fallback_mode: ContextRecoveryMode,
    pub max_compactions_per_run: u32,
    pub compaction_history_max_chars: usize,
    pub compaction_keep_last_messages: usize,
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            context_recovery_mode: ContextRecoveryMode::CompactFirst,
            ask_first_fallback_mode: ContextRecoveryMode::CompactFirst,
            max_compactions_per_run: 5,
            compaction_history_max_chars: 50_000,
            compaction_keep_last_messages: 10,
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Skills / LLM
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnvVarMissingPolicy {
    FailFast,
    AskHuman,
    SkipSkill,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkillsConfig {
    pub env_var_missing_policy: EnvVarMissingPolicy,
}

impl Default for SkillsConfig {
    fn default() -> Self {
        Self {
            env_var_missing_policy: EnvVarMissingPolicy::AskHuman,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    pub base_url: String,
    /// Name of the env var holding the API key (the key itself is never
    /// stored in config).
    pub api_key_env: String,
    pub timeout_sec: u64,
    pub max_retries: u32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".into(),
            api_key_env: "OPENAI_API_KEY".into(),
            timeout_sec: 120,
            max_retries: 2,
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Aggregate
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AgentConfig {
    #[serde(default)]
    pub run: RunConfig,
    #[serde(default)]
    pub safety: SafetyConfig,
    #[serde(default)]
    pub recovery: RecoveryConfig,
    #[serde(default)]
    pub skills: SkillsConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    /// Tool execution defaults.
    #[serde(default)]
    pub tools: ToolLimitsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolLimitsConfig {
    pub default_timeout_ms: u64,
    pub max_file_bytes: u64,
    pub sandbox_policy_default: String,
}

impl Default for ToolLimitsConfig {
    fn default() -> Self {
        Self {
            default_timeout_ms: 60_000,
            max_file_bytes: 1_048_576,
            sandbox_policy_default: "inherit".into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_contract() {
        let cfg = AgentConfig::default();
        assert_eq!(cfg.run.max_steps, 100);
        assert_eq!(cfg.safety.mode, SafetyMode::Ask);
        assert_eq!(
            cfg.recovery.context_recovery_mode,
            ContextRecoveryMode::CompactFirst
        );
        assert_eq!(cfg.recovery.max_compactions_per_run, 5);
        assert_eq!(cfg.run.resume_strategy, ResumeStrategy::Summary);
    }

    #[test]
    fn config_deserializes_with_partial_fields() {
        let cfg: AgentConfig =
            serde_json::from_str(r#"{"safety": {"mode": "deny", "allowlist": [], "denylist": [], "tool_allowlist": [], "tool_denylist": [], "approval_timeout_ms": null}}"#)
                .unwrap();
        assert_eq!(cfg.safety.mode, SafetyMode::Deny);
        assert_eq!(cfg.run.max_steps, 100);
    }
}
