//! Minimal dangerous-command detection.
//!
//! The guard only assigns a risk level and a reason; the policy layer
//! combines it with configuration to produce the allow/ask/deny decision.

use regex::Regex;
use serde::Serialize;
use std::sync::OnceLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

/// Command risk assessment.
#[derive(Debug, Clone, Serialize)]
pub struct CommandRisk {
    pub risk_level: RiskLevel,
    pub reason: String,
}

impl CommandRisk {
    fn new(risk_level: RiskLevel, reason: impl Into<String>) -> Self {
        Self {
            risk_level,
            reason: reason.into(),
        }
    }

    pub fn low() -> Self {
        Self::new(RiskLevel::Low, "no dangerous pattern matched")
    }
}

/// Matches `rm` flag clusters containing both `r` and `f` (`-rf`, `-fr`,
/// `-rIf`, ...).
fn rm_force_recursive_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^-[a-zA-Z]*(?:r[a-zA-Z]*f|f[a-zA-Z]*r)[a-zA-Z]*$").expect("static regex"))
}

/// Assess an argv against the minimal dangerous patterns.
pub fn evaluate_command_risk(argv: &[String]) -> CommandRisk {
    let Some(cmd0) = argv.first() else {
        return CommandRisk::new(RiskLevel::Medium, "empty argv");
    };

    if cmd0 == "sudo" {
        return CommandRisk::new(RiskLevel::High, "sudo detected");
    }

    let base = cmd0.rsplit('/').next().unwrap_or(cmd0);

    if base == "rm" {
        let force_recursive = argv[1..].iter().any(|a| rm_force_recursive_re().is_match(a));
        if force_recursive {
            let targets: Vec<&str> = argv[1..]
                .iter()
                .filter(|a| !a.starts_with('-'))
                .map(String::as_str)
                .collect();
            if targets.iter().any(|t| *t == "/" || t.starts_with('/')) {
                return CommandRisk::new(RiskLevel::High, "rm -rf against an absolute path");
            }
            if targets.iter().any(|t| *t == "~" || t.starts_with("~/")) {
                return CommandRisk::new(RiskLevel::High, "rm -rf against the home directory");
            }
        }
    }

    const DANGEROUS: &[&str] = &["dd", "shutdown", "reboot", "halt"];
    if base.starts_with("mkfs") || DANGEROUS.contains(&base) {
        return CommandRisk::new(RiskLevel::High, format!("dangerous command: {base}"));
    }

    CommandRisk::low()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn argv(parts: &[&str]) -> Vec<String> {
        parts.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn sudo_is_high() {
        let risk = evaluate_command_risk(&argv(&["sudo", "apt", "install"]));
        assert_eq!(risk.risk_level, RiskLevel::High);
    }

    #[test]
    fn rm_rf_root_and_home_are_high() {
        assert_eq!(
            evaluate_command_risk(&argv(&["rm", "-rf", "/"])).risk_level,
            RiskLevel::High
        );
        assert_eq!(
            evaluate_command_risk(&argv(&["rm", "-fr", "~"])).risk_level,
            RiskLevel::High
        );
        assert_eq!(
            evaluate_command_risk(&argv(&["/bin/rm", "-rf", "/etc"])).risk_level,
            RiskLevel::High
        );
    }

    #[test]
    fn rm_rf_relative_path_is_low() {
        assert_eq!(
            evaluate_command_risk(&argv(&["rm", "-rf", "build"])).risk_level,
            RiskLevel::Low
        );
    }

    #[test]
    fn disk_and_power_commands_are_high() {
        for cmd in ["mkfs.ext4", "dd", "shutdown", "reboot", "halt"] {
            assert_eq!(
                evaluate_command_risk(&argv(&[cmd])).risk_level,
                RiskLevel::High,
                "{cmd}"
            );
        }
    }

    #[test]
    fn empty_argv_is_medium() {
        assert_eq!(evaluate_command_risk(&[]).risk_level, RiskLevel::Medium);
    }

    #[test]
    fn plain_command_is_low() {
        assert_eq!(
            evaluate_command_risk(&argv(&["ls", "-la"])).risk_level,
            RiskLevel::Low
        );
    }
}
