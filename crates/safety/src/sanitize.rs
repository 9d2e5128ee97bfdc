//! Argument sanitization for approvals and event payloads.
//!
//! The same sanitized form feeds approval requests,
//! `tool_call_requested`, and `llm_response_delta(tool_calls)` so one
//! parameter never shows up with different shapes across the audit
//! trail. Secrets are replaced with `<redacted>`, large payloads with
//! `{bytes, content_sha256}` descriptors, and `env` maps with their
//! sorted key lists.

use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

use relay_domain::skill::SkillResolver;

pub const REDACTED: &str = "<redacted>";

/// Tools treated as shell-family for sanitization and policy.
pub const SHELL_FAMILY: &[&str] = &["shell_exec", "exec_command", "shell", "shell_command"];

/// Tools whose payload content is replaced by a content descriptor.
pub const CONTENT_FAMILY: &[&str] = &["file_write", "write_stdin", "apply_patch"];

/// Replace every known secret value (length ≥ 4 after trimming) in `text`.
pub fn redact_text(text: &str, redaction_values: &[String]) -> String {
    let mut out = text.to_owned();
    for value in redaction_values {
        let v = value.trim();
        if v.len() < 4 {
            continue;
        }
        out = out.replace(v, REDACTED);
    }
    out
}

/// Recursively sanitize event data: redact secret substrings and replace
/// any `env` object with its sorted `env_keys` list. Structure is
/// otherwise preserved for debuggability.
pub fn redact_event_data(value: &Value, redaction_values: &[String]) -> Value {
    match value {
        Value::String(s) => Value::String(redact_text(s, redaction_values)),
        Value::Array(items) => Value::Array(
            items
                .iter()
                .map(|v| redact_event_data(v, redaction_values))
                .collect(),
        ),
        Value::Object(map) => {
            let mut out = Map::new();
            for (key, val) in map {
                if key == "env" {
                    if let Value::Object(env) = val {
                        out.insert("env_keys".into(), env_keys(env));
                        continue;
                    }
                }
                out.insert(key.clone(), redact_event_data(val, redaction_values));
            }
            Value::Object(out)
        }
        other => other.clone(),
    }
}

fn env_keys(env: &Map<String, Value>) -> Value {
    let mut keys: Vec<&String> = env.keys().collect();
    keys.sort();
    Value::Array(keys.into_iter().map(|k| Value::String(k.clone())).collect())
}

/// `{bytes, content_sha256}` descriptor for a payload string.
pub fn content_descriptor(content: &str) -> Value {
    let digest = Sha256::digest(content.as_bytes());
    serde_json::json!({
        "bytes": content.len(),
        "content_sha256": hex::encode(digest),
    })
}

/// File paths named by an apply_patch envelope
/// (`*** Add File:` / `*** Update File:` / `*** Delete File:` headers).
pub fn extract_patch_file_paths(patch: &str) -> Vec<String> {
    let mut paths = Vec::new();
    for line in patch.lines() {
        let line = line.trim();
        for header in ["*** Add File:", "*** Update File:", "*** Delete File:"] {
            if let Some(rest) = line.strip_prefix(header) {
                let path = rest.trim();
                if !path.is_empty() {
                    paths.push(path.to_owned());
                }
            }
        }
    }
    paths
}

fn sanitize_shell_args(args: &Value) -> Value {
    let mut out = Map::new();
    if let Value::Object(map) = args {
        for key in [
            "argv",
            "cwd",
            "timeout_ms",
            "sandbox",
            "sandbox_permissions",
            "justification",
        ] {
            if let Some(v) = map.get(key) {
                out.insert(key.into(), v.clone());
            }
        }
        if let Some(Value::Object(env)) = map.get("env") {
            out.insert("env_keys".into(), env_keys(env));
        }
    }
    Value::Object(out)
}

fn sanitize_content_args(tool: &str, args: &Value) -> Value {
    let Value::Object(map) = args else {
        return Value::Object(Map::new());
    };
    let mut out = Map::new();
    for (key, val) in map {
        match (key.as_str(), val) {
            ("content" | "chars" | "input", Value::String(s)) => {
                out.insert(key.clone(), content_descriptor(s));
                if tool == "apply_patch" {
                    let paths = extract_patch_file_paths(s);
                    if !paths.is_empty() {
                        out.insert(
                            "file_paths".into(),
                            Value::Array(paths.into_iter().map(Value::String).collect()),
                        );
                    }
                }
            }
            ("env", Value::Object(env)) => {
                out.insert("env_keys".into(), env_keys(env));
            }
            _ => {
                out.insert(key.clone(), val.clone());
            }
        }
    }
    Value::Object(out)
}

fn sanitize_skill_exec_args(args: &Value, skills: Option<&dyn SkillResolver>) -> Value {
    let mention = args
        .get("mention")
        .and_then(|v| v.as_str())
        .unwrap_or_default();
    let action = args
        .get("action")
        .and_then(|v| v.as_str())
        .unwrap_or_default();

    if let Some(resolution) = skills.and_then(|s| s.resolve_exec(mention, action)) {
        return serde_json::json!({
            "mention": mention,
            "action": action,
            "argv": resolution.argv,
            "cwd": resolution.cwd,
            "env_keys": resolution.env_keys,
            "bundle_root": resolution.bundle_root,
            "bundle_sha256": resolution.bundle_sha256,
        });
    }

    // Stable structural subset when no resolver is available.
    serde_json::json!({
        "mention": mention,
        "action": action,
        "argv": [],
    })
}

/// Sanitized representation of a tool call's arguments for events and
/// approvals. Real execution arguments are untouched.
pub fn sanitize_tool_call_arguments(
    tool: &str,
    args: &Value,
    redaction_values: &[String],
    skills: Option<&dyn SkillResolver>,
) -> Value {
    if SHELL_FAMILY.contains(&tool) {
        return sanitize_shell_args(args);
    }
    if CONTENT_FAMILY.contains(&tool) {
        return sanitize_content_args(tool, args);
    }
    if tool == "skill_exec" {
        return sanitize_skill_exec_args(args, skills);
    }
    redact_event_data(args, redaction_values)
}

/// Human-readable approval summary for a sanitized request.
pub fn approval_summary(tool: &str, request: &Value) -> String {
    let command = request
        .get("argv")
        .and_then(|v| v.as_array())
        .filter(|a| !a.is_empty())
        .map(|a| {
            a.iter()
                .map(|v| v.as_str().unwrap_or_default().to_owned())
                .collect::<Vec<_>>()
                .join(" ")
        });
    match command {
        Some(cmd) => format!("Authorize {tool}: {cmd}"),
        None => match request.get("path").and_then(|v| v.as_str()) {
            Some(path) => format!("Authorize {tool}: {path}"),
            None => format!("Authorize {tool}"),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relay_domain::skill::{ResolvedSkill, SkillExecResolution};

    #[test]
    fn redact_text_skips_short_values() {
        let values = vec!["abc".into(), "secret-token".into()];
        let out = redact_text("abc secret-token abc", &values);
        assert_eq!(out, "abc <redacted> abc");
    }

    #[test]
    fn env_map_becomes_sorted_env_keys() {
        let args = serde_json::json!({"env": {"Z_VAR": "v1", "A_VAR": "v2"}, "other": 1});
        let out = redact_event_data(&args, &[]);
        assert_eq!(out["env_keys"], serde_json::json!(["A_VAR", "Z_VAR"]));
        assert!(out.get("env").is_none());
    }

    #[test]
    fn nested_secret_values_are_redacted() {
        let values = vec!["hunter2000".into()];
        let args = serde_json::json!({"note": ["the key is hunter2000"], "n": 5});
        let out = redact_event_data(&args, &values);
        assert_eq!(out["note"][0], "the key is <redacted>");
        assert_eq!(out["n"], 5);
    }

    #[test]
    fn shell_args_keep_structural_fields_only() {
        let args = serde_json::json!({
            "argv": ["echo", "hi"],
            "cwd": "/tmp",
            "timeout_ms": 1000,
            "env": {"TOKEN": "super-secret"},
            "stray": "dropped",
        });
        let out = sanitize_tool_call_arguments("shell_exec", &args, &[], None);
        assert_eq!(out["argv"], serde_json::json!(["echo", "hi"]));
        assert_eq!(out["env_keys"], serde_json::json!(["TOKEN"]));
        assert!(out.get("env").is_none());
        assert!(out.get("stray").is_none());
    }

    #[test]
    fn file_write_content_becomes_descriptor() {
        let args = serde_json::json!({"path": "hello.txt", "content": "hi", "create_dirs": true});
        let out = sanitize_tool_call_arguments("file_write", &args, &[], None);
        assert_eq!(out["path"], "hello.txt");
        assert_eq!(out["content"]["bytes"], 2);
        let sha = out["content"]["content_sha256"].as_str().unwrap();
        assert_eq!(sha.len(), 64);
        // sha256("hi")
        assert_eq!(
            sha,
            "8f434346648f6b96df89dda901c5176b10a6d83961dd3c1ac88b59b2dc327aa4"
        );
    }

    #[test]
    fn apply_patch_extracts_file_paths() {
        let patch = "*** Begin Patch\n*** Update File: src/main.rs\n@@\n-a\n+b\n*** Add File: docs/new.md\n*** End Patch";
        let args = serde_json::json!({"input": patch});
        let out = sanitize_tool_call_arguments("apply_patch", &args, &[], None);
        assert_eq!(
            out["file_paths"],
            serde_json::json!(["src/main.rs", "docs/new.md"])
        );
        assert!(out["input"]["content_sha256"].is_string());
    }

    struct FakeResolver {
        sha: &'static str,
    }

    impl SkillResolver for FakeResolver {
        fn resolve_mentions(&self, _text: &str) -> Vec<ResolvedSkill> {
            Vec::new()
        }

        fn resolve_exec(&self, mention: &str, action: &str) -> Option<SkillExecResolution> {
            Some(SkillExecResolution {
                argv: vec!["python3".into(), format!("{mention}/{action}.py")],
                cwd: Some("/bundles/b1".into()),
                env_keys: vec!["NOTION_TOKEN".into()],
                bundle_root: "/bundles/b1".into(),
                bundle_sha256: self.sha.into(),
            })
        }
    }

    #[test]
    fn skill_exec_resolves_bundle_binding() {
        let resolver = FakeResolver { sha: "aa11" };
        let args = serde_json::json!({"mention": "$skills/notion", "action": "sync", "env": {"NOTION_TOKEN": "v"}});
        let out = sanitize_tool_call_arguments("skill_exec", &args, &[], Some(&resolver));
        assert_eq!(out["bundle_sha256"], "aa11");
        assert_eq!(out["env_keys"], serde_json::json!(["NOTION_TOKEN"]));
        assert!(out.get("env").is_none());
    }

    #[test]
    fn skill_exec_without_resolver_is_structural() {
        let args = serde_json::json!({"mention": "$skills/notion", "action": "sync"});
        let out = sanitize_tool_call_arguments("skill_exec", &args, &[], None);
        assert_eq!(out["argv"], serde_json::json!([]));
        assert_eq!(out["mention"], "$skills/notion");
    }

    #[test]
    fn summary_prefers_argv_then_path() {
        let shell = serde_json::json!({"argv": ["echo", "hi"]});
        assert_eq!(approval_summary("shell_exec", &shell), "Authorize shell_exec: echo hi");
        let file = serde_json::json!({"path": "a.txt"});
        assert_eq!(approval_summary("file_write", &file), "Authorize file_write: a.txt");
    }
}
