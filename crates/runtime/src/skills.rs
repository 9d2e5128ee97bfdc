//! Skill environment-variable gate.
//!
//! Runs before any skill body is injected into the prompt. Values are
//! session-only: they live in the env store and are never serialized
//! into events or the WAL. The human flow emits a `human_request` with
//! a UI-only envelope and deliberately no `human_response`.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use relay_domain::config::EnvVarMissingPolicy;
use relay_domain::error::{Error, Result};
use relay_domain::event::AgentEvent;
use relay_domain::skill::ResolvedSkill;
use relay_tools::HumanIoProvider;

/// Whether a skill can be injected after the env gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkillEnvOutcome {
    Ready,
    Skipped,
}

fn policy_str(policy: EnvVarMissingPolicy) -> &'static str {
    match policy {
        EnvVarMissingPolicy::FailFast => "fail_fast",
        EnvVarMissingPolicy::AskHuman => "ask_human",
        EnvVarMissingPolicy::SkipSkill => "skip_skill",
    }
}

fn skill_path(skill: &ResolvedSkill) -> String {
    skill.path.clone().unwrap_or_else(|| skill.locator.clone())
}

/// Ensure every `required_env_var` of `skill` is satisfied.
///
/// Resolution order: session env store (`provided`) → process env
/// (`process_env`) → human (`human`). `emit` must route through the
/// durable event exit.
pub async fn ensure_skill_env_vars<E>(
    skill: &ResolvedSkill,
    policy: EnvVarMissingPolicy,
    env_store: &Arc<Mutex<HashMap<String, String>>>,
    human_io: Option<&Arc<dyn HumanIoProvider>>,
    human_timeout_ms: Option<u64>,
    run_id: &str,
    turn_id: &str,
    emit: &mut E,
) -> Result<SkillEnvOutcome>
where
    E: FnMut(AgentEvent) -> Result<()>,
{
    let mk_event = |kind: &str, payload: serde_json::Value| {
        AgentEvent::new(kind, run_id.to_owned(), payload).with_turn(turn_id.to_owned())
    };

    for env_var in &skill.required_env_vars {
        let env_var = env_var.trim();
        if env_var.is_empty() {
            continue;
        }

        let have_session_value = env_store
            .lock()
            .get(env_var)
            .map(|v| !v.is_empty())
            .unwrap_or(false);
        if have_session_value {
            emit(mk_event(
                "env_var_set",
                serde_json::json!({
                    "env_var": env_var,
                    "skill_name": skill.name,
                    "skill_path": skill_path(skill),
                    "value_source": "provided",
                }),
            ))?;
            continue;
        }

        if let Ok(value) = std::env::var(env_var) {
            if !value.is_empty() {
                env_store.lock().insert(env_var.to_owned(), value);
                emit(mk_event(
                    "env_var_set",
                    serde_json::json!({
                        "env_var": env_var,
                        "skill_name": skill.name,
                        "skill_path": skill_path(skill),
                        "value_source": "process_env",
                    }),
                ))?;
                continue;
            }
        }

        emit(mk_event(
            "env_var_required",
            serde_json::json!({
                "env_var": env_var,
                "skill_name": skill.name,
                "skill_path": skill_path(skill),
                "source": "skill_dependency",
                "policy": policy_str(policy),
            }),
        ))?;

        match policy {
            EnvVarMissingPolicy::SkipSkill => {
                emit(mk_event(
                    "skill_injection_skipped",
                    serde_json::json!({
                        "skill_name": skill.name,
                        "skill_path": skill_path(skill),
                        "reason": "missing_env_var",
                        "missing_env_vars": [env_var],
                        "policy": policy_str(policy),
                    }),
                ))?;
                return Ok(SkillEnvOutcome::Skipped);
            }
            EnvVarMissingPolicy::FailFast => {
                return Err(Error::MissingEnvVar {
                    env_var: env_var.to_owned(),
                    skill_name: Some(skill.name.clone()),
                    skill_path: Some(skill_path(skill)),
                    policy: Some(policy_str(policy).to_owned()),
                });
            }
            EnvVarMissingPolicy::AskHuman => {
                let Some(human_io) = human_io else {
                    return Err(Error::Config(format!(
                        "missing required env var (no human-I/O provider): {env_var}"
                    )));
                };

                let call_id = format!("env_{env_var}_{}", uuid::Uuid::new_v4().simple());
                let question = format!(
                    "Provide a value for the environment variable {env_var} \
                     (kept in session memory only, never persisted)."
                );
                let context = serde_json::json!({
                    "kind": "env_var",
                    "env_var": env_var,
                    "skill": {"name": skill.name, "path": skill_path(skill)},
                });

                // The answer is a secret: a human_request drives the UI,
                // but no human_response is ever emitted for it.
                emit(mk_event(
                    "human_request",
                    serde_json::json!({
                        "call_id": call_id,
                        "question": question,
                        "choices": null,
                        "context": context,
                    }),
                ))?;

                let answer = human_io
                    .request_human_input(
                        &call_id,
                        &question,
                        None,
                        Some(&context),
                        human_timeout_ms,
                    )
                    .await
                    .map_err(|e| {
                        Error::Config(format!("missing required env var {env_var}: {e}"))
                    })?;
                if answer.is_empty() {
                    return Err(Error::Config(format!(
                        "missing required env var: {env_var}"
                    )));
                }

                env_store.lock().insert(env_var.to_owned(), answer);
                emit(mk_event(
                    "env_var_set",
                    serde_json::json!({
                        "env_var": env_var,
                        "skill_name": skill.name,
                        "skill_path": skill_path(skill),
                        "value_source": "human",
                    }),
                ))?;
            }
        }
    }

    Ok(SkillEnvOutcome::Ready)
}
