//! Name-keyed tool catalog with per-call argument validation.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;

use relay_domain::tool::{ToolCall, ToolErrorKind, ToolResult, ToolSpec};

use crate::context::ToolExecutionContext;

/// A callable tool. Handlers report failures through the returned
/// [`ToolResult`] and never abort the loop.
#[async_trait]
pub trait ToolHandler: Send + Sync {
    async fn call(&self, call: &ToolCall, ctx: &ToolExecutionContext) -> ToolResult;
}

struct ToolEntry {
    spec: ToolSpec,
    handler: Arc<dyn ToolHandler>,
    /// Registered by the integrator rather than shipped as a builtin;
    /// drives the `custom` policy category.
    custom: bool,
}

/// Registry of all tools available to a run.
#[derive(Default)]
pub struct ToolRegistry {
    entries: RwLock<HashMap<String, ToolEntry>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool. Fails when the name is taken and `override_existing`
    /// is false.
    pub fn register(
        &self,
        spec: ToolSpec,
        handler: Arc<dyn ToolHandler>,
        override_existing: bool,
    ) -> Result<(), String> {
        self.register_inner(spec, handler, override_existing, false)
    }

    /// Register a caller-supplied (custom) tool.
    pub fn register_custom(
        &self,
        spec: ToolSpec,
        handler: Arc<dyn ToolHandler>,
        override_existing: bool,
    ) -> Result<(), String> {
        self.register_inner(spec, handler, override_existing, true)
    }

    fn register_inner(
        &self,
        spec: ToolSpec,
        handler: Arc<dyn ToolHandler>,
        override_existing: bool,
        custom: bool,
    ) -> Result<(), String> {
        let name = spec.name.trim().to_owned();
        if name.is_empty() {
            return Err("tool name must be non-empty".into());
        }
        let mut entries = self.entries.write();
        if entries.contains_key(&name) && !override_existing {
            return Err(format!("tool '{name}' is already registered"));
        }
        entries.insert(
            name,
            ToolEntry {
                spec,
                handler,
                custom,
            },
        );
        Ok(())
    }

    /// Specs for LLM function-calling export, sorted by name for a stable
    /// request shape.
    pub fn list_specs(&self) -> Vec<ToolSpec> {
        let mut specs: Vec<ToolSpec> = self
            .entries
            .read()
            .values()
            .map(|e| e.spec.clone())
            .collect();
        specs.sort_by(|a, b| a.name.cmp(&b.name));
        specs
    }

    pub fn is_registered(&self, name: &str) -> bool {
        self.entries.read().contains_key(name)
    }

    pub fn is_custom_tool(&self, name: &str) -> bool {
        self.entries
            .read()
            .get(name)
            .map(|e| e.custom)
            .unwrap_or(true)
    }

    /// Execute a tool call: resolve by name, validate args against the
    /// spec's required properties, then invoke the handler.
    pub async fn dispatch(
        &self,
        call: &ToolCall,
        ctx: &ToolExecutionContext,
        turn_id: &str,
        step_id: &str,
    ) -> ToolResult {
        let (spec, handler) = {
            let entries = self.entries.read();
            match entries.get(&call.name) {
                Some(entry) => (entry.spec.clone(), Arc::clone(&entry.handler)),
                None => {
                    return ToolResult::error_payload(
                        ToolErrorKind::NotFound,
                        format!("unknown tool: '{}'", call.name),
                    );
                }
            }
        };

        if let Err(msg) = validate_args(&spec, call) {
            return ToolResult::error_payload(ToolErrorKind::Validation, msg);
        }

        tracing::debug!(
            tool = %call.name,
            call_id = %call.call_id,
            turn_id,
            step_id,
            "dispatching tool call"
        );
        handler.call(call, ctx).await
    }
}

/// Check the parsed args are an object carrying every required property
/// of the tool's parameter schema.
fn validate_args(spec: &ToolSpec, call: &ToolCall) -> Result<(), String> {
    let Some(args) = call.args.as_object() else {
        return Err(format!(
            "arguments for '{}' must be a JSON object",
            call.name
        ));
    };
    if let Some(required) = spec.parameters.get("required").and_then(|r| r.as_array()) {
        for key in required.iter().filter_map(|k| k.as_str()) {
            if !args.contains_key(key) {
                return Err(format!(
                    "missing required argument '{key}' for tool '{}'",
                    call.name
                ));
            }
        }
    }
    Ok(())
}
