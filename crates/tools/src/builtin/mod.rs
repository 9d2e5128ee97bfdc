//! Builtin tool set.
//!
//! Handlers honor the execution context's limits (workspace root, byte
//! caps, timeouts, cancellation) and report failures through the result
//! envelope.

use std::sync::Arc;

use crate::registry::ToolRegistry;

pub mod ask_human;
pub mod file_read;
pub mod file_write;
pub mod list_dir;
pub mod shell_exec;
pub mod update_plan;

/// Names of the builtin tools; anything else a run can call was
/// registered by the integrator and is policy-category `custom`.
pub const BUILTIN_TOOL_NAMES: &[&str] = &[
    "file_read",
    "file_write",
    "list_dir",
    "shell_exec",
    "update_plan",
    "ask_human",
];

/// Install the builtin tools into a registry.
pub fn register_builtin_tools(registry: &ToolRegistry) -> Result<(), String> {
    registry.register(file_read::spec(), Arc::new(file_read::FileReadTool), false)?;
    registry.register(file_write::spec(), Arc::new(file_write::FileWriteTool), false)?;
    registry.register(list_dir::spec(), Arc::new(list_dir::ListDirTool), false)?;
    registry.register(shell_exec::spec(), Arc::new(shell_exec::ShellExecTool), false)?;
    registry.register(
        update_plan::spec(),
        Arc::new(update_plan::UpdatePlanTool),
        false,
    )?;
    registry.register(ask_human::spec(), Arc::new(ask_human::AskHumanTool), false)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_carries_every_builtin() {
        let registry = ToolRegistry::new();
        register_builtin_tools(&registry).unwrap();
        for name in BUILTIN_TOOL_NAMES {
            assert!(registry.is_registered(name), "{name} missing");
            assert!(!registry.is_custom_tool(name), "{name} must not be custom");
        }
        assert_eq!(registry.list_specs().len(), BUILTIN_TOOL_NAMES.len());
    }
}
