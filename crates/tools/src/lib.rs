//! Tool registry, dispatcher, execution context, and builtin tools.

pub mod builtin;
pub mod context;
pub mod dispatcher;
pub mod registry;

pub use context::{HumanIoProvider, SandboxAdapter, ToolExecutionContext};
pub use dispatcher::ToolDispatcher;
pub use registry::{ToolHandler, ToolRegistry};
