//! Agent runtime: the turn/step state machine that drives LLM calls and
//! tool dispatch under safety, approval, concurrency, and budget
//! controls, producing a complete append-only event log sufficient to
//! resume or fork the run.

pub mod agent;
pub mod controller;
pub mod paths;
pub mod prompts;
pub mod recovery;
pub mod resume;
pub mod run_context;
pub mod skills;
mod turn;

pub use agent::{Agent, AgentBuilder, RunOptions};
pub use controller::LoopController;
pub use run_context::RunContext;
pub use skills::{ensure_skill_env_vars, SkillEnvOutcome};

pub use relay_domain::cancel::CancelToken;
pub use relay_domain::config::AgentConfig;
pub use relay_domain::run::{RunError, RunErrorKind, RunResult, RunStatus};
