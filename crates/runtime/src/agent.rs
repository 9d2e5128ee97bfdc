//! The public agent surface: builder, run, and the streaming run API.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use relay_domain::cancel::CancelToken;
use relay_domain::config::AgentConfig;
use relay_domain::error::{Error, Result};
use relay_domain::event::AgentEvent;
use relay_domain::message::Message;
use relay_domain::run::RunResult;
use relay_domain::skill::SkillResolver;
use relay_domain::tool::ToolSpec;
use relay_llm::ChatBackend;
use relay_safety::ApprovalProvider;
use relay_tools::builtin::register_builtin_tools;
use relay_tools::{HumanIoProvider, SandboxAdapter, ToolHandler, ToolRegistry};
use relay_wal::{EventHook, WalBackend};

use crate::turn;

/// Per-run options.
#[derive(Default)]
pub struct RunOptions {
    /// Reuse an existing run id to resume its WAL; `None` mints a fresh
    /// UUID.
    pub run_id: Option<String>,
    /// Explicit starting history; wins over any resume reconstruction.
    pub initial_history: Option<Vec<Message>>,
}

pub(crate) struct AgentInner {
    pub model: String,
    pub backend: Arc<dyn ChatBackend>,
    pub workspace_root: PathBuf,
    pub config: AgentConfig,
    pub registry: Arc<ToolRegistry>,
    pub approval_provider: Option<Arc<dyn ApprovalProvider>>,
    pub human_io: Option<Arc<dyn HumanIoProvider>>,
    pub skills: Option<Arc<dyn SkillResolver>>,
    pub sandbox_adapter: Option<Arc<dyn SandboxAdapter>>,
    pub wal_override: Option<Arc<dyn WalBackend>>,
    pub hooks: Vec<EventHook>,
    pub redaction_values: Vec<String>,
    pub system_prompt: String,
    pub cancel: CancelToken,
    pub env_store: Arc<Mutex<HashMap<String, String>>>,
}

/// Orchestrates multi-turn conversations between an LLM backend and the
/// registered tools, under the configured safety and budget controls.
#[derive(Clone)]
pub struct Agent {
    inner: Arc<AgentInner>,
}

const DEFAULT_SYSTEM_PROMPT: &str = "You are a capable software agent. Use the available tools \
to complete the task, then reply with a final answer. Keep tool usage focused and minimal.";

pub struct AgentBuilder {
    model: String,
    backend: Arc<dyn ChatBackend>,
    workspace_root: Option<PathBuf>,
    config: AgentConfig,
    approval_provider: Option<Arc<dyn ApprovalProvider>>,
    human_io: Option<Arc<dyn HumanIoProvider>>,
    skills: Option<Arc<dyn SkillResolver>>,
    sandbox_adapter: Option<Arc<dyn SandboxAdapter>>,
    wal: Option<Arc<dyn WalBackend>>,
    hooks: Vec<EventHook>,
    redaction_values: Vec<String>,
    system_prompt: String,
    cancel: CancelToken,
    custom_tools: Vec<(ToolSpec, Arc<dyn ToolHandler>)>,
    env: HashMap<String, String>,
}

impl AgentBuilder {
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn workspace_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.workspace_root = Some(root.into());
        self
    }

    pub fn config(mut self, config: AgentConfig) -> Self {
        self.config = config;
        self
    }

    pub fn approval_provider(mut self, provider: Arc<dyn ApprovalProvider>) -> Self {
        self.approval_provider = Some(provider);
        self
    }

    pub fn human_io(mut self, provider: Arc<dyn HumanIoProvider>) -> Self {
        self.human_io = Some(provider);
        self
    }

    pub fn skills(mut self, resolver: Arc<dyn SkillResolver>) -> Self {
        self.skills = Some(resolver);
        self
    }

    pub fn sandbox_adapter(mut self, adapter: Arc<dyn SandboxAdapter>) -> Self {
        self.sandbox_adapter = Some(adapter);
        self
    }

    /// Use a caller-supplied WAL backend instead of the filesystem JSONL
    /// convention.
    pub fn wal(mut self, wal: Arc<dyn WalBackend>) -> Self {
        self.wal = Some(wal);
        self
    }

    /// Observability hook invoked after each WAL append. Failures are
    /// logged and never abort the run.
    pub fn hook(mut self, hook: EventHook) -> Self {
        self.hooks.push(hook);
        self
    }

    /// A secret value to scrub from every event payload and tool output.
    pub fn redaction_value(mut self, value: impl Into<String>) -> Self {
        self.redaction_values.push(value.into());
        self
    }

    pub fn system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    pub fn cancel_token(mut self, token: CancelToken) -> Self {
        self.cancel = token;
        self
    }

    /// Register a custom tool (policy category `custom`).
    pub fn tool(mut self, spec: ToolSpec, handler: Arc<dyn ToolHandler>) -> Self {
        self.custom_tools.push((spec, handler));
        self
    }

    /// Run-scoped environment entry visible to tools via `merged_env`.
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn build(self) -> Result<Agent> {
        if self.model.trim().is_empty() {
            return Err(Error::Config("model must be non-empty".into()));
        }
        let workspace_root = self
            .workspace_root
            .ok_or_else(|| Error::Config("workspace_root is required".into()))?;
        if !workspace_root.is_dir() {
            return Err(Error::Config(format!(
                "workspace_root is not a directory: {}",
                workspace_root.display()
            )));
        }

        let registry = Arc::new(ToolRegistry::new());
        register_builtin_tools(&registry).map_err(Error::Config)?;
        for (spec, handler) in self.custom_tools {
            registry
                .register_custom(spec, handler, false)
                .map_err(Error::Config)?;
        }

        Ok(Agent {
            inner: Arc::new(AgentInner {
                model: self.model,
                backend: self.backend,
                workspace_root,
                config: self.config,
                registry,
                approval_provider: self.approval_provider,
                human_io: self.human_io,
                skills: self.skills,
                sandbox_adapter: self.sandbox_adapter,
                wal_override: self.wal,
                hooks: self.hooks,
                redaction_values: self.redaction_values,
                system_prompt: self.system_prompt,
                cancel: self.cancel,
                env_store: Arc::new(Mutex::new(self.env)),
            }),
        })
    }
}

impl Agent {
    pub fn builder(backend: Arc<dyn ChatBackend>) -> AgentBuilder {
        AgentBuilder {
            model: String::new(),
            backend,
            workspace_root: None,
            config: AgentConfig::default(),
            approval_provider: None,
            human_io: None,
            skills: None,
            sandbox_adapter: None,
            wal: None,
            hooks: Vec::new(),
            redaction_values: Vec::new(),
            system_prompt: DEFAULT_SYSTEM_PROMPT.into(),
            cancel: CancelToken::new(),
            custom_tools: Vec::new(),
            env: HashMap::new(),
        }
    }

    /// Token that cancels the next suspension point of any run on this
    /// agent.
    pub fn cancel_token(&self) -> CancelToken {
        self.inner.cancel.clone()
    }

    /// Drive a task to its terminal event and return the summary.
    pub async fn run(&self, task: impl Into<String>) -> RunResult {
        self.run_with(task, RunOptions::default()).await
    }

    pub async fn run_with(&self, task: impl Into<String>, opts: RunOptions) -> RunResult {
        let (run_id, mut rx, handle) = self.run_stream(task, opts);
        // Drain the stream; callers wanting live events use run_stream.
        while rx.recv().await.is_some() {}
        match handle.await {
            Ok(result) => result,
            Err(e) => turn::degenerate_failure(&run_id, format!("run task panicked: {e}")),
        }
    }

    /// Start a run and return `(run_id, event stream, join handle)`.
    ///
    /// Events arrive in WAL order as they are emitted; the handle
    /// resolves to the terminal [`RunResult`].
    pub fn run_stream(
        &self,
        task: impl Into<String>,
        opts: RunOptions,
    ) -> (
        String,
        mpsc::UnboundedReceiver<AgentEvent>,
        JoinHandle<RunResult>,
    ) {
        let task = task.into();
        let run_id = opts
            .run_id
            .clone()
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        let (tx, rx) = mpsc::unbounded_channel();

        let inner = Arc::clone(&self.inner);
        let loop_run_id = run_id.clone();
        let handle = tokio::spawn(async move {
            turn::run_loop(inner, task, loop_run_id, opts.initial_history, tx).await
        });

        (run_id, rx, handle)
    }
}
