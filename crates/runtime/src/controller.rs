//! Per-run counter and budget state.
//!
//! Converges turn/step counting, the step and wall-time budgets,
//! cancellation, and the repeated-denial loop guard into one object so
//! the loop body stays legible.

use std::collections::HashMap;
use std::time::Instant;

use relay_domain::cancel::CancelToken;

pub struct LoopController {
    max_steps: u32,
    max_wall_time_sec: Option<u64>,
    started: Instant,
    cancel: CancelToken,
    pub denied_approvals_by_key: HashMap<String, u32>,
    turn: u32,
    step: u32,
    steps_executed: u32,
}

impl LoopController {
    pub fn new(max_steps: u32, max_wall_time_sec: Option<u64>, cancel: CancelToken) -> Self {
        Self {
            max_steps,
            max_wall_time_sec,
            started: Instant::now(),
            cancel,
            denied_approvals_by_key: HashMap::new(),
            turn: 0,
            step: 0,
            steps_executed: 0,
        }
    }

    /// Advance the turn counter; ids look like `turn_1`.
    pub fn next_turn_id(&mut self) -> String {
        self.turn += 1;
        format!("turn_{}", self.turn)
    }

    /// Advance the step counter; ids look like `step_1`.
    pub fn next_step_id(&mut self) -> String {
        self.step += 1;
        format!("step_{}", self.step)
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn wall_time_exceeded(&self) -> bool {
        match self.max_wall_time_sec {
            None => false,
            Some(limit) => self.started.elapsed().as_secs_f64() > limit as f64,
        }
    }

    /// Consume one unit of the step budget.
    ///
    /// Called only when a tool call actually begins executing; policy
    /// and approval denials never consume budget. Returns false (without
    /// consuming) when the budget is exhausted.
    pub fn try_consume_tool_step(&mut self) -> bool {
        if self.steps_executed >= self.max_steps {
            return false;
        }
        self.steps_executed += 1;
        true
    }

    pub fn steps_executed(&self) -> u32 {
        self.steps_executed
    }

    /// Raise the budgets after an approved increase.
    pub fn increase_budget(&mut self, extra_steps: u32, extra_wall_time_sec: u64) {
        self.max_steps += extra_steps;
        if let Some(limit) = self.max_wall_time_sec.as_mut() {
            *limit += extra_wall_time_sec;
        }
    }

    /// Record a denial and return the cumulative count for the key.
    pub fn record_denied_approval(&mut self, approval_key: &str) -> u32 {
        let count = self
            .denied_approvals_by_key
            .entry(approval_key.to_owned())
            .or_insert(0);
        *count += 1;
        *count
    }

    /// Loop guard: the second denial for the same key aborts the run.
    pub fn should_abort_due_to_repeated_denial(&self, approval_key: &str) -> bool {
        self.denied_approvals_by_key
            .get(approval_key)
            .map(|c| *c >= 2)
            .unwrap_or(false)
    }
}
