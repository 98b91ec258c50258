//! Collaborators whose behaviour is fixed up front.
//!
//! Used by the test suites and by the CLI's `goal` command, where the plan
//! comes from a JSON file instead of a language model.

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use stepwise_core::{
    ActionExecutor, Outcome, Perception, PermissionScope, PlanDecision, PlanRequest, Planner,
    RecoveryStrategy, Snapshot, Step, StepValidator,
};
use stepwise_core::error::PerceptionError;

use crate::registry::RegistryExecutor;

fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|p| p.into_inner())
}

// ── Planner ─────────────────────────────────────────────────────────────

/// What the planner was asked, for assertions.
#[derive(Debug, Clone, PartialEq)]
pub struct PlanCall {
    pub goal_text: String,
    pub history_len: usize,
    pub broadened: bool,
    pub had_ocr: bool,
}

/// Replays a fixed list of decisions, then reports `done`.
pub struct ScriptedPlanner {
    script: Mutex<VecDeque<PlanDecision>>,
    repeat: Option<Step>,
    calls: Mutex<Vec<PlanCall>>,
}

impl ScriptedPlanner {
    pub fn new(script: impl IntoIterator<Item = PlanDecision>) -> Self {
        Self {
            script: Mutex::new(script.into_iter().collect()),
            repeat: None,
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Propose each step in turn, then finish.
    pub fn from_steps(steps: impl IntoIterator<Item = Step>) -> Self {
        Self::new(steps.into_iter().map(|step| PlanDecision::Next { step }))
    }

    /// Propose the same step forever.
    pub fn repeating(step: Step) -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            repeat: Some(step),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<PlanCall> {
        lock(&self.calls).clone()
    }
}

#[async_trait]
impl Planner for ScriptedPlanner {
    async fn plan(&self, request: PlanRequest<'_>) -> PlanDecision {
        lock(&self.calls).push(PlanCall {
            goal_text: request.goal_text.to_string(),
            history_len: request.history.len(),
            broadened: request.broadened,
            had_ocr: request.snapshot.ocr_text.is_some(),
        });

        // A re-plan after a failed step proposes the same step again.
        if request.broadened {
            if let Some(last) = request.history.last() {
                return PlanDecision::Next { step: last.step() };
            }
        }

        if let Some(decision) = lock(&self.script).pop_front() {
            return decision;
        }
        match &self.repeat {
            Some(step) => PlanDecision::Next { step: step.clone() },
            None => PlanDecision::Done { summary: None },
        }
    }
}

/// Used when no planner is configured: every goal ends as cannot-proceed.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoPlanner;

#[async_trait]
impl Planner for NoPlanner {
    async fn plan(&self, _request: PlanRequest<'_>) -> PlanDecision {
        PlanDecision::CannotProceed {
            reason: "no planner configured".into(),
        }
    }
}

// ── Perception ──────────────────────────────────────────────────────────

/// Returns the same surface every time, optionally failing the first few
/// calls.
pub struct StaticPerception {
    surface: Value,
    ocr_text: Option<String>,
    failures_left: AtomicU32,
    calls: AtomicU32,
}

impl StaticPerception {
    pub fn new(surface: Value) -> Self {
        Self {
            surface,
            ocr_text: None,
            failures_left: AtomicU32::new(0),
            calls: AtomicU32::new(0),
        }
    }

    pub fn with_ocr_text(mut self, text: impl Into<String>) -> Self {
        self.ocr_text = Some(text.into());
        self
    }

    /// Make the next `n` calls fail with `PerceptionUnavailable`.
    pub fn failing_first(self, n: u32) -> Self {
        self.failures_left.store(n, Ordering::SeqCst);
        self
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Default for StaticPerception {
    fn default() -> Self {
        Self::new(serde_json::json!({ "elements": [] }))
    }
}

#[async_trait]
impl Perception for StaticPerception {
    async fn perceive(&self, with_ocr: bool) -> Result<Snapshot, PerceptionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let failed = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failed {
            return Err(PerceptionError::Unavailable("surface not reachable".into()));
        }
        Ok(Snapshot {
            surface: self.surface.clone(),
            ocr_text: if with_ocr { self.ocr_text.clone() } else { None },
            captured_at: Utc::now(),
        })
    }
}

// ── Executor ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailMode {
    Always,
    /// Fail this many times, then succeed.
    Times(u32),
    /// Fail until retried under the given strategy.
    UntilHint(RecoveryStrategy),
}

/// One call to the executor.
#[derive(Debug, Clone, PartialEq)]
pub struct ActionCall {
    pub step: Step,
    pub hint: Option<RecoveryStrategy>,
}

/// Wraps a [`RegistryExecutor`] for validation and effect classes and
/// records every action instead of performing it. Failures are injected per
/// tool.
pub struct ScriptedExecutor {
    inner: RegistryExecutor,
    failures: Mutex<HashMap<String, FailMode>>,
    actions: Mutex<Vec<ActionCall>>,
    lenient: AtomicBool,
}

impl ScriptedExecutor {
    pub fn new(inner: RegistryExecutor) -> Self {
        Self {
            inner,
            failures: Mutex::new(HashMap::new()),
            actions: Mutex::new(Vec::new()),
            lenient: AtomicBool::new(false),
        }
    }

    /// Skip parameter-shape validation (any non-empty tool name is valid).
    pub fn lenient(self) -> Self {
        self.lenient.store(true, Ordering::SeqCst);
        self
    }

    pub fn fail(&self, tool: impl Into<String>, mode: FailMode) {
        lock(&self.failures).insert(tool.into(), mode);
    }

    pub fn actions(&self) -> Vec<ActionCall> {
        lock(&self.actions).clone()
    }

    pub fn tools_called(&self) -> Vec<String> {
        lock(&self.actions).iter().map(|a| a.step.tool.clone()).collect()
    }

    fn perform(&self, step: &Step, hint: Option<RecoveryStrategy>) -> Outcome {
        lock(&self.actions).push(ActionCall {
            step: step.clone(),
            hint,
        });

        let mut failures = lock(&self.failures);
        let fails = match failures.get_mut(&step.tool) {
            None => false,
            Some(FailMode::Always) => true,
            Some(FailMode::Times(0)) => false,
            Some(FailMode::Times(n)) => {
                *n -= 1;
                true
            }
            Some(FailMode::UntilHint(wanted)) => hint != Some(*wanted),
        };
        if fails {
            Outcome::error(format!("element for {} not found", step.tool))
        } else {
            Outcome::Ok
        }
    }
}

impl StepValidator for ScriptedExecutor {
    fn validate(&self, step: &Step) -> Result<(), String> {
        if self.lenient.load(Ordering::SeqCst) {
            return if step.tool.trim().is_empty() {
                Err("empty tool".into())
            } else {
                Ok(())
            };
        }
        self.inner.validate(step)
    }
}

#[async_trait]
impl ActionExecutor for ScriptedExecutor {
    async fn act(&self, step: &Step) -> Outcome {
        self.perform(step, None)
    }

    async fn act_with_hint(&self, step: &Step, strategy: RecoveryStrategy) -> Outcome {
        self.perform(step, Some(strategy))
    }

    fn effect_class(&self, step: &Step) -> PermissionScope {
        self.inner.effect_class(step)
    }
}
