use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use stepwise_config::AppConfig;
use stepwise_core::{
    AutonomousTask, DomainEvent, Error, EventBus, ExecutionSession, HistoryEntry, Macro,
    MacroPatch, MacroSettings, Outcome, Pattern, PermissionScope, Result, RunnerState,
    ScheduleTarget, ScheduledItem, StateStore, Step,
};
use stepwise_engine::ExecutionEngine;
use stepwise_library::{MacroStore, MiningOptions, Observed, Recorder, StopOutcome, mine};
use stepwise_storage::{HistoryLog, HistoryScan};
use stepwise_workflow::{Runner, TickReport};
use tokio::sync::broadcast;
use tracing::info;

use crate::builder::ApiBuilder;

/// A point-in-time overview for status displays.
#[derive(Debug, Clone, Serialize)]
pub struct ApiStatus {
    pub store: String,
    pub macros: usize,
    pub recording: bool,
    pub busy: bool,
    pub queue_depth: usize,
    pub runner: RunnerState,
    pub schedules: usize,
}

/// Every operation a UI or orchestrator performs goes through here.
pub struct AutomationApi {
    pub(crate) config: AppConfig,
    pub(crate) store: Arc<dyn StateStore>,
    pub(crate) history: Arc<HistoryLog>,
    pub(crate) macros: Arc<MacroStore>,
    pub(crate) recorder: Recorder,
    pub(crate) engine: Arc<ExecutionEngine>,
    pub(crate) runner: Arc<Runner>,
    pub(crate) events: Arc<EventBus>,
    pub(crate) mining: MiningOptions,
}

impl AutomationApi {
    pub fn builder(config: AppConfig) -> ApiBuilder {
        ApiBuilder::new(config)
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Subscribe to domain events (session progress, recording, ticks).
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<DomainEvent>> {
        self.events.subscribe()
    }

    pub async fn status(&self) -> Result<ApiStatus> {
        Ok(ApiStatus {
            store: self.store.name().to_string(),
            macros: self.macros.list().await?.len(),
            recording: self.recorder.is_recording().await,
            busy: self.engine.is_busy().await,
            queue_depth: self.engine.queue_depth(),
            runner: self.runner.state().await,
            schedules: self.runner.list_schedules().await?.len(),
        })
    }

    // ── Macros ──────────────────────────────────────────────────────────

    pub async fn list_macros(&self) -> Result<Vec<Macro>> {
        self.macros.list().await
    }

    pub async fn get_macro(&self, id: &str) -> Result<Macro> {
        self.macros.get(id).await
    }

    /// Create an active macro with its replay settings.
    pub async fn create_macro(
        &self,
        name: &str,
        description: &str,
        steps: Vec<Step>,
        settings: MacroSettings,
    ) -> Result<Macro> {
        self.macros
            .create_with_settings(name, description, steps, settings)
            .await
    }

    pub async fn update_macro(&self, id: &str, patch: MacroPatch) -> Result<Macro> {
        self.macros.update(id, patch).await
    }

    pub async fn delete_macro(&self, id: &str) -> Result<()> {
        self.macros.delete(id).await
    }

    pub async fn reorder_step(&self, id: &str, from: usize, to: usize) -> Result<Macro> {
        self.macros.reorder(id, from, to).await
    }

    pub async fn insert_step(&self, id: &str, index: usize, step: Step) -> Result<Macro> {
        self.macros.insert_step(id, index, step).await
    }

    pub async fn replace_step(&self, id: &str, index: usize, step: Step) -> Result<Macro> {
        self.macros.replace_step(id, index, step).await
    }

    pub async fn delete_step(&self, id: &str, index: usize) -> Result<Macro> {
        self.macros.delete_step(id, index).await
    }

    // ── Recording and history ───────────────────────────────────────────

    pub async fn start_recording(&self) -> Result<()> {
        self.recorder.start().await
    }

    /// Report an action the operator performed by hand. It always lands in
    /// history and is captured when a recording is running.
    pub async fn record_action(&self, step: Step, outcome: Outcome) -> Result<Observed> {
        self.recorder.observe(step, outcome).await
    }

    pub async fn stop_recording(&self, name: &str, description: &str) -> Result<StopOutcome> {
        self.recorder.stop(name, description).await
    }

    /// Discard the recording; returns how many steps were dropped.
    pub async fn cancel_recording(&self) -> Result<usize> {
        self.recorder.cancel().await
    }

    pub async fn recent_history(&self, n: usize) -> Result<Vec<HistoryEntry>> {
        Ok(self.history.recent(n).await?.to_vec())
    }

    pub async fn history_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<HistoryEntry>> {
        Ok(self.history.between(from, to).await?.to_vec())
    }

    /// Page through a possibly large time range without loading it whole.
    pub fn scan_history(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        page_size: usize,
    ) -> HistoryScan {
        self.history.scan(from, to, page_size)
    }

    // ── Mining ──────────────────────────────────────────────────────────

    /// Mine the most recent `window` history entries (the configured window
    /// when `None`) with the configured thresholds.
    pub async fn mine_patterns(&self, window: Option<usize>) -> Result<Vec<Pattern>> {
        self.mine_with(window, self.mining).await
    }

    pub async fn mine_with(
        &self,
        window: Option<usize>,
        options: MiningOptions,
    ) -> Result<Vec<Pattern>> {
        let window = window.unwrap_or(self.config.mining.window);
        if window == 0 {
            return Err(Error::Validation("mining window must be at least 1".into()));
        }
        let entries = self.history.recent(window).await?;
        let patterns = mine(&entries, &options)?;
        info!(window = entries.len(), found = patterns.len(), "Mined history");
        Ok(patterns)
    }

    /// Turn a mined pattern into a draft macro.
    pub async fn promote_pattern(&self, pattern: &Pattern, name: &str) -> Result<Macro> {
        self.macros.promote(pattern, name).await
    }

    // ── Execution ───────────────────────────────────────────────────────

    pub async fn execute_macro(
        &self,
        id: &str,
        speed: Option<f64>,
        loops: Option<u32>,
    ) -> Result<String> {
        self.engine.execute_macro(id, speed, loops).await
    }

    pub async fn run_autonomous(
        &self,
        goal_text: &str,
        domain: Option<&str>,
        scope: PermissionScope,
        visual_perception: bool,
    ) -> Result<String> {
        let mut task = AutonomousTask::new(goal_text, scope).with_visual_perception(visual_perception);
        if let Some(domain) = domain {
            task = task.with_domain(domain);
        }
        self.engine.run_autonomous(task).await
    }

    /// Queue a fully specified task, e.g. one with an explicit
    /// `confirmation_required` override.
    pub async fn run_task(&self, task: AutonomousTask) -> Result<String> {
        self.engine.run_autonomous(task).await
    }

    pub async fn approve(&self, session_id: &str) -> Result<()> {
        self.engine.approve(session_id).await
    }

    pub async fn cancel(&self, session_id: &str) -> Result<()> {
        self.engine.cancel(session_id).await
    }

    pub async fn get_session(&self, session_id: &str) -> Result<ExecutionSession> {
        self.engine.get_session(session_id).await
    }

    pub async fn list_sessions(&self) -> Result<Vec<ExecutionSession>> {
        self.engine.list_sessions().await
    }

    /// Remove finished sessions that ended before `before`.
    pub async fn purge_sessions(&self, before: DateTime<Utc>) -> Result<usize> {
        self.engine.purge_sessions(before).await
    }

    /// Resolve once the session reaches a terminal status.
    pub async fn wait_for_session(&self, session_id: &str) -> Result<ExecutionSession> {
        self.engine.wait_for(session_id).await
    }

    // ── Runner ──────────────────────────────────────────────────────────

    pub async fn start_runner(&self, interval_sec: u64) -> Result<RunnerState> {
        self.runner.start(interval_sec).await
    }

    pub async fn stop_runner(&self) -> Result<RunnerState> {
        self.runner.stop().await
    }

    pub async fn runner_state(&self) -> RunnerState {
        self.runner.state().await
    }

    pub async fn tick(&self) -> Result<TickReport> {
        self.runner.tick().await
    }

    pub async fn add_schedule(
        &self,
        name: &str,
        target: ScheduleTarget,
        at: Option<DateTime<Utc>>,
        cron: Option<&str>,
    ) -> Result<ScheduledItem> {
        self.runner.add_schedule(name, target, at, cron).await
    }

    pub async fn list_schedules(&self) -> Result<Vec<ScheduledItem>> {
        self.runner.list_schedules().await
    }

    pub async fn remove_schedule(&self, id: &str) -> Result<()> {
        self.runner.remove_schedule(id).await
    }

    pub async fn set_schedule_enabled(&self, id: &str, enabled: bool) -> Result<ScheduledItem> {
        self.runner.set_enabled(id, enabled).await
    }
}
