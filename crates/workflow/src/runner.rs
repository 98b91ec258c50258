//! Periodic runner over persisted schedules.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Weak};
use std::time::Duration;
use stepwise_config::{ScheduleConfig, ScheduleTargetConfig};
use stepwise_core::{
    AutonomousTask, Clock, DomainEvent, Error, EventBus, Result, RunnerState, ScheduleTarget,
    ScheduledItem, StateStore,
};
use stepwise_engine::ExecutionEngine;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::cron::CronExpr;

/// An item the tick handed to the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StartedItem {
    pub item_id: String,
    pub session_id: String,
}

/// An item the engine refused to queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TickFailure {
    pub item_id: String,
    pub reason: String,
}

/// What one `tick` did.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TickReport {
    pub started: Vec<StartedItem>,
    /// Due items whose target still has a pending or running session
    pub skipped: Vec<String>,
    pub failed: Vec<TickFailure>,
}

/// Starts due schedules through the execution engine.
///
/// Timer ticks and operator ticks share [`Runner::tick`]; `tick_lock` keeps
/// two of them from evaluating the same item at once.
pub struct Runner {
    engine: Arc<ExecutionEngine>,
    store: Arc<dyn StateStore>,
    clock: Arc<dyn Clock>,
    events: Arc<EventBus>,
    state: Mutex<RunnerState>,
    timer: Mutex<Option<JoinHandle<()>>>,
    tick_lock: Mutex<()>,
}

impl Runner {
    /// Restore the persisted runner state. The timer is never resumed
    /// implicitly; callers decide whether to `start` it.
    pub async fn load(
        engine: Arc<ExecutionEngine>,
        store: Arc<dyn StateStore>,
        clock: Arc<dyn Clock>,
    ) -> Result<Arc<Self>> {
        let mut state = store.load_runner_state().await?.unwrap_or_default();
        state.running = false;
        let events = engine.events().clone();

        Ok(Arc::new(Self {
            engine,
            store,
            clock,
            events,
            state: Mutex::new(state),
            timer: Mutex::new(None),
            tick_lock: Mutex::new(()),
        }))
    }

    pub async fn state(&self) -> RunnerState {
        self.state.lock().await.clone()
    }

    /// Start (or restart with a new interval) the periodic timer. The first
    /// tick fires immediately.
    pub async fn start(self: &Arc<Self>, interval_sec: u64) -> Result<RunnerState> {
        if interval_sec == 0 {
            return Err(Error::Validation("interval_sec must be at least 1".into()));
        }

        let mut timer = self.timer.lock().await;
        if let Some(handle) = timer.take() {
            handle.abort();
        }

        let state = {
            let mut state = self.state.lock().await;
            state.running = true;
            state.interval_sec = interval_sec;
            state.clone()
        };
        self.store.save_runner_state(&state).await?;

        *timer = Some(spawn_timer(Arc::downgrade(self), interval_sec));
        info!(interval_sec, "Runner started");
        Ok(state)
    }

    pub async fn stop(&self) -> Result<RunnerState> {
        if let Some(handle) = self.timer.lock().await.take() {
            handle.abort();
        }
        let state = {
            let mut state = self.state.lock().await;
            state.running = false;
            state.clone()
        };
        self.store.save_runner_state(&state).await?;
        info!("Runner stopped");
        Ok(state)
    }

    /// Queue every due item that has no active session.
    pub async fn tick(&self) -> Result<TickReport> {
        let _guard = self.tick_lock.lock().await;
        let now = self.clock.now();
        let mut report = TickReport::default();

        for mut item in self.store.list_schedules().await? {
            if !item.is_due(now) {
                continue;
            }
            if self.still_active(&item).await? {
                debug!(item = %item.name, "Previous session still active, skipping");
                report.skipped.push(item.id);
                continue;
            }

            match self.enqueue(&item.target).await {
                Ok(session_id) => {
                    info!(item = %item.name, session_id = %session_id, "Scheduled item started");
                    item.active_session = Some(session_id.clone());
                    item.last_run = Some(now);
                    report.started.push(StartedItem {
                        item_id: item.id.clone(),
                        session_id,
                    });
                }
                Err(e) => {
                    warn!(item = %item.name, error = %e, "Scheduled item could not be queued");
                    if item.cron.is_none() {
                        item.enabled = false;
                    }
                    report.failed.push(TickFailure {
                        item_id: item.id.clone(),
                        reason: e.to_string(),
                    });
                }
            }

            item.scheduled_for = next_occurrence(&item, now);
            self.store.put_schedule(&item).await?;
        }

        let state = {
            let mut state = self.state.lock().await;
            state.last_tick = Some(now);
            state.clone()
        };
        self.store.save_runner_state(&state).await?;

        self.events.publish(DomainEvent::RunnerTicked {
            started: report.started.len(),
            skipped: report.skipped.len(),
            timestamp: now,
        });
        Ok(report)
    }

    /// Whether the item's target already has a queued or in-flight session,
    /// whether started by this item, another item, or a caller.
    async fn still_active(&self, item: &ScheduledItem) -> Result<bool> {
        let other = match &item.target {
            ScheduleTarget::Macro { macro_id, .. } => self.engine.active_for_macro(macro_id).await,
            ScheduleTarget::Goal { task } => self.engine.active_for_goal(task).await,
        };
        if let Some(session_id) = other {
            debug!(item = %item.name, session_id = %session_id, "Target already has an active session");
            return Ok(true);
        }

        let Some(id) = &item.active_session else {
            return Ok(false);
        };
        match self.engine.get_session(id).await {
            Ok(session) => Ok(session.status.is_active()),
            // Purged sessions are long finished.
            Err(Error::NotFound { .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn enqueue(&self, target: &ScheduleTarget) -> Result<String> {
        match target {
            ScheduleTarget::Macro {
                macro_id,
                speed,
                loops,
            } => self.engine.execute_macro(macro_id, *speed, *loops).await,
            ScheduleTarget::Goal { task } => self.engine.run_autonomous(task.clone()).await,
        }
    }

    // ── Schedules ───────────────────────────────────────────────────────

    /// Add a one-shot (`at`) or recurring (`cron`) schedule.
    pub async fn add_schedule(
        &self,
        name: &str,
        target: ScheduleTarget,
        at: Option<DateTime<Utc>>,
        cron: Option<&str>,
    ) -> Result<ScheduledItem> {
        if name.trim().is_empty() {
            return Err(Error::Validation("schedule name must not be empty".into()));
        }
        let scheduled_for = match (at, cron) {
            (Some(at), None) => Some(at),
            (None, Some(expr)) => parse_cron(expr)?.next_after(&self.clock.now()),
            _ => {
                return Err(Error::Validation(format!(
                    "schedule '{name}' needs exactly one of 'at' or 'cron'"
                )));
            }
        };

        let item = ScheduledItem {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.to_string(),
            target,
            scheduled_for,
            cron: cron.map(str::to_string),
            enabled: true,
            active_session: None,
            last_run: None,
        };
        self.store.put_schedule(&item).await?;
        info!(item = %item.name, next = ?item.scheduled_for, "Schedule added");
        Ok(item)
    }

    pub async fn list_schedules(&self) -> Result<Vec<ScheduledItem>> {
        Ok(self.store.list_schedules().await?)
    }

    pub async fn remove_schedule(&self, id: &str) -> Result<()> {
        if !self.store.delete_schedule(id).await? {
            return Err(Error::not_found("schedule", id));
        }
        Ok(())
    }

    /// Enable or disable a schedule. Re-enabling a recurring item whose
    /// next occurrence was lost recomputes it from now.
    pub async fn set_enabled(&self, id: &str, enabled: bool) -> Result<ScheduledItem> {
        let mut item = self
            .store
            .list_schedules()
            .await?
            .into_iter()
            .find(|s| s.id == id)
            .ok_or_else(|| Error::not_found("schedule", id))?;

        item.enabled = enabled;
        if enabled && item.scheduled_for.is_none() {
            if let Some(expr) = &item.cron {
                item.scheduled_for = parse_cron(expr)?.next_after(&self.clock.now());
            }
        }
        self.store.put_schedule(&item).await?;
        Ok(item)
    }

    /// Seed schedules declared in the config file. Names already present
    /// in the store are left alone so runtime state survives restarts.
    pub async fn load_from_config(&self, schedules: &[ScheduleConfig]) -> Result<usize> {
        let existing = self.store.list_schedules().await?;
        let mut added = 0;

        for config in schedules {
            if existing.iter().any(|s| s.name == config.name) {
                debug!(item = %config.name, "Schedule already stored");
                continue;
            }
            let mut item = self
                .add_schedule(
                    &config.name,
                    target_from_config(&config.target),
                    config.at,
                    config.cron.as_deref(),
                )
                .await?;
            if !config.enabled {
                item.enabled = false;
                self.store.put_schedule(&item).await?;
            }
            added += 1;
        }
        Ok(added)
    }
}

impl Drop for Runner {
    fn drop(&mut self) {
        if let Some(handle) = self.timer.get_mut().take() {
            handle.abort();
        }
    }
}

fn spawn_timer(runner: Weak<Runner>, interval_sec: u64) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(interval_sec));
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            interval.tick().await;
            let Some(runner) = runner.upgrade() else {
                break;
            };
            match runner.tick().await {
                Ok(report) if !report.started.is_empty() => {
                    debug!(started = report.started.len(), "Timer tick")
                }
                Ok(_) => {}
                Err(e) => warn!(error = %e, "Timer tick failed"),
            }
        }
    })
}

fn parse_cron(expr: &str) -> Result<CronExpr> {
    CronExpr::parse(expr).map_err(|e| Error::Validation(format!("cron '{expr}': {e}")))
}

/// One-shot items fire once; recurring items move to their next match.
fn next_occurrence(item: &ScheduledItem, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let expr = item.cron.as_deref()?;
    match CronExpr::parse(expr) {
        Ok(cron) => cron.next_after(&now),
        Err(e) => {
            warn!(item = %item.name, error = %e, "Stored cron expression no longer parses");
            None
        }
    }
}

fn target_from_config(target: &ScheduleTargetConfig) -> ScheduleTarget {
    match target {
        ScheduleTargetConfig::Macro {
            macro_id,
            speed,
            loops,
        } => ScheduleTarget::Macro {
            macro_id: macro_id.clone(),
            speed: *speed,
            loops: *loops,
        },
        ScheduleTargetConfig::Goal {
            goal,
            domain,
            scope,
            visual_perception,
        } => {
            let mut task =
                AutonomousTask::new(goal.clone(), *scope).with_visual_perception(*visual_perception);
            if let Some(domain) = domain {
                task = task.with_domain(domain.clone());
            }
            ScheduleTarget::Goal { task }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use stepwise_core::{
        ManualClock, PermissionScope, SessionStatus, Step, SystemClock,
    };
    use stepwise_engine::{Collaborators, EngineSettings};
    use stepwise_library::MacroStore;
    use stepwise_storage::{HistoryLog, InMemoryStore};
    use stepwise_tools::{
        RegistryExecutor, ScriptedExecutor, ScriptedPlanner, StaticPerception, default_registry,
    };
    use tokio::sync::broadcast;

    struct Fixture {
        runner: Arc<Runner>,
        engine: Arc<ExecutionEngine>,
        clock: Arc<ManualClock>,
        macros: MacroStore,
        store: Arc<dyn StateStore>,
    }

    fn start_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).unwrap()
    }

    /// Engine whose planner keeps proposing a submit, so a write-scoped goal
    /// parks in awaiting-approval and holds the worker.
    async fn fixture() -> Fixture {
        let store: Arc<dyn StateStore> = Arc::new(InMemoryStore::new());
        let history = Arc::new(HistoryLog::new(store.clone(), Arc::new(SystemClock)));
        let executor = Arc::new(ScriptedExecutor::new(RegistryExecutor::new(default_registry())));
        let engine = Arc::new(ExecutionEngine::start(
            store.clone(),
            history,
            Collaborators {
                executor: executor.clone(),
                perception: Arc::new(StaticPerception::default()),
                planner: Arc::new(ScriptedPlanner::repeating(
                    Step::new("submit").with_param("selector", "#order"),
                )),
            },
            EngineSettings::default().with_base_delay(Duration::ZERO),
            Arc::new(EventBus::default()),
        ));
        let clock = Arc::new(ManualClock::new(start_time()));
        let runner = Runner::load(engine.clone(), store.clone(), clock.clone())
            .await
            .unwrap();
        let macros = MacroStore::new(store.clone(), executor, clock.clone());

        Fixture {
            runner,
            engine,
            clock,
            macros,
            store,
        }
    }

    async fn nightly_macro(f: &Fixture) -> String {
        f.macros
            .create(
                "nightly",
                "",
                vec![Step::new("navigate").with_param("url", "https://example.test")],
            )
            .await
            .unwrap()
            .id
    }

    fn macro_target(id: &str) -> ScheduleTarget {
        ScheduleTarget::Macro {
            macro_id: id.to_string(),
            speed: None,
            loops: None,
        }
    }

    async fn wait_terminal(engine: &ExecutionEngine, id: &str) {
        let session = engine.wait_for(id).await.unwrap();
        assert!(session.status.is_terminal());
    }

    async fn wait_status(
        rx: &mut broadcast::Receiver<Arc<DomainEvent>>,
        id: &str,
        status: SessionStatus,
    ) {
        loop {
            if let DomainEvent::SessionStatusChanged {
                session_id,
                status: s,
                ..
            } = &*rx.recv().await.unwrap()
            {
                if session_id == id && *s == status {
                    return;
                }
            }
        }
    }

    #[tokio::test]
    async fn one_shot_fires_once() {
        let f = fixture().await;
        let id = nightly_macro(&f).await;
        let item = f
            .runner
            .add_schedule("once", macro_target(&id), Some(start_time()), None)
            .await
            .unwrap();

        let report = f.runner.tick().await.unwrap();
        assert_eq!(report.started.len(), 1);
        assert_eq!(report.started[0].item_id, item.id);
        wait_terminal(&f.engine, &report.started[0].session_id).await;

        let stored = &f.runner.list_schedules().await.unwrap()[0];
        assert_eq!(stored.scheduled_for, None);
        assert_eq!(stored.last_run, Some(start_time()));
        assert_eq!(
            stored.active_session.as_deref(),
            Some(report.started[0].session_id.as_str())
        );

        f.clock.advance(chrono::Duration::hours(1));
        assert_eq!(f.runner.tick().await.unwrap(), TickReport::default());
    }

    #[tokio::test]
    async fn future_items_wait() {
        let f = fixture().await;
        let id = nightly_macro(&f).await;
        let later = start_time() + chrono::Duration::minutes(5);
        f.runner
            .add_schedule("later", macro_target(&id), Some(later), None)
            .await
            .unwrap();

        assert!(f.runner.tick().await.unwrap().started.is_empty());
        f.clock.set(later);
        assert_eq!(f.runner.tick().await.unwrap().started.len(), 1);
    }

    #[tokio::test]
    async fn due_item_with_active_session_is_skipped() {
        let f = fixture().await;
        let mut rx = f.engine.events().subscribe();

        // Occupy the worker with a session parked on approval.
        let blocker = f
            .engine
            .run_autonomous(AutonomousTask::new("place order", PermissionScope::Write))
            .await
            .unwrap();
        wait_status(&mut rx, &blocker, SessionStatus::AwaitingApproval).await;

        let id = nightly_macro(&f).await;
        let item = f
            .runner
            .add_schedule("every minute", macro_target(&id), None, Some("* * * * *"))
            .await
            .unwrap();
        assert_eq!(
            item.scheduled_for,
            Some(start_time() + chrono::Duration::minutes(1))
        );

        f.clock.advance(chrono::Duration::minutes(1));
        let first = f.runner.tick().await.unwrap();
        assert_eq!(first.started.len(), 1);
        let queued = first.started[0].session_id.clone();
        assert_eq!(
            f.engine.get_session(&queued).await.unwrap().status,
            SessionStatus::Pending
        );

        // Due again, but its session has not run yet.
        f.clock.advance(chrono::Duration::minutes(1));
        let second = f.runner.tick().await.unwrap();
        assert!(second.started.is_empty());
        assert_eq!(second.skipped, vec![item.id.clone()]);

        f.engine.cancel(&blocker).await.unwrap();
        wait_terminal(&f.engine, &queued).await;

        let third = f.runner.tick().await.unwrap();
        assert_eq!(third.started.len(), 1);
        assert_ne!(third.started[0].session_id, queued);
        wait_terminal(&f.engine, &third.started[0].session_id).await;
    }

    #[tokio::test]
    async fn macro_already_running_elsewhere_is_skipped() {
        let f = fixture().await;
        let mut rx = f.engine.events().subscribe();
        let blocker = f
            .engine
            .run_autonomous(AutonomousTask::new("place order", PermissionScope::Write))
            .await
            .unwrap();
        wait_status(&mut rx, &blocker, SessionStatus::AwaitingApproval).await;

        // A caller queued the macro by hand before the schedule came due.
        let id = nightly_macro(&f).await;
        let manual = f.engine.execute_macro(&id, None, None).await.unwrap();
        let item = f
            .runner
            .add_schedule("once", macro_target(&id), Some(start_time()), None)
            .await
            .unwrap();

        let report = f.runner.tick().await.unwrap();
        assert!(report.started.is_empty());
        assert_eq!(report.skipped, vec![item.id.clone()]);
        let stored = &f.runner.list_schedules().await.unwrap()[0];
        assert_eq!(stored.scheduled_for, Some(start_time()));
        assert_eq!(stored.active_session, None);

        // A goal schedule for the task holding the worker is skipped too.
        let goal = f
            .runner
            .add_schedule(
                "order again",
                ScheduleTarget::Goal {
                    task: AutonomousTask::new("place order", PermissionScope::Write),
                },
                Some(start_time()),
                None,
            )
            .await
            .unwrap();
        let report = f.runner.tick().await.unwrap();
        assert!(report.started.is_empty());
        assert!(report.skipped.contains(&goal.id));
        f.runner.remove_schedule(&goal.id).await.unwrap();

        f.engine.cancel(&blocker).await.unwrap();
        wait_terminal(&f.engine, &manual).await;

        let report = f.runner.tick().await.unwrap();
        assert_eq!(report.started.len(), 1);
        assert_ne!(report.started[0].session_id, manual);
        wait_terminal(&f.engine, &report.started[0].session_id).await;
    }

    #[tokio::test]
    async fn cron_item_moves_to_next_occurrence() {
        let f = fixture().await;
        let id = nightly_macro(&f).await;
        f.runner
            .add_schedule("quarterly", macro_target(&id), None, Some("*/15 * * * *"))
            .await
            .unwrap();

        f.clock.set(start_time() + chrono::Duration::minutes(20));
        let report = f.runner.tick().await.unwrap();
        assert_eq!(report.started.len(), 1);
        wait_terminal(&f.engine, &report.started[0].session_id).await;

        let stored = &f.runner.list_schedules().await.unwrap()[0];
        assert_eq!(
            stored.scheduled_for,
            Some(start_time() + chrono::Duration::minutes(30))
        );
        assert!(stored.enabled);
    }

    #[tokio::test]
    async fn unqueueable_one_shot_is_disabled() {
        let f = fixture().await;
        let item = f
            .runner
            .add_schedule("ghost", macro_target("missing"), Some(start_time()), None)
            .await
            .unwrap();

        let report = f.runner.tick().await.unwrap();
        assert!(report.started.is_empty());
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].item_id, item.id);
        assert!(report.failed[0].reason.contains("missing"));

        let stored = &f.runner.list_schedules().await.unwrap()[0];
        assert!(!stored.enabled);
        assert_eq!(stored.scheduled_for, None);
    }

    #[tokio::test]
    async fn tick_records_last_tick_and_publishes() {
        let f = fixture().await;
        let mut rx = f.engine.events().subscribe();

        f.runner.tick().await.unwrap();
        assert_eq!(f.runner.state().await.last_tick, Some(start_time()));
        let persisted = f.store.load_runner_state().await.unwrap().unwrap();
        assert_eq!(persisted.last_tick, Some(start_time()));

        let event = rx.recv().await.unwrap();
        assert!(matches!(
            &*event,
            DomainEvent::RunnerTicked { started: 0, skipped: 0, .. }
        ));
    }

    #[tokio::test]
    async fn schedule_validation() {
        let f = fixture().await;
        let target = macro_target("m");
        let err = f
            .runner
            .add_schedule("both", target.clone(), Some(start_time()), Some("* * * * *"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
        assert!(f
            .runner
            .add_schedule("neither", target.clone(), None, None)
            .await
            .is_err());
        assert!(f
            .runner
            .add_schedule("bad", target.clone(), None, Some("61 * * * *"))
            .await
            .is_err());
        assert!(f.runner.add_schedule(" ", target, Some(start_time()), None).await.is_err());
        assert!(matches!(
            f.runner.remove_schedule("nope").await,
            Err(Error::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn disabled_items_are_not_due() {
        let f = fixture().await;
        let id = nightly_macro(&f).await;
        let item = f
            .runner
            .add_schedule("paused", macro_target(&id), Some(start_time()), None)
            .await
            .unwrap();
        f.runner.set_enabled(&item.id, false).await.unwrap();
        assert!(f.runner.tick().await.unwrap().started.is_empty());

        f.runner.set_enabled(&item.id, true).await.unwrap();
        let report = f.runner.tick().await.unwrap();
        assert_eq!(report.started.len(), 1);
        wait_terminal(&f.engine, &report.started[0].session_id).await;
    }

    #[tokio::test]
    async fn config_schedules_are_seeded_once() {
        let f = fixture().await;
        let schedules = vec![
            ScheduleConfig {
                name: "nightly".into(),
                at: None,
                cron: Some("0 2 * * *".into()),
                target: ScheduleTargetConfig::Macro {
                    macro_id: "m1".into(),
                    speed: Some(2.0),
                    loops: None,
                },
                enabled: true,
            },
            ScheduleConfig {
                name: "weekly report".into(),
                at: Some(start_time()),
                cron: None,
                target: ScheduleTargetConfig::Goal {
                    goal: "download the weekly report".into(),
                    domain: Some("reports.example.test".into()),
                    scope: PermissionScope::Read,
                    visual_perception: true,
                },
                enabled: false,
            },
        ];

        assert_eq!(f.runner.load_from_config(&schedules).await.unwrap(), 2);
        assert_eq!(f.runner.load_from_config(&schedules).await.unwrap(), 0);

        let stored = f.runner.list_schedules().await.unwrap();
        assert_eq!(stored.len(), 2);
        let report = stored.iter().find(|s| s.name == "weekly report").unwrap();
        assert!(!report.enabled);
        match &report.target {
            ScheduleTarget::Goal { task } => {
                assert_eq!(task.domain.as_deref(), Some("reports.example.test"));
                assert!(task.visual_perception);
                assert!(!task.confirmation_required);
            }
            other => panic!("unexpected target {other:?}"),
        }
        let nightly = stored.iter().find(|s| s.name == "nightly").unwrap();
        assert_eq!(
            nightly.scheduled_for,
            Some(Utc.with_ymd_and_hms(2026, 3, 3, 2, 0, 0).unwrap())
        );
    }

    #[tokio::test(start_paused = true)]
    async fn timer_ticks_until_stopped() {
        let f = fixture().await;
        let mut rx = f.engine.events().subscribe();

        let state = f.runner.start(60).await.unwrap();
        assert!(state.running);
        assert_eq!(state.interval_sec, 60);
        assert!(f.store.load_runner_state().await.unwrap().unwrap().running);

        tokio::time::sleep(Duration::from_secs(61)).await;
        let mut ticks = 0;
        while let Ok(event) = rx.try_recv() {
            if matches!(&*event, DomainEvent::RunnerTicked { .. }) {
                ticks += 1;
            }
        }
        assert_eq!(ticks, 2);

        assert!(!f.runner.stop().await.unwrap().running);
        tokio::time::sleep(Duration::from_secs(300)).await;
        assert!(rx.try_recv().is_err());

        assert!(matches!(f.runner.start(0).await, Err(Error::Validation(_))));
    }

    #[tokio::test]
    async fn load_never_resumes_the_timer() {
        let f = fixture().await;
        f.store
            .save_runner_state(&RunnerState {
                running: true,
                interval_sec: 30,
                last_tick: None,
            })
            .await
            .unwrap();

        let runner = Runner::load(f.engine.clone(), f.store.clone(), f.clock.clone())
            .await
            .unwrap();
        let state = runner.state().await;
        assert!(!state.running);
        assert_eq!(state.interval_sec, 30);
    }
}
