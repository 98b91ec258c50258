//! Session registry, FIFO queue, and the single worker.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use stepwise_core::{
    ActionExecutor, AutonomousTask, Clock, DomainEvent, Error, EventBus, ExecutionError,
    ExecutionSession, LogLevel, Perception, Planner, Result, SessionFailure, SessionStatus,
    SessionTarget, StateStore,
};
use stepwise_core::error::StorageError;
use stepwise_storage::HistoryLog;
use tokio::sync::{RwLock, broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::control::Control;
use crate::settings::EngineSettings;
use crate::summary;

/// The injected collaborators every run uses.
#[derive(Clone)]
pub struct Collaborators {
    pub executor: Arc<dyn ActionExecutor>,
    pub perception: Arc<dyn Perception>,
    pub planner: Arc<dyn Planner>,
}

/// How a run ended, before it is written onto the session.
#[derive(Debug)]
pub(crate) enum Ending {
    Succeeded,
    Failed(SessionFailure),
    Cancelled,
}

impl Ending {
    pub fn failed(error: ExecutionError, session: &ExecutionSession) -> Self {
        Ending::Failed(SessionFailure {
            error,
            step_index: Some(session.current_step_index),
            loop_index: session.loop_index,
            trail: Vec::new(),
        })
    }
}

/// State shared by the handle and the worker.
pub(crate) struct Inner {
    pub store: Arc<dyn StateStore>,
    pub history: Arc<HistoryLog>,
    pub collaborators: Collaborators,
    pub events: Arc<EventBus>,
    pub settings: EngineSettings,
    /// Sessions that have not been finalized yet
    live: RwLock<HashMap<String, ExecutionSession>>,
    controls: RwLock<HashMap<String, Arc<Control>>>,
    queued: AtomicUsize,
}

impl Inner {
    pub fn now(&self) -> DateTime<Utc> {
        self.history.clock().now()
    }

    /// Publish the session's current state to readers and the store.
    pub async fn commit(&self, session: &ExecutionSession) -> std::result::Result<(), StorageError> {
        let previous = {
            let mut live = self.live.write().await;
            live.insert(session.id.clone(), session.clone())
                .map(|s| s.status)
        };
        if previous != Some(session.status) {
            self.events.publish(DomainEvent::SessionStatusChanged {
                session_id: session.id.clone(),
                status: session.status,
                timestamp: self.now(),
            });
        }
        self.store.put_session(session).await
    }

    /// Move to `status`, logging the transition.
    pub async fn transition(
        &self,
        session: &mut ExecutionSession,
        status: SessionStatus,
    ) -> std::result::Result<(), StorageError> {
        debug!(session_id = %session.id, from = %session.status, to = %status, "Session transition");
        session.status = status;
        self.commit(session).await
    }

    /// Claim a queued session for the worker. `None` if it was cancelled
    /// while waiting.
    async fn claim(&self, id: &str) -> Option<ExecutionSession> {
        let mut live = self.live.write().await;
        let session = live.get_mut(id)?;
        if session.status != SessionStatus::Pending {
            return None;
        }
        session.status = SessionStatus::Running;
        session.started_at = Some(self.now());
        Some(session.clone())
    }

    async fn run_session(&self, id: &str) {
        let Some(mut session) = self.claim(id).await else {
            debug!(session_id = %id, "Skipping session that is no longer pending");
            return;
        };
        let control = self.control(id).await;

        info!(session_id = %id, mode = ?session.mode, "Session started");
        let result = match self.commit_started(&session).await {
            Ok(()) => match session.target.clone() {
                SessionTarget::Macro { macro_id, speed, loops } => {
                    self.replay(&mut session, &control, &macro_id, speed, loops).await
                }
                SessionTarget::Goal { task } => {
                    self.pursue(&mut session, &control, &task).await
                }
            },
            Err(e) => Err(e),
        };

        let ending = result.unwrap_or_else(|e| {
            error!(session_id = %id, error = %e, "Storage failure during session");
            Ending::failed(ExecutionError::Storage { reason: e.to_string() }, &session)
        });
        self.finish(session, ending).await;
    }

    async fn commit_started(&self, session: &ExecutionSession) -> std::result::Result<(), StorageError> {
        self.events.publish(DomainEvent::SessionStatusChanged {
            session_id: session.id.clone(),
            status: SessionStatus::Running,
            timestamp: self.now(),
        });
        self.store.put_session(session).await
    }

    async fn finish(&self, mut session: ExecutionSession, ending: Ending) {
        let now = self.now();
        session.pending_step = None;
        session.finished_at = Some(now);
        match ending {
            Ending::Succeeded => {
                session.status = SessionStatus::Succeeded;
                session.log(LogLevel::Info, "session succeeded", now);
                session.summary = Some(summary::compose(&session));
                info!(session_id = %session.id, steps = session.steps_executed, "Session succeeded");
            }
            Ending::Failed(failure) => {
                session.status = SessionStatus::Failed;
                session.log(LogLevel::Error, format!("session failed: {}", failure.error), now);
                warn!(
                    session_id = %session.id,
                    error = %failure.error,
                    step_index = ?failure.step_index,
                    recovery_attempts = failure.trail.len(),
                    "Session failed"
                );
                session.failure = Some(failure);
                session.summary = Some(summary::compose(&session));
            }
            Ending::Cancelled => {
                session.status = SessionStatus::Cancelled;
                session.log(LogLevel::Warn, "session cancelled", now);
                info!(session_id = %session.id, "Session cancelled");
            }
        }

        match self.commit(&session).await {
            Ok(()) => {
                self.live.write().await.remove(&session.id);
            }
            Err(e) => error!(
                session_id = %session.id,
                error = %e,
                "Could not persist terminal session; keeping it in memory"
            ),
        }
        self.controls.write().await.remove(&session.id);
    }

    async fn control(&self, id: &str) -> Arc<Control> {
        self.controls
            .write()
            .await
            .entry(id.to_string())
            .or_default()
            .clone()
    }
}

/// Handle to the engine. Dropping it stops the worker.
pub struct ExecutionEngine {
    inner: Arc<Inner>,
    queue: mpsc::UnboundedSender<String>,
    worker: JoinHandle<()>,
}

impl ExecutionEngine {
    /// Create the engine and spawn its worker. Must be called inside a
    /// tokio runtime.
    pub fn start(
        store: Arc<dyn StateStore>,
        history: Arc<HistoryLog>,
        collaborators: Collaborators,
        settings: EngineSettings,
        events: Arc<EventBus>,
    ) -> Self {
        let inner = Arc::new(Inner {
            store,
            history,
            collaborators,
            events,
            settings,
            live: RwLock::new(HashMap::new()),
            controls: RwLock::new(HashMap::new()),
            queued: AtomicUsize::new(0),
        });
        let (queue, mut rx) = mpsc::unbounded_channel::<String>();

        let worker = {
            let inner = inner.clone();
            tokio::spawn(async move {
                while let Some(id) = rx.recv().await {
                    inner.queued.fetch_sub(1, Ordering::SeqCst);
                    inner.run_session(&id).await;
                }
            })
        };

        Self {
            inner,
            queue,
            worker,
        }
    }

    pub fn events(&self) -> &Arc<EventBus> {
        &self.inner.events
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.inner.settings
    }

    /// Sessions waiting for the worker.
    pub fn queue_depth(&self) -> usize {
        self.inner.queued.load(Ordering::SeqCst)
    }

    /// Queue a replay of macro `id`. Per-run `speed`/`loops` override the
    /// macro's stored settings.
    pub async fn execute_macro(
        &self,
        id: &str,
        speed: Option<f64>,
        loops: Option<u32>,
    ) -> Result<String> {
        let item = self
            .inner
            .store
            .get_macro(id)
            .await?
            .ok_or_else(|| Error::not_found("macro", id))?;
        if !item.is_runnable() {
            return Err(Error::Validation(format!(
                "macro {id} is a draft; fill in its step params and activate it first"
            )));
        }
        let settings = item.settings.with_overrides(speed, loops);
        settings.validate()?;

        self.enqueue(SessionTarget::Macro {
            macro_id: item.id,
            speed: settings.speed,
            loops: settings.loops,
        })
        .await
    }

    /// Queue an autonomous run toward `task.goal_text`.
    pub async fn run_autonomous(&self, task: AutonomousTask) -> Result<String> {
        if task.goal_text.trim().is_empty() {
            return Err(Error::Validation("goal text must not be empty".into()));
        }
        self.enqueue(SessionTarget::Goal { task }).await
    }

    async fn enqueue(&self, target: SessionTarget) -> Result<String> {
        let id = uuid::Uuid::new_v4().to_string();
        let session = ExecutionSession::new(id.clone(), target, self.inner.now());
        self.inner.store.put_session(&session).await?;
        self.inner
            .live
            .write()
            .await
            .insert(id.clone(), session);
        self.inner.control(&id).await;

        let depth = self.inner.queued.fetch_add(1, Ordering::SeqCst) + 1;
        self.queue
            .send(id.clone())
            .map_err(|_| Error::Internal("execution worker has stopped".into()))?;

        info!(session_id = %id, queue_depth = depth, "Session queued");
        self.inner.events.publish(DomainEvent::SessionQueued {
            session_id: id.clone(),
            queue_depth: depth,
            timestamp: self.inner.now(),
        });
        Ok(id)
    }

    /// Resume a session that is awaiting approval.
    pub async fn approve(&self, id: &str) -> Result<()> {
        let live = self.inner.live.read().await;
        let Some(session) = live.get(id) else {
            drop(live);
            return Err(self.not_live(id, "approve").await);
        };
        if session.status != SessionStatus::AwaitingApproval {
            return Err(Error::InvalidState {
                id: id.to_string(),
                status: session.status.to_string(),
                action: "approve",
            });
        }
        drop(live);
        self.inner.control(id).await.approve();
        info!(session_id = %id, "Approval granted");
        Ok(())
    }

    /// Request cancellation. A queued session is cancelled at once; a
    /// running one stops at its next cancellation point.
    pub async fn cancel(&self, id: &str) -> Result<()> {
        let cancelled_now = {
            let mut live = self.inner.live.write().await;
            let Some(session) = live.get_mut(id) else {
                drop(live);
                return Err(self.not_live(id, "cancel").await);
            };
            if session.status == SessionStatus::Pending {
                let now = self.inner.now();
                session.status = SessionStatus::Cancelled;
                session.finished_at = Some(now);
                session.log(LogLevel::Warn, "cancelled before start", now);
                Some(session.clone())
            } else {
                None
            }
        };

        match cancelled_now {
            Some(session) => {
                self.inner.store.put_session(&session).await?;
                self.inner.live.write().await.remove(id);
                self.inner.controls.write().await.remove(id);
                self.inner.events.publish(DomainEvent::SessionStatusChanged {
                    session_id: id.to_string(),
                    status: SessionStatus::Cancelled,
                    timestamp: self.inner.now(),
                });
                info!(session_id = %id, "Queued session cancelled");
            }
            None => {
                self.inner.control(id).await.cancel();
                info!(session_id = %id, "Cancellation requested");
            }
        }
        Ok(())
    }

    /// Error for an id that has no live session: terminal or unknown.
    async fn not_live(&self, id: &str, action: &'static str) -> Error {
        match self.inner.store.get_session(id).await {
            Ok(Some(session)) => Error::InvalidState {
                id: id.to_string(),
                status: session.status.to_string(),
                action,
            },
            Ok(None) => Error::not_found("session", id),
            Err(e) => e.into(),
        }
    }

    pub async fn get_session(&self, id: &str) -> Result<ExecutionSession> {
        if let Some(session) = self.inner.live.read().await.get(id) {
            return Ok(session.clone());
        }
        self.inner
            .store
            .get_session(id)
            .await?
            .ok_or_else(|| Error::not_found("session", id))
    }

    /// All sessions, oldest first.
    pub async fn list_sessions(&self) -> Result<Vec<ExecutionSession>> {
        let mut sessions = self.inner.store.list_sessions().await?;
        let live = self.inner.live.read().await;
        for session in sessions.iter_mut() {
            if let Some(current) = live.get(&session.id) {
                *session = current.clone();
            }
        }
        Ok(sessions)
    }

    /// Delete terminal sessions that finished before `before`.
    pub async fn purge_sessions(&self, before: DateTime<Utc>) -> Result<usize> {
        let removed = self.inner.store.purge_sessions(before).await?;
        info!(removed, "Purged finished sessions");
        Ok(removed)
    }

    /// Fail every stored session that is not terminal and not owned by this
    /// engine. Such rows were left behind when a previous process stopped;
    /// their logs are kept and the failure records the status they were in.
    pub async fn recover_interrupted(&self) -> Result<usize> {
        let stored = self.inner.store.list_sessions().await?;
        let mut recovered = 0;

        for mut session in stored {
            if session.status.is_terminal() || self.inner.live.read().await.contains_key(&session.id) {
                continue;
            }
            let now = self.inner.now();
            let previous = session.status;
            let failure = SessionFailure {
                error: ExecutionError::Interrupted {
                    status: previous.to_string(),
                },
                step_index: session.started_at.map(|_| session.current_step_index),
                loop_index: session.loop_index,
                trail: Vec::new(),
            };
            session.status = SessionStatus::Failed;
            session.pending_step = None;
            session.finished_at = Some(now);
            session.log(
                LogLevel::Error,
                format!("session failed: {}", failure.error),
                now,
            );
            session.failure = Some(failure);
            session.summary = Some(summary::compose(&session));
            self.inner.store.put_session(&session).await?;

            warn!(session_id = %session.id, status = %previous, "Interrupted session marked failed");
            self.inner.events.publish(DomainEvent::SessionStatusChanged {
                session_id: session.id.clone(),
                status: SessionStatus::Failed,
                timestamp: now,
            });
            recovered += 1;
        }

        if recovered > 0 {
            info!(recovered, "Reconciled sessions from a previous run");
        }
        Ok(recovered)
    }

    /// The id of a queued or in-flight session replaying `macro_id`.
    pub async fn active_for_macro(&self, macro_id: &str) -> Option<String> {
        self.inner
            .live
            .read()
            .await
            .values()
            .find(|s| s.status.is_active() && s.macro_id() == Some(macro_id))
            .map(|s| s.id.clone())
    }

    /// The id of a queued or in-flight session pursuing the same task.
    pub async fn active_for_goal(&self, task: &AutonomousTask) -> Option<String> {
        self.inner
            .live
            .read()
            .await
            .values()
            .find(|s| {
                s.status.is_active()
                    && matches!(&s.target, SessionTarget::Goal { task: t } if t == task)
            })
            .map(|s| s.id.clone())
    }

    /// Whether any session is queued or in flight.
    pub async fn is_busy(&self) -> bool {
        !self.inner.live.read().await.is_empty()
    }

    /// Wait until session `id` reaches a terminal status and return it.
    pub async fn wait_for(&self, id: &str) -> Result<ExecutionSession> {
        let mut rx = self.inner.events.subscribe();
        loop {
            let session = self.get_session(id).await?;
            if session.status.is_terminal() {
                return Ok(session);
            }
            loop {
                match rx.recv().await {
                    Ok(event) => {
                        if let DomainEvent::SessionStatusChanged { session_id, status, .. } = &*event {
                            if session_id == id && status.is_terminal() {
                                break;
                            }
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(_)) => break,
                    Err(broadcast::error::RecvError::Closed) => {
                        return Err(Error::Internal("event bus closed".into()));
                    }
                }
            }
        }
    }
}

impl Drop for ExecutionEngine {
    fn drop(&mut self) {
        self.worker.abort();
    }
}

#[cfg(test)]
mod tests {
    use crate::testing::{Harness, login_steps, wait_for_status};
    use stepwise_core::{
        AutonomousTask, DomainEvent, Error, ExecutionError, ExecutionSession, LogLevel,
        PermissionScope, SessionStatus, SessionTarget,
    };

    #[tokio::test(start_paused = true)]
    async fn runs_are_serialized_in_fifo_order() {
        let h = Harness::new();
        let m = h.macro_with(login_steps()).await;
        let mut rx = h.subscribe();

        let first = h.engine.execute_macro(&m.id, None, None).await.unwrap();
        let second = h.engine.execute_macro(&m.id, None, None).await.unwrap();

        // second stays pending while the first runs
        wait_for_status(&mut rx, &first, SessionStatus::Running).await;
        assert_eq!(
            h.engine.get_session(&second).await.unwrap().status,
            SessionStatus::Pending
        );

        h.engine.wait_for(&second).await.unwrap();

        let mut order = Vec::new();
        while let Ok(event) = rx.try_recv() {
            if let DomainEvent::SessionStatusChanged { session_id, status, .. } = &*event {
                order.push((session_id.clone(), *status));
            }
        }
        let first_done = order
            .iter()
            .position(|(id, s)| id == &first && *s == SessionStatus::Succeeded)
            .unwrap();
        let second_started = order
            .iter()
            .position(|(id, s)| id == &second && *s == SessionStatus::Running)
            .unwrap();
        assert!(first_done < second_started, "{order:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn queued_session_can_be_cancelled() {
        let h = Harness::new();
        let m = h.macro_with(login_steps()).await;
        let first = h.engine.execute_macro(&m.id, None, None).await.unwrap();
        let second = h.engine.execute_macro(&m.id, None, None).await.unwrap();

        h.engine.cancel(&second).await.unwrap();
        assert_eq!(
            h.engine.get_session(&second).await.unwrap().status,
            SessionStatus::Cancelled
        );

        h.engine.wait_for(&first).await.unwrap();
        assert_eq!(h.executor.actions().len(), 4);
        tokio::time::sleep(std::time::Duration::from_millis(1)).await;
        assert!(!h.engine.is_busy().await);

        // terminal sessions reject further control
        assert!(matches!(
            h.engine.cancel(&second).await,
            Err(Error::InvalidState { action: "cancel", .. })
        ));
    }

    #[tokio::test]
    async fn approve_requires_awaiting_session() {
        let h = Harness::new();
        assert!(matches!(
            h.engine.approve("missing").await,
            Err(Error::NotFound { kind: "session", .. })
        ));
        assert!(matches!(
            h.engine.get_session("missing").await,
            Err(Error::NotFound { .. })
        ));

        let m = h.macro_with(login_steps()).await;
        let id = h.engine.execute_macro(&m.id, None, None).await.unwrap();
        assert!(matches!(
            h.engine.approve(&id).await,
            Err(Error::InvalidState { action: "approve", .. })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn sessions_are_persisted_and_purgeable() {
        let h = Harness::new();
        let m = h.macro_with(login_steps()).await;
        let id = h.engine.execute_macro(&m.id, Some(4.0), None).await.unwrap();
        h.engine.wait_for(&id).await.unwrap();

        let stored = h.store.get_session(&id).await.unwrap().unwrap();
        assert_eq!(stored.status, SessionStatus::Succeeded);
        assert!(!stored.logs.is_empty());
        assert_eq!(h.engine.list_sessions().await.unwrap().len(), 1);

        let later = chrono::Utc::now() + chrono::Duration::hours(1);
        assert_eq!(h.engine.purge_sessions(later).await.unwrap(), 1);
        assert!(h.engine.list_sessions().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn stranded_sessions_fail_as_interrupted() {
        let h = Harness::new();
        let now = chrono::Utc::now();
        let task = AutonomousTask::new("pay invoice", PermissionScope::Write);

        let mut waiting =
            ExecutionSession::new("left-waiting", SessionTarget::Goal { task }, now);
        waiting.status = SessionStatus::AwaitingApproval;
        waiting.started_at = Some(now);
        waiting.current_step_index = 2;
        waiting.log(LogLevel::Info, "awaiting approval for submit", now);
        let queued = ExecutionSession::new(
            "left-queued",
            SessionTarget::Macro { macro_id: "m".into(), speed: 1.0, loops: 1 },
            now,
        );
        let mut done = queued.clone();
        done.id = "already-done".into();
        done.status = SessionStatus::Succeeded;
        for s in [&waiting, &queued, &done] {
            h.store.put_session(s).await.unwrap();
        }

        assert_eq!(h.engine.recover_interrupted().await.unwrap(), 2);

        let waiting = h.engine.get_session("left-waiting").await.unwrap();
        assert_eq!(waiting.status, SessionStatus::Failed);
        assert!(waiting.finished_at.is_some());
        assert!(waiting.logs.iter().any(|l| l.message == "awaiting approval for submit"));
        let failure = waiting.failure.unwrap();
        assert_eq!(
            failure.error,
            ExecutionError::Interrupted { status: "awaiting-approval".into() }
        );
        assert_eq!(failure.step_index, Some(2));

        let queued = h.engine.get_session("left-queued").await.unwrap();
        assert_eq!(queued.status, SessionStatus::Failed);
        assert_eq!(queued.failure.unwrap().step_index, None);
        assert_eq!(
            h.engine.get_session("already-done").await.unwrap().status,
            SessionStatus::Succeeded
        );

        // nothing left to reconcile, and finished rows now reject control
        assert_eq!(h.engine.recover_interrupted().await.unwrap(), 0);
        assert!(matches!(
            h.engine.cancel("left-queued").await,
            Err(Error::InvalidState { action: "cancel", .. })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn live_sessions_are_found_by_target() {
        let h = Harness::new();
        let m = h.macro_with(login_steps()).await;
        assert_eq!(h.engine.active_for_macro(&m.id).await, None);

        let id = h.engine.execute_macro(&m.id, None, None).await.unwrap();
        assert_eq!(h.engine.active_for_macro(&m.id).await, Some(id.clone()));
        assert_eq!(h.engine.active_for_macro("other").await, None);
        let task = AutonomousTask::new("check inbox", PermissionScope::Read);
        assert_eq!(h.engine.active_for_goal(&task).await, None);

        // reconciling leaves sessions this engine owns alone
        assert_eq!(h.engine.recover_interrupted().await.unwrap(), 0);

        h.engine.wait_for(&id).await.unwrap();
        assert_eq!(h.engine.active_for_macro(&m.id).await, None);
    }

    #[tokio::test(start_paused = true)]
    async fn queued_event_reports_depth() {
        let h = Harness::new();
        let m = h.macro_with(login_steps()).await;
        let mut rx = h.subscribe();
        h.engine.execute_macro(&m.id, None, None).await.unwrap();
        match &*rx.recv().await.unwrap() {
            DomainEvent::SessionQueued { queue_depth, .. } => assert_eq!(*queue_depth, 1),
            other => panic!("unexpected {other:?}"),
        }
    }
}
