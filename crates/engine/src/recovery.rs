//! The bounded recovery ladder.
//!
//! A failed autonomous action (or an unavailable surface) is retried under
//! each configured strategy in order, at most once per strategy. Every
//! failed attempt is logged and kept in the trail; running off the end of
//! the ladder, or reaching `abort`, fails the session with
//! `RecoveryExhausted`.

use std::time::Instant;
use stepwise_core::error::StorageError;
use stepwise_core::{
    DomainEvent, ExecutionError, ExecutionSession, LogLevel, PlanDecision, RecoveryAttempt,
    RecoveryStrategy, SessionFailure, SessionStatus, Snapshot, Step,
};
use tracing::{info, warn};

use crate::autonomous::GoalRun;
use crate::control::Control;
use crate::engine::{Ending, Inner};

/// How a successful recovery left the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Recovered {
    /// A retried or replanned action succeeded; keep looping.
    Acted,
    /// The planner, asked to re-plan, reported the goal already reached.
    Finished,
}

enum Attempt {
    Succeeded,
    Finished,
    Failed(String),
    Ended(Ending),
}

/// Recovery outcome, or the ending that stops the session.
type Recovery<T> = Result<Result<T, Ending>, StorageError>;

impl Inner {
    pub(crate) async fn recover_action(
        &self,
        session: &mut ExecutionSession,
        control: &Control,
        run: &mut GoalRun<'_>,
        step: Step,
        error: String,
    ) -> Recovery<Recovered> {
        self.transition(session, SessionStatus::Recovering).await?;
        let mut trail = Vec::new();
        let mut last_error = error;

        for (i, &strategy) in self.settings.ladder.iter().enumerate() {
            let attempt = i as u32 + 1;
            self.announce(session, attempt, strategy);

            let result = match strategy {
                RecoveryStrategy::Abort => Attempt::Failed("aborted by recovery ladder".into()),
                RecoveryStrategy::RePerceive => {
                    match self
                        .collaborators
                        .perception
                        .perceive(run.task.visual_perception)
                        .await
                    {
                        Ok(_) => self.retry(session, run, &step, None).await?,
                        Err(e) => Attempt::Failed(e.to_string()),
                    }
                }
                RecoveryStrategy::AlternateLocator | RecoveryStrategy::ScrollIntoView => {
                    self.retry(session, run, &step, Some(strategy)).await?
                }
                RecoveryStrategy::BackoffRetry => {
                    tokio::time::sleep(self.settings.backoff * attempt).await;
                    self.retry(session, run, &step, Some(strategy)).await?
                }
                RecoveryStrategy::Replan => self.replan(session, control, run).await?,
            };

            match result {
                Attempt::Succeeded => {
                    session.log(
                        LogLevel::Info,
                        format!("recovered {} via {strategy}", step.tool),
                        self.now(),
                    );
                    info!(session_id = %session.id, %strategy, attempt, "Recovered");
                    self.transition(session, SessionStatus::Running).await?;
                    return Ok(Ok(Recovered::Acted));
                }
                Attempt::Finished => {
                    session.log(LogLevel::Info, "planner reports goal reached", self.now());
                    return Ok(Ok(Recovered::Finished));
                }
                Attempt::Ended(ending) => return Ok(Err(ending)),
                Attempt::Failed(e) => {
                    self.note_failure(session, &mut trail, attempt, strategy, &e).await?;
                    last_error = e;
                    if strategy == RecoveryStrategy::Abort {
                        break;
                    }
                }
            }
        }

        Ok(Err(self.exhausted(session, trail, last_error)))
    }

    pub(crate) async fn recover_perception(
        &self,
        session: &mut ExecutionSession,
        run: &GoalRun<'_>,
        error: String,
    ) -> Recovery<Snapshot> {
        warn!(session_id = %session.id, error = %error, "Perception unavailable");
        session.log(LogLevel::Error, format!("perception unavailable: {error}"), self.now());
        self.transition(session, SessionStatus::Recovering).await?;
        let mut trail = Vec::new();
        let mut last_error = error;

        for (i, &strategy) in self.settings.ladder.iter().enumerate() {
            let attempt = i as u32 + 1;
            self.announce(session, attempt, strategy);

            let result = match strategy {
                RecoveryStrategy::Abort => Err("aborted by recovery ladder".to_string()),
                _ => {
                    if strategy == RecoveryStrategy::BackoffRetry {
                        tokio::time::sleep(self.settings.backoff * attempt).await;
                    }
                    self.collaborators
                        .perception
                        .perceive(run.task.visual_perception)
                        .await
                        .map_err(|e| e.to_string())
                }
            };

            match result {
                Ok(snapshot) => {
                    session.log(LogLevel::Info, format!("perception restored via {strategy}"), self.now());
                    self.transition(session, SessionStatus::Running).await?;
                    return Ok(Ok(snapshot));
                }
                Err(e) => {
                    self.note_failure(session, &mut trail, attempt, strategy, &e).await?;
                    last_error = e;
                    if strategy == RecoveryStrategy::Abort {
                        break;
                    }
                }
            }
        }

        Ok(Err(self.exhausted(session, trail, last_error)))
    }

    /// Re-run `step`, optionally under a strategy hint.
    async fn retry(
        &self,
        session: &mut ExecutionSession,
        run: &mut GoalRun<'_>,
        step: &Step,
        hint: Option<RecoveryStrategy>,
    ) -> Result<Attempt, StorageError> {
        let started = Instant::now();
        let executor = &self.collaborators.executor;
        let outcome = match hint {
            Some(strategy) => executor.act_with_hint(step, strategy).await,
            None => executor.act(step).await,
        };
        let entry = self.record(session, step, outcome, started).await?;
        let attempt = match entry.outcome.reason() {
            Some(reason) => Attempt::Failed(reason.to_string()),
            None => Attempt::Succeeded,
        };
        run.history.push(entry);
        Ok(attempt)
    }

    /// Perceive afresh and ask the planner again with broadened context.
    async fn replan(
        &self,
        session: &mut ExecutionSession,
        control: &Control,
        run: &mut GoalRun<'_>,
    ) -> Result<Attempt, StorageError> {
        let snapshot = match self
            .collaborators
            .perception
            .perceive(run.task.visual_perception)
            .await
        {
            Ok(snapshot) => snapshot,
            Err(e) => return Ok(Attempt::Failed(e.to_string())),
        };

        let step = match self.collaborators.planner.plan(run.request(&snapshot, true)).await {
            PlanDecision::Next { step } => step,
            PlanDecision::Done { .. } => return Ok(Attempt::Finished),
            PlanDecision::CannotProceed { reason } => {
                return Ok(Attempt::Failed(format!("re-plan: {reason}")));
            }
        };
        session.log(LogLevel::Info, format!("re-planned next step: {step}"), self.now());

        if let Err(ending) = self.gate(session, control, run.task, &step).await? {
            return Ok(Attempt::Ended(ending));
        }
        self.retry(session, run, &step, None).await
    }

    fn announce(&self, session: &ExecutionSession, attempt: u32, strategy: RecoveryStrategy) {
        self.events.publish(DomainEvent::RecoveryAttempted {
            session_id: session.id.clone(),
            attempt,
            strategy,
            timestamp: self.now(),
        });
    }

    async fn note_failure(
        &self,
        session: &mut ExecutionSession,
        trail: &mut Vec<RecoveryAttempt>,
        attempt: u32,
        strategy: RecoveryStrategy,
        error: &str,
    ) -> Result<(), StorageError> {
        let record = RecoveryAttempt {
            attempt,
            strategy,
            error: error.to_string(),
            timestamp: self.now(),
        };
        warn!(session_id = %session.id, attempt, %strategy, error, "Recovery attempt failed");
        session.log_recovery(&record);
        trail.push(record);
        self.commit(session).await
    }

    fn exhausted(
        &self,
        session: &ExecutionSession,
        trail: Vec<RecoveryAttempt>,
        last_error: String,
    ) -> Ending {
        Ending::Failed(SessionFailure {
            error: ExecutionError::RecoveryExhausted {
                attempts: trail.len() as u32,
                last_error,
            },
            step_index: Some(session.current_step_index),
            loop_index: session.loop_index,
            trail,
        })
    }
}
