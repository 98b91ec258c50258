//! Autonomous mode: Perceive → Plan → Gate → Act, until the planner is done.

use stepwise_core::error::StorageError;
use stepwise_core::{
    AutonomousTask, ExecutionError, ExecutionSession, HistoryEntry, LogLevel, PlanDecision,
    PlanRequest, SessionStatus, Snapshot, Step,
};
use tracing::{debug, info, warn};

use crate::control::{ApprovalWait, Control};
use crate::engine::{Ending, Inner};
use crate::recovery::Recovered;

/// Mutable state of one autonomous run.
pub(crate) struct GoalRun<'a> {
    pub task: &'a AutonomousTask,
    /// Actions this session performed, oldest first; the planner's context
    pub history: Vec<HistoryEntry>,
}

impl GoalRun<'_> {
    pub fn request<'r>(&'r self, snapshot: &'r Snapshot, broadened: bool) -> PlanRequest<'r> {
        PlanRequest {
            goal_text: &self.task.goal_text,
            domain: self.task.domain.as_deref(),
            snapshot,
            history: &self.history,
            broadened,
        }
    }
}

impl Inner {
    pub(crate) async fn pursue(
        &self,
        session: &mut ExecutionSession,
        control: &Control,
        task: &AutonomousTask,
    ) -> Result<Ending, StorageError> {
        let mut run = GoalRun {
            task,
            history: Vec::new(),
        };
        let limit = self.settings.max_iterations;
        info!(
            session_id = %session.id,
            goal = %task.goal_text,
            scope = %task.permission_scope,
            "Pursuing goal"
        );

        for iteration in 0..limit {
            if control.is_cancelled() {
                return Ok(Ending::Cancelled);
            }
            session.current_step_index = iteration as usize;
            debug!(session_id = %session.id, iteration, "Autonomous iteration");

            // ── Perceive ──
            let snapshot = match self
                .collaborators
                .perception
                .perceive(task.visual_perception)
                .await
            {
                Ok(snapshot) => snapshot,
                Err(e) => match self.recover_perception(session, &run, e.to_string()).await? {
                    Ok(snapshot) => snapshot,
                    Err(ending) => return Ok(ending),
                },
            };

            // ── Plan ──
            let step = match self.collaborators.planner.plan(run.request(&snapshot, false)).await {
                PlanDecision::Next { step } => step,
                PlanDecision::Done { summary } => {
                    let note = summary.unwrap_or_else(|| "goal reached".into());
                    session.log(LogLevel::Info, format!("planner done: {note}"), self.now());
                    return Ok(Ending::Succeeded);
                }
                PlanDecision::CannotProceed { reason } => {
                    session.log(LogLevel::Error, format!("planner cannot proceed: {reason}"), self.now());
                    return Ok(Ending::failed(ExecutionError::CannotProceed { reason }, session));
                }
            };

            // ── Gate ──
            if let Err(ending) = self.gate(session, control, task, &step).await? {
                return Ok(ending);
            }

            // ── Act ──
            let entry = self.perform(session, &step).await?;
            let failure = entry.outcome.reason().map(str::to_string);
            run.history.push(entry);

            if let Some(reason) = failure {
                session.log(LogLevel::Error, format!("{step} failed: {reason}"), self.now());
                match self.recover_action(session, control, &mut run, step, reason).await? {
                    Ok(Recovered::Acted) => {}
                    Ok(Recovered::Finished) => return Ok(Ending::Succeeded),
                    Err(ending) => return Ok(ending),
                }
            } else {
                session.log(LogLevel::Info, format!("{step} ok"), self.now());
            }
            self.commit(session).await?;
        }

        warn!(session_id = %session.id, limit, "Iteration limit reached");
        Ok(Ending::failed(ExecutionError::IterationLimit { limit }, session))
    }

    /// Hold a step whose effect class exceeds the task's scope until it is
    /// approved. `Ok(Err(..))` means the session ends here.
    pub(crate) async fn gate(
        &self,
        session: &mut ExecutionSession,
        control: &Control,
        task: &AutonomousTask,
        step: &Step,
    ) -> Result<Result<(), Ending>, StorageError> {
        let effect = self.collaborators.executor.effect_class(step);
        if !task.requires_approval(effect) {
            return Ok(Ok(()));
        }

        let resume_status = session.status;
        control.reset_approval();
        session.pending_step = Some(step.clone());
        session.log(
            LogLevel::Warn,
            format!(
                "{step} is a {effect} action under {} scope; awaiting approval",
                task.permission_scope
            ),
            self.now(),
        );
        self.transition(session, SessionStatus::AwaitingApproval).await?;
        info!(session_id = %session.id, tool = %step.tool, %effect, "Awaiting approval");

        let timeout = self.settings.approval_timeout;
        let verdict = control.wait_for_approval(timeout).await;
        session.pending_step = None;
        match verdict {
            ApprovalWait::Approved => {
                session.log(LogLevel::Info, format!("{step} approved"), self.now());
                self.transition(session, resume_status).await?;
                Ok(Ok(()))
            }
            ApprovalWait::Cancelled => Ok(Err(Ending::Cancelled)),
            ApprovalWait::TimedOut => Ok(Err(Ending::failed(
                ExecutionError::ApprovalTimeout {
                    waited_secs: timeout.as_secs(),
                },
                session,
            ))),
        }
    }
}
