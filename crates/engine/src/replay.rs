//! Macro mode: deterministic replay of a stored step list.

use std::time::Instant;
use stepwise_core::error::StorageError;
use stepwise_core::{
    DomainEvent, ExecutionError, ExecutionSession, HistoryEntry, LogLevel, Outcome, Step,
};
use tracing::{debug, warn};

use crate::control::Control;
use crate::engine::{Ending, Inner};

impl Inner {
    pub(crate) async fn replay(
        &self,
        session: &mut ExecutionSession,
        control: &Control,
        macro_id: &str,
        speed: f64,
        loops: u32,
    ) -> Result<Ending, StorageError> {
        let item = match self.store.get_macro(macro_id).await? {
            Some(m) if m.is_runnable() => m,
            Some(_) => {
                return Ok(Ending::failed(
                    ExecutionError::MacroUnavailable {
                        macro_id: macro_id.to_string(),
                        reason: "macro is a draft".into(),
                    },
                    session,
                ));
            }
            None => {
                return Ok(Ending::failed(
                    ExecutionError::MacroUnavailable {
                        macro_id: macro_id.to_string(),
                        reason: "macro was deleted".into(),
                    },
                    session,
                ));
            }
        };

        let delay = self.settings.step_delay(speed);
        let now = self.now();
        session.log(
            LogLevel::Info,
            format!(
                "replaying '{}' ({} steps × {} loops at speed {})",
                item.name,
                item.steps.len(),
                loops,
                speed
            ),
            now,
        );
        self.commit(session).await?;

        let mut first = true;
        for loop_index in 0..loops {
            for (index, step) in item.steps.iter().enumerate() {
                if !first {
                    tokio::time::sleep(delay).await;
                }
                first = false;

                if control.is_cancelled() {
                    return Ok(Ending::Cancelled);
                }

                session.loop_index = loop_index;
                session.current_step_index = index;

                let entry = self.perform(session, step).await?;
                match entry.outcome {
                    Outcome::Ok => {
                        session.log(LogLevel::Info, format!("{step} ok"), self.now());
                    }
                    Outcome::Error { reason } => {
                        session.log(LogLevel::Error, format!("{step} failed: {reason}"), self.now());
                        if !item.settings.continue_on_error {
                            self.commit(session).await?;
                            return Ok(Ending::failed(
                                ExecutionError::ActionFailed {
                                    tool: step.tool.clone(),
                                    reason,
                                },
                                session,
                            ));
                        }
                        warn!(
                            session_id = %session.id,
                            step_index = index,
                            loop_index,
                            "Step failed; continuing"
                        );
                    }
                }
                self.commit(session).await?;
            }
        }

        Ok(Ending::Succeeded)
    }

    /// Run one action and record it in history. Shared by both modes.
    pub(crate) async fn perform(
        &self,
        session: &mut ExecutionSession,
        step: &Step,
    ) -> Result<HistoryEntry, StorageError> {
        let started = Instant::now();
        let outcome = self.collaborators.executor.act(step).await;
        self.record(session, step, outcome, started).await
    }

    /// Append the action to history and account for it on the session.
    pub(crate) async fn record(
        &self,
        session: &mut ExecutionSession,
        step: &Step,
        outcome: Outcome,
        started: Instant,
    ) -> Result<HistoryEntry, StorageError> {
        let duration_ms = started.elapsed().as_millis() as u64;
        let entry = self
            .history
            .append(HistoryEntry::pending(step, outcome, Some(session.id.clone())))
            .await?;
        session.steps_executed += 1;

        debug!(
            session_id = %session.id,
            tool = %step.tool,
            success = entry.outcome.is_ok(),
            duration_ms,
            "Step executed"
        );
        self.events.publish(DomainEvent::StepExecuted {
            session_id: session.id.clone(),
            tool: step.tool.clone(),
            success: entry.outcome.is_ok(),
            duration_ms,
            timestamp: entry.timestamp,
        });
        Ok(entry)
    }
}
