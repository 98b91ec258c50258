//! Execution sessions: one run of a macro or an autonomous task, tracked
//! through a status state machine to a terminal outcome.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::ExecutionError;
use crate::step::Step;
use crate::task::AutonomousTask;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionMode {
    Macro,
    Autonomous,
}

/// What a session runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionTarget {
    /// Replay a stored macro with the effective settings of this run
    Macro {
        macro_id: String,
        speed: f64,
        loops: u32,
    },
    /// Plan towards a goal
    Goal { task: AutonomousTask },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Pending,
    Running,
    AwaitingApproval,
    Recovering,
    Succeeded,
    Failed,
    Cancelled,
}

impl SessionStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::Cancelled)
    }

    /// Queued or holding the worker.
    pub fn is_active(&self) -> bool {
        !self.is_terminal()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::AwaitingApproval => "awaiting-approval",
            Self::Recovering => "recovering",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    Info,
    Warn,
    Error,
}

/// One distinct remediation tried after a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecoveryStrategy {
    /// Take a fresh snapshot, then retry
    RePerceive,
    /// Retry letting the executor resolve the target differently
    AlternateLocator,
    /// Retry after bringing the target into view
    ScrollIntoView,
    /// Sleep with backoff, then retry
    BackoffRetry,
    /// Ask the planner again with broadened context
    Replan,
    /// Give up
    Abort,
}

impl RecoveryStrategy {
    /// The ladder walked in order when nothing else is configured.
    pub const DEFAULT_LADDER: [RecoveryStrategy; 6] = [
        Self::RePerceive,
        Self::AlternateLocator,
        Self::ScrollIntoView,
        Self::BackoffRetry,
        Self::Replan,
        Self::Abort,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RePerceive => "re_perceive",
            Self::AlternateLocator => "alternate_locator",
            Self::ScrollIntoView => "scroll_into_view",
            Self::BackoffRetry => "backoff_retry",
            Self::Replan => "replan",
            Self::Abort => "abort",
        }
    }
}

impl fmt::Display for RecoveryStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub level: LogLevel,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step_index: Option<usize>,
    #[serde(default)]
    pub loop_index: u32,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strategy: Option<RecoveryStrategy>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecoveryAttempt {
    /// 1-based position on the ladder
    pub attempt: u32,
    pub strategy: RecoveryStrategy,
    pub error: String,
    pub timestamp: DateTime<Utc>,
}

/// Diagnosis of a failed session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionFailure {
    pub error: ExecutionError,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step_index: Option<usize>,
    #[serde(default)]
    pub loop_index: u32,
    /// Every recovery attempt made for the failing step, in order
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub trail: Vec<RecoveryAttempt>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionSession {
    pub id: String,
    pub mode: SessionMode,
    pub target: SessionTarget,
    pub status: SessionStatus,
    #[serde(default)]
    pub current_step_index: usize,
    #[serde(default)]
    pub loop_index: u32,
    /// Actions attempted so far (successful or not)
    #[serde(default)]
    pub steps_executed: u32,
    #[serde(default)]
    pub logs: Vec<LogEntry>,
    /// Step held back while the session awaits approval
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pending_step: Option<Step>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<SessionFailure>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
}

impl ExecutionSession {
    pub fn new(id: impl Into<String>, target: SessionTarget, now: DateTime<Utc>) -> Self {
        let mode = match target {
            SessionTarget::Macro { .. } => SessionMode::Macro,
            SessionTarget::Goal { .. } => SessionMode::Autonomous,
        };
        Self {
            id: id.into(),
            mode,
            target,
            status: SessionStatus::Pending,
            current_step_index: 0,
            loop_index: 0,
            steps_executed: 0,
            logs: Vec::new(),
            pending_step: None,
            failure: None,
            summary: None,
            created_at: now,
            started_at: None,
            finished_at: None,
        }
    }

    pub fn macro_id(&self) -> Option<&str> {
        match &self.target {
            SessionTarget::Macro { macro_id, .. } => Some(macro_id),
            SessionTarget::Goal { .. } => None,
        }
    }

    pub fn log(&mut self, level: LogLevel, message: impl Into<String>, now: DateTime<Utc>) {
        self.logs.push(LogEntry {
            timestamp: now,
            level,
            step_index: Some(self.current_step_index),
            loop_index: self.loop_index,
            message: message.into(),
            strategy: None,
        });
    }

    pub fn log_recovery(&mut self, attempt: &RecoveryAttempt) {
        self.logs.push(LogEntry {
            timestamp: attempt.timestamp,
            level: LogLevel::Warn,
            step_index: Some(self.current_step_index),
            loop_index: self.loop_index,
            message: format!(
                "recovery attempt {} ({}) failed: {}",
                attempt.attempt, attempt.strategy, attempt.error
            ),
            strategy: Some(attempt.strategy),
        });
    }

    /// Wall-clock duration between start and finish, when both are known.
    pub fn elapsed(&self) -> Option<chrono::Duration> {
        Some(self.finished_at? - self.started_at?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::PermissionScope;

    #[test]
    fn terminal_statuses() {
        assert!(SessionStatus::Succeeded.is_terminal());
        assert!(SessionStatus::Failed.is_terminal());
        assert!(SessionStatus::Cancelled.is_terminal());
        assert!(SessionStatus::AwaitingApproval.is_active());
        assert!(SessionStatus::Pending.is_active());
    }

    #[test]
    fn mode_follows_target() {
        let now = Utc::now();
        let m = ExecutionSession::new(
            "s1",
            SessionTarget::Macro { macro_id: "m1".into(), speed: 1.0, loops: 1 },
            now,
        );
        assert_eq!(m.mode, SessionMode::Macro);
        assert_eq!(m.macro_id(), Some("m1"));

        let g = ExecutionSession::new(
            "s2",
            SessionTarget::Goal { task: AutonomousTask::new("find it", PermissionScope::Read) },
            now,
        );
        assert_eq!(g.mode, SessionMode::Autonomous);
        assert_eq!(g.status, SessionStatus::Pending);
    }

    #[test]
    fn status_serializes_snake_case() {
        let json = serde_json::to_string(&SessionStatus::AwaitingApproval).unwrap();
        assert_eq!(json, "\"awaiting_approval\"");
        assert_eq!(SessionStatus::AwaitingApproval.to_string(), "awaiting-approval");
    }

    #[test]
    fn default_ladder_is_distinct() {
        let ladder = RecoveryStrategy::DEFAULT_LADDER;
        for (i, a) in ladder.iter().enumerate() {
            assert!(!ladder[i + 1..].contains(a));
        }
        assert_eq!(ladder.last(), Some(&RecoveryStrategy::Abort));
    }
}
