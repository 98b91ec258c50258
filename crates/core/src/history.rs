//! History entries: the append-only record of every executed action.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::step::{Params, Step};

/// Result of one action as reported by the action executor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Outcome {
    Ok,
    Error { reason: String },
}

impl Outcome {
    pub fn error(reason: impl Into<String>) -> Self {
        Outcome::Error {
            reason: reason.into(),
        }
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, Outcome::Ok)
    }

    pub fn reason(&self) -> Option<&str> {
        match self {
            Outcome::Ok => None,
            Outcome::Error { reason } => Some(reason),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    /// Position in the log, assigned on append (starts at 1)
    #[serde(default)]
    pub seq: u64,

    pub tool: String,

    #[serde(default)]
    pub params: Params,

    pub outcome: Outcome,

    /// Session that produced the action; `None` for manual or recorded actions
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,

    /// Strictly increasing across the log
    pub timestamp: DateTime<Utc>,
}

impl HistoryEntry {
    /// An entry ready to append; `seq` and `timestamp` are stamped by the log.
    pub fn pending(step: &Step, outcome: Outcome, session_id: Option<String>) -> Self {
        Self {
            seq: 0,
            tool: step.tool.clone(),
            params: step.params.clone(),
            outcome,
            session_id,
            timestamp: DateTime::<Utc>::MIN_UTC,
        }
    }

    pub fn step(&self) -> Step {
        Step {
            tool: self.tool.clone(),
            params: self.params.clone(),
        }
    }
}
