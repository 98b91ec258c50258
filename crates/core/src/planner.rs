//! Planner: turns a goal plus a snapshot into the next step.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::history::HistoryEntry;
use crate::perception::Snapshot;
use crate::step::Step;

/// Everything the planner sees for one decision.
#[derive(Debug, Clone, Copy)]
pub struct PlanRequest<'a> {
    pub goal_text: &'a str,
    pub domain: Option<&'a str>,
    pub snapshot: &'a Snapshot,
    /// Actions this session has executed so far, oldest first
    pub history: &'a [HistoryEntry],
    /// Set when re-planning after a failure; the planner should consider
    /// alternatives it would normally skip
    pub broadened: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum PlanDecision {
    Next { step: Step },
    Done {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        summary: Option<String>,
    },
    CannotProceed { reason: String },
}

/// Pure from the engine's point of view: no side effects are attributed to it.
#[async_trait]
pub trait Planner: Send + Sync {
    async fn plan(&self, request: PlanRequest<'_>) -> PlanDecision;
}
