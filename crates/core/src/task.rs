//! Autonomous task (goal) definition and permission scopes.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Risk class of an action, and the ceiling an autonomous session may reach
/// without explicit approval. Ordered from least to most risky.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PermissionScope {
    #[default]
    Read,
    Write,
    Submit,
    Payment,
}

impl PermissionScope {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Read => "read",
            Self::Write => "write",
            Self::Submit => "submit",
            Self::Payment => "payment",
        }
    }
}

impl fmt::Display for PermissionScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for PermissionScope {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "read" => Ok(Self::Read),
            "write" => Ok(Self::Write),
            "submit" => Ok(Self::Submit),
            "payment" => Ok(Self::Payment),
            other => Err(format!("unknown permission scope: {other}")),
        }
    }
}

/// A goal-directed task driven by the planner instead of a fixed script.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AutonomousTask {
    /// Natural-language goal
    pub goal_text: String,

    /// Optional domain hint (site, app) passed to the planner
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,

    /// Highest effect class allowed without approval
    #[serde(default)]
    pub permission_scope: PermissionScope,

    /// Request OCR text alongside the structured snapshot
    #[serde(default)]
    pub visual_perception: bool,

    /// Whether steps above `permission_scope` wait for approval
    pub confirmation_required: bool,
}

impl AutonomousTask {
    /// Create a task; `confirmation_required` is derived from the scope.
    pub fn new(goal_text: impl Into<String>, permission_scope: PermissionScope) -> Self {
        Self {
            goal_text: goal_text.into(),
            domain: None,
            permission_scope,
            visual_perception: false,
            confirmation_required: permission_scope != PermissionScope::Read,
        }
    }

    pub fn with_domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = Some(domain.into());
        self
    }

    pub fn with_visual_perception(mut self, enabled: bool) -> Self {
        self.visual_perception = enabled;
        self
    }

    /// Explicitly override the derived confirmation requirement.
    pub fn with_confirmation_required(mut self, required: bool) -> Self {
        self.confirmation_required = required;
        self
    }

    /// True when `effect` must wait for approval before it runs.
    pub fn requires_approval(&self, effect: PermissionScope) -> bool {
        self.confirmation_required && effect > self.permission_scope
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scopes_are_ordered_by_risk() {
        assert!(PermissionScope::Read < PermissionScope::Write);
        assert!(PermissionScope::Write < PermissionScope::Submit);
        assert!(PermissionScope::Submit < PermissionScope::Payment);
    }

    #[test]
    fn confirmation_derived_from_scope() {
        assert!(!AutonomousTask::new("look", PermissionScope::Read).confirmation_required);
        assert!(AutonomousTask::new("edit", PermissionScope::Write).confirmation_required);
    }

    #[test]
    fn approval_needed_only_above_scope() {
        let task = AutonomousTask::new("fill the form", PermissionScope::Write);
        assert!(!task.requires_approval(PermissionScope::Read));
        assert!(!task.requires_approval(PermissionScope::Write));
        assert!(task.requires_approval(PermissionScope::Submit));

        let unattended = task.with_confirmation_required(false);
        assert!(!unattended.requires_approval(PermissionScope::Payment));
    }

    #[test]
    fn scope_parses_case_insensitively() {
        assert_eq!("Submit".parse::<PermissionScope>().unwrap(), PermissionScope::Submit);
        assert!("admin".parse::<PermissionScope>().is_err());
    }
}
