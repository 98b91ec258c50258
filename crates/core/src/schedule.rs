//! Runner state and scheduled work items.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::task::AutonomousTask;

/// Process-wide runner state (single instance).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunnerState {
    pub running: bool,
    pub interval_sec: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_tick: Option<DateTime<Utc>>,
}

impl Default for RunnerState {
    fn default() -> Self {
        Self {
            running: false,
            interval_sec: 60,
            last_tick: None,
        }
    }
}

/// What a scheduled item starts when it comes due.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ScheduleTarget {
    Macro {
        macro_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        speed: Option<f64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        loops: Option<u32>,
    },
    Goal { task: AutonomousTask },
}

/// A macro or task the runner starts once `scheduled_for` has passed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduledItem {
    pub id: String,
    pub name: String,
    pub target: ScheduleTarget,

    /// Next due time; `None` once a one-shot item has fired
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scheduled_for: Option<DateTime<Utc>>,

    /// 5-field cron expression for recurring items
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cron: Option<String>,

    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Session most recently started for this item
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active_session: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_run: Option<DateTime<Utc>>,
}

fn default_true() -> bool {
    true
}

impl ScheduledItem {
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.enabled && self.scheduled_for.is_some_and(|at| at <= now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn item(at: Option<DateTime<Utc>>, enabled: bool) -> ScheduledItem {
        ScheduledItem {
            id: "i1".into(),
            name: "nightly".into(),
            target: ScheduleTarget::Macro { macro_id: "m1".into(), speed: None, loops: None },
            scheduled_for: at,
            cron: None,
            enabled,
            active_session: None,
            last_run: None,
        }
    }

    #[test]
    fn due_when_time_has_passed() {
        let now = Utc::now();
        assert!(item(Some(now - Duration::seconds(1)), true).is_due(now));
        assert!(item(Some(now), true).is_due(now));
        assert!(!item(Some(now + Duration::seconds(1)), true).is_due(now));
        assert!(!item(None, true).is_due(now));
        assert!(!item(Some(now), false).is_due(now));
    }

    #[test]
    fn target_serialization() {
        let json = serde_json::to_string(&item(None, true).target).unwrap();
        assert!(json.contains("\"type\":\"macro\""));
        assert!(!json.contains("speed"));
    }
}
