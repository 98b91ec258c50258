//! Macro: a named, ordered, replayable sequence of steps.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::step::Step;

/// Replay settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MacroSettings {
    /// Playback speed multiplier (1.0 = normal, 2.0 = twice as fast)
    #[serde(default = "default_speed")]
    pub speed: f64,

    /// How many times the whole sequence is replayed
    #[serde(default = "default_loops")]
    pub loops: u32,

    /// Log a failing step and keep going instead of failing the session
    #[serde(default)]
    pub continue_on_error: bool,
}

fn default_speed() -> f64 {
    1.0
}
fn default_loops() -> u32 {
    1
}

impl Default for MacroSettings {
    fn default() -> Self {
        Self {
            speed: default_speed(),
            loops: default_loops(),
            continue_on_error: false,
        }
    }
}

impl MacroSettings {
    pub fn validate(&self) -> Result<()> {
        if !self.speed.is_finite() || self.speed <= 0.0 {
            return Err(Error::Validation(format!(
                "speed must be a positive number, got {}",
                self.speed
            )));
        }
        if self.loops == 0 {
            return Err(Error::Validation("loops must be at least 1".into()));
        }
        Ok(())
    }

    /// Apply per-run overrides on top of the stored settings.
    pub fn with_overrides(&self, speed: Option<f64>, loops: Option<u32>) -> Self {
        Self {
            speed: speed.unwrap_or(self.speed),
            loops: loops.unwrap_or(self.loops),
            continue_on_error: self.continue_on_error,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MacroStatus {
    /// Promoted from a pattern; params still need to be filled in
    Draft,
    #[default]
    Active,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Macro {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Replay order. Indices are always `0..steps.len()`.
    pub steps: Vec<Step>,
    #[serde(default)]
    pub settings: MacroSettings,
    #[serde(default)]
    pub status: MacroStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Macro {
    /// Structural invariants that hold on every write, independent of the
    /// tool vocabulary.
    pub fn check_invariants(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(Error::Validation("macro name must not be empty".into()));
        }
        if self.status == MacroStatus::Active && self.steps.is_empty() {
            return Err(Error::Validation("an active macro needs at least one step".into()));
        }
        if let Some(i) = self.steps.iter().position(|s| s.tool.trim().is_empty()) {
            return Err(Error::Validation(format!("step {i} has an empty tool identifier")));
        }
        self.settings.validate()
    }

    pub fn is_runnable(&self) -> bool {
        self.status == MacroStatus::Active && !self.steps.is_empty()
    }

    /// Tool identifiers in replay order.
    pub fn tool_sequence(&self) -> Vec<&str> {
        self.steps.iter().map(|s| s.tool.as_str()).collect()
    }
}

/// Full replacement of a macro's mutable fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MacroPatch {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub steps: Vec<Step>,
    #[serde(default)]
    pub settings: MacroSettings,
    #[serde(default)]
    pub status: MacroStatus,
}

impl From<&Macro> for MacroPatch {
    fn from(m: &Macro) -> Self {
        Self {
            name: m.name.clone(),
            description: m.description.clone(),
            steps: m.steps.clone(),
            settings: m.settings.clone(),
            status: m.status,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(status: MacroStatus, steps: Vec<Step>) -> Macro {
        Macro {
            id: "m1".into(),
            name: "login".into(),
            description: String::new(),
            steps,
            settings: MacroSettings::default(),
            status,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn default_settings() {
        let s = MacroSettings::default();
        assert_eq!(s.speed, 1.0);
        assert_eq!(s.loops, 1);
        assert!(!s.continue_on_error);
    }

    #[test]
    fn invalid_settings_rejected() {
        let zero_speed = MacroSettings { speed: 0.0, ..Default::default() };
        assert!(zero_speed.validate().is_err());
        let nan = MacroSettings { speed: f64::NAN, ..Default::default() };
        assert!(nan.validate().is_err());
        let no_loops = MacroSettings { loops: 0, ..Default::default() };
        assert!(no_loops.validate().is_err());
    }

    #[test]
    fn active_macro_must_have_steps() {
        assert!(sample(MacroStatus::Active, vec![]).check_invariants().is_err());
        assert!(sample(MacroStatus::Draft, vec![]).check_invariants().is_ok());
        assert!(sample(MacroStatus::Active, vec![Step::new("click")]).check_invariants().is_ok());
    }

    #[test]
    fn overrides_keep_policy_flag() {
        let s = MacroSettings { continue_on_error: true, ..Default::default() };
        let o = s.with_overrides(Some(2.0), None);
        assert_eq!(o.speed, 2.0);
        assert_eq!(o.loops, 1);
        assert!(o.continue_on_error);
    }
}
