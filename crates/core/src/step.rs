//! Step: the atomic unit shared by macros, patterns, and autonomous plans.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Parameter mapping of a step. Ordered so equality and serialization are stable.
pub type Params = BTreeMap<String, serde_json::Value>;

/// One primitive action: a tool identifier plus its parameters.
///
/// The engine treats steps as opaque payloads; whether `tool` is known and
/// `params` fits its shape is decided by a [`crate::StepValidator`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    /// Tool identifier (e.g. "click", "type", "navigate")
    pub tool: String,

    /// Tool parameters
    #[serde(default)]
    pub params: Params,
}

impl Step {
    pub fn new(tool: impl Into<String>) -> Self {
        Self {
            tool: tool.into(),
            params: Params::new(),
        }
    }

    /// Builder-style parameter insertion.
    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    pub fn param_str(&self, key: &str) -> Option<&str> {
        self.params.get(key).and_then(|v| v.as_str())
    }
}

impl fmt::Display for Step {
    /// Compact form used in logs and summaries: `type(selector=#user, text=a)`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.tool)?;
        for (i, (key, value)) in self.params.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            match value {
                serde_json::Value::String(s) => write!(f, "{key}={s}")?,
                other => write!(f, "{key}={other}")?,
            }
        }
        f.write_str(")")
    }
}
