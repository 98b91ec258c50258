//! Action executor: the sole way steps have effect on the automation surface.
//!
//! Implementations drive a browser, a desktop accessibility API, or a test
//! double. The engine only sees [`ActionExecutor::act`] and never retries on
//! its own unless a recovery strategy asks for it.

use async_trait::async_trait;

use crate::history::Outcome;
use crate::session::RecoveryStrategy;
use crate::step::Step;
use crate::task::PermissionScope;

/// Decides whether a step is well-formed for the tool vocabulary in use.
pub trait StepValidator: Send + Sync {
    /// `Ok` iff `step.tool` is known and `step.params` fits its declared shape.
    fn validate(&self, step: &Step) -> std::result::Result<(), String>;
}

#[async_trait]
pub trait ActionExecutor: StepValidator {
    /// Perform one primitive action.
    async fn act(&self, step: &Step) -> Outcome;

    /// Retry a failed action under a recovery strategy. Executors that can
    /// resolve targets differently (alternate locators, scrolling first)
    /// override this; the default is a plain retry.
    async fn act_with_hint(&self, step: &Step, strategy: RecoveryStrategy) -> Outcome {
        let _ = strategy;
        self.act(step).await
    }

    /// Risk class of a step, compared against a task's permission scope.
    fn effect_class(&self, step: &Step) -> PermissionScope {
        default_effect_class(&step.tool)
    }
}

/// Classification by tool name used when an executor has no better idea.
/// Unknown tools count as `write`.
pub fn default_effect_class(tool: &str) -> PermissionScope {
    match tool {
        "navigate" | "scroll" | "wait" | "hover" | "read_text" | "extract" | "screenshot"
        | "find" | "perceive" => PermissionScope::Read,
        "submit" | "send" | "post" | "publish" | "confirm" | "delete" => PermissionScope::Submit,
        "pay" | "purchase" | "checkout" | "transfer" => PermissionScope::Payment,
        _ => PermissionScope::Write,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_classification() {
        assert_eq!(default_effect_class("navigate"), PermissionScope::Read);
        assert_eq!(default_effect_class("click"), PermissionScope::Write);
        assert_eq!(default_effect_class("type"), PermissionScope::Write);
        assert_eq!(default_effect_class("submit"), PermissionScope::Submit);
        assert_eq!(default_effect_class("checkout"), PermissionScope::Payment);
        assert_eq!(default_effect_class("something_new"), PermissionScope::Write);
    }
}
