//! Action tools and reference collaborators.
//!
//! Each primitive action (click, type, navigate, ...) is a [`Tool`] with a
//! declared parameter shape. A [`ToolRegistry`] wrapped in a
//! [`RegistryExecutor`] is a complete [`ActionExecutor`]: it validates steps
//! against the declared shapes, classifies their effect, and dispatches them.
//!
//! The built-in tools in [`surface`] are dry-run implementations that log
//! the action instead of driving a real browser. [`scripted`] holds
//! collaborators whose behaviour is set up front, for tests and demos.

pub mod registry;
pub mod scripted;
pub mod surface;

pub use registry::{RegistryExecutor, Tool, ToolError, ToolRegistry, check_params};
pub use scripted::{
    ActionCall, FailMode, NoPlanner, PlanCall, ScriptedExecutor, ScriptedPlanner, StaticPerception,
};

/// A registry holding every built-in dry-run surface tool.
pub fn default_registry() -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    for tool in surface::builtin_tools() {
        registry.register(Box::new(tool));
    }
    registry
}
