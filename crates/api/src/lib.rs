//! Caller-facing facade for stepwise.
//!
//! [`AutomationApi`] wires storage, the history log, the macro library, the
//! recorder, the execution engine and the runner together, and exposes the
//! operations a UI or another orchestrator calls. Build one with
//! [`AutomationApi::builder`]; collaborators that are not supplied fall back
//! to the dry-run tool registry and static perception.

mod api;
mod builder;

pub use api::{ApiStatus, AutomationApi};
pub use builder::ApiBuilder;

// Types callers need to drive the facade.
pub use stepwise_library::{Observed, StopOutcome};
pub use stepwise_workflow::{StartedItem, TickFailure, TickReport};
