//! # stepwise core
//!
//! Domain types, traits, and error definitions for the stepwise automation
//! engine. This crate has **no runtime dependencies beyond `tokio::sync`**; it
//! defines the model every other crate implements against.
//!
//! ## Layout
//!
//! - [`step`], [`macro_def`], [`history`], [`pattern`], [`session`],
//!   [`task`], [`schedule`] hold the data model.
//! - [`action`], [`perception`], [`planner`] are the injected collaborators
//!   that touch the automation surface.
//! - [`store`] is the persistence seam; [`clock`] the time seam.

pub mod action;
pub mod clock;
pub mod error;
pub mod event;
pub mod history;
pub mod macro_def;
pub mod pattern;
pub mod perception;
pub mod planner;
pub mod schedule;
pub mod session;
pub mod step;
pub mod store;
pub mod task;

// Re-export key types at crate root for ergonomics
pub use action::{ActionExecutor, StepValidator, default_effect_class};
pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{Error, ExecutionError, PerceptionError, Result, StorageError};
pub use event::{DomainEvent, EventBus};
pub use history::{HistoryEntry, Outcome};
pub use macro_def::{Macro, MacroPatch, MacroSettings, MacroStatus};
pub use pattern::Pattern;
pub use perception::{Perception, Snapshot};
pub use planner::{PlanDecision, PlanRequest, Planner};
pub use schedule::{RunnerState, ScheduleTarget, ScheduledItem};
pub use session::{
    ExecutionSession, LogEntry, LogLevel, RecoveryAttempt, RecoveryStrategy, SessionFailure,
    SessionMode, SessionStatus, SessionTarget,
};
pub use step::{Params, Step};
pub use store::StateStore;
pub use task::{AutonomousTask, PermissionScope};
