//! The execution engine: the heart of stepwise.
//!
//! Every run, whether a macro replay or an autonomous goal, becomes an
//! [`ExecutionSession`](stepwise_core::ExecutionSession) and goes through
//! one FIFO worker, because all runs drive the same automation surface.
//!
//! **Macro mode** replays a fixed step list with a delay of
//! `base_delay / speed` between steps.
//!
//! **Autonomous mode** loops **Perceive → Plan → Gate → Act**:
//!
//! 1. **Perceive** the surface (with OCR when the task asks for it)
//! 2. **Plan** the next step from the goal, snapshot, and session history
//! 3. **Gate** steps whose effect class exceeds the permission scope
//! 4. **Act**, and on failure climb the bounded recovery ladder
//!
//! The loop ends when the planner reports `done` or `cannot_proceed`,
//! recovery is exhausted, the iteration limit is hit, or the session is
//! cancelled.

mod autonomous;
mod control;
mod engine;
mod recovery;
mod replay;
pub mod settings;
mod summary;

#[cfg(test)]
mod testing;

pub use engine::{Collaborators, ExecutionEngine};
pub use settings::EngineSettings;
