//! The macro library: everything that creates, edits, or derives macros.
//!
//! - [`MacroStore`]: validated CRUD and editor operations
//! - [`Recorder`]: the process-wide capture session
//! - [`miner`]: repeated-sequence discovery over a history window

pub mod macro_store;
pub mod miner;
pub mod recorder;

pub use macro_store::MacroStore;
pub use miner::{MiningOptions, mine};
pub use recorder::{Observed, Recorder, StopOutcome};
