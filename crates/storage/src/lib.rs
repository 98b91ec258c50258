//! State store implementations and the history log for stepwise.

pub mod history;
pub mod in_memory;

#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use history::{HistoryLog, HistoryScan, HistoryWindow};
pub use in_memory::InMemoryStore;

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteStore;
