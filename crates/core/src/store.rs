//! Persistence seam: macros, history, sessions, schedules, runner state.
//!
//! Implementations: SQLite and in-memory (for tests and ephemeral runs).

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::StorageError;
use crate::history::HistoryEntry;
use crate::macro_def::Macro;
use crate::schedule::{RunnerState, ScheduledItem};
use crate::session::ExecutionSession;

type StoreResult<T> = std::result::Result<T, StorageError>;

#[async_trait]
pub trait StateStore: Send + Sync {
    /// The backend name (e.g., "sqlite", "in_memory").
    fn name(&self) -> &str;

    // --- Macro table ---

    /// Insert or replace a macro by id.
    async fn put_macro(&self, item: &Macro) -> StoreResult<()>;
    async fn get_macro(&self, id: &str) -> StoreResult<Option<Macro>>;
    /// All macros, oldest first.
    async fn list_macros(&self) -> StoreResult<Vec<Macro>>;
    async fn delete_macro(&self, id: &str) -> StoreResult<bool>;

    // --- History append log ---

    /// Append an entry whose `seq` and `timestamp` are already stamped.
    async fn append_history(&self, entry: &HistoryEntry) -> StoreResult<()>;
    /// Most recent entry, if any.
    async fn last_history(&self) -> StoreResult<Option<HistoryEntry>>;
    /// The last `n` entries in timestamp order.
    async fn recent_history(&self, n: usize) -> StoreResult<Vec<HistoryEntry>>;
    /// Entries with `from <= timestamp <= to`, in timestamp order.
    async fn history_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> StoreResult<Vec<HistoryEntry>>;
    /// Up to `limit` entries with `seq > after_seq` and
    /// `from <= timestamp <= to`, in sequence order.
    async fn history_page(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        after_seq: u64,
        limit: usize,
    ) -> StoreResult<Vec<HistoryEntry>>;

    // --- Session table ---

    async fn put_session(&self, session: &ExecutionSession) -> StoreResult<()>;
    async fn get_session(&self, id: &str) -> StoreResult<Option<ExecutionSession>>;
    /// All sessions, oldest first.
    async fn list_sessions(&self) -> StoreResult<Vec<ExecutionSession>>;
    /// Remove terminal sessions that finished before `before`.
    async fn purge_sessions(&self, before: DateTime<Utc>) -> StoreResult<usize>;

    // --- Schedules ---

    async fn put_schedule(&self, item: &ScheduledItem) -> StoreResult<()>;
    async fn list_schedules(&self) -> StoreResult<Vec<ScheduledItem>>;
    async fn delete_schedule(&self, id: &str) -> StoreResult<bool>;

    // --- Runner singleton ---

    async fn load_runner_state(&self) -> StoreResult<Option<RunnerState>>;
    async fn save_runner_state(&self, state: &RunnerState) -> StoreResult<()>;
}
