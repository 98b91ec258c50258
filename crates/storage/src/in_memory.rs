//! In-memory backend: useful for testing and ephemeral sessions.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use stepwise_core::error::StorageError;
use stepwise_core::{
    ExecutionSession, HistoryEntry, Macro, RunnerState, ScheduledItem, StateStore,
};
use tokio::sync::RwLock;

#[derive(Default)]
struct Tables {
    macros: HashMap<String, Macro>,
    history: Vec<HistoryEntry>,
    sessions: HashMap<String, ExecutionSession>,
    schedules: HashMap<String, ScheduledItem>,
    runner: Option<RunnerState>,
}

/// An in-memory store. Nothing survives the process.
pub struct InMemoryStore {
    tables: Arc<RwLock<Tables>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            tables: Arc::new(RwLock::new(Tables::default())),
        }
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StateStore for InMemoryStore {
    fn name(&self) -> &str {
        "in_memory"
    }

    async fn put_macro(&self, item: &Macro) -> Result<(), StorageError> {
        self.tables
            .write()
            .await
            .macros
            .insert(item.id.clone(), item.clone());
        Ok(())
    }

    async fn get_macro(&self, id: &str) -> Result<Option<Macro>, StorageError> {
        Ok(self.tables.read().await.macros.get(id).cloned())
    }

    async fn list_macros(&self) -> Result<Vec<Macro>, StorageError> {
        let mut macros: Vec<Macro> = self.tables.read().await.macros.values().cloned().collect();
        macros.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(macros)
    }

    async fn delete_macro(&self, id: &str) -> Result<bool, StorageError> {
        Ok(self.tables.write().await.macros.remove(id).is_some())
    }

    async fn append_history(&self, entry: &HistoryEntry) -> Result<(), StorageError> {
        self.tables.write().await.history.push(entry.clone());
        Ok(())
    }

    async fn last_history(&self) -> Result<Option<HistoryEntry>, StorageError> {
        Ok(self.tables.read().await.history.last().cloned())
    }

    async fn recent_history(&self, n: usize) -> Result<Vec<HistoryEntry>, StorageError> {
        let tables = self.tables.read().await;
        let start = tables.history.len().saturating_sub(n);
        Ok(tables.history[start..].to_vec())
    }

    async fn history_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<HistoryEntry>, StorageError> {
        let tables = self.tables.read().await;
        // Appends are timestamp-ordered, so both bounds can be binary searched
        let start = tables.history.partition_point(|e| e.timestamp < from);
        let end = tables.history.partition_point(|e| e.timestamp <= to);
        Ok(tables.history[start..end.max(start)].to_vec())
    }

    async fn history_page(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        after_seq: u64,
        limit: usize,
    ) -> Result<Vec<HistoryEntry>, StorageError> {
        let tables = self.tables.read().await;
        let start = tables
            .history
            .partition_point(|e| e.timestamp < from || e.seq <= after_seq);
        Ok(tables.history[start..]
            .iter()
            .take_while(|e| e.timestamp <= to)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn put_session(&self, session: &ExecutionSession) -> Result<(), StorageError> {
        self.tables
            .write()
            .await
            .sessions
            .insert(session.id.clone(), session.clone());
        Ok(())
    }

    async fn get_session(&self, id: &str) -> Result<Option<ExecutionSession>, StorageError> {
        Ok(self.tables.read().await.sessions.get(id).cloned())
    }

    async fn list_sessions(&self) -> Result<Vec<ExecutionSession>, StorageError> {
        let mut sessions: Vec<ExecutionSession> =
            self.tables.read().await.sessions.values().cloned().collect();
        sessions.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(sessions)
    }

    async fn purge_sessions(&self, before: DateTime<Utc>) -> Result<usize, StorageError> {
        let mut tables = self.tables.write().await;
        let len_before = tables.sessions.len();
        tables.sessions.retain(|_, s| {
            !(s.status.is_terminal() && s.finished_at.is_some_and(|f| f < before))
        });
        Ok(len_before - tables.sessions.len())
    }

    async fn put_schedule(&self, item: &ScheduledItem) -> Result<(), StorageError> {
        self.tables
            .write()
            .await
            .schedules
            .insert(item.id.clone(), item.clone());
        Ok(())
    }

    async fn list_schedules(&self) -> Result<Vec<ScheduledItem>, StorageError> {
        let mut items: Vec<ScheduledItem> =
            self.tables.read().await.schedules.values().cloned().collect();
        items.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.id.cmp(&b.id)));
        Ok(items)
    }

    async fn delete_schedule(&self, id: &str) -> Result<bool, StorageError> {
        Ok(self.tables.write().await.schedules.remove(id).is_some())
    }

    async fn load_runner_state(&self) -> Result<Option<RunnerState>, StorageError> {
        Ok(self.tables.read().await.runner.clone())
    }

    async fn save_runner_state(&self, state: &RunnerState) -> Result<(), StorageError> {
        self.tables.write().await.runner = Some(state.clone());
        Ok(())
    }
}
