//! SQLite backend.
//!
//! One database file with five tables:
//! - `macros`: macro documents (JSON)
//! - `history`: the append-only action log, one row per action
//! - `sessions`: execution sessions including their terminal logs
//! - `schedules`: runner schedule items
//! - `runner_state`: single-row runner singleton
//!
//! Timestamps are stored as fixed-width RFC 3339 strings (microseconds, `Z`)
//! so lexical order matches chronological order.

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::de::DeserializeOwned;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Row, SqlitePool};
use std::path::Path;
use std::str::FromStr;
use stepwise_core::error::StorageError;
use stepwise_core::{
    ExecutionSession, HistoryEntry, Macro, RunnerState, ScheduledItem, StateStore,
};
use tracing::{debug, info};

/// A production SQLite state store.
pub struct SqliteStore {
    pool: SqlitePool,
}

fn ts(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_ts(key: &str, s: &str) -> Result<DateTime<Utc>, StorageError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StorageError::Corrupt {
            key: key.to_string(),
            reason: format!("bad timestamp '{s}': {e}"),
        })
}

fn decode<T: DeserializeOwned>(key: &str, doc: &str) -> Result<T, StorageError> {
    serde_json::from_str(doc).map_err(|e| StorageError::Corrupt {
        key: key.to_string(),
        reason: e.to_string(),
    })
}

fn encode<T: serde::Serialize>(key: &str, value: &T) -> Result<String, StorageError> {
    serde_json::to_string(value).map_err(|e| StorageError::Corrupt {
        key: key.to_string(),
        reason: e.to_string(),
    })
}

fn backend(context: &str) -> impl FnOnce(sqlx::Error) -> StorageError + '_ {
    move |e| StorageError::Backend(format!("{context}: {e}"))
}

impl SqliteStore {
    /// Open (or create) the database at `path` and run migrations.
    pub async fn open(path: &Path) -> Result<Self, StorageError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| {
                StorageError::Backend(format!("create {}: {e}", parent.display()))
            })?;
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal);

        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await
            .map_err(backend("open SQLite"))?;

        let store = Self { pool };
        store.run_migrations().await?;
        info!("SQLite state store initialized at {}", path.display());
        Ok(store)
    }

    /// Ephemeral database living in a single connection.
    pub async fn in_memory() -> Result<Self, StorageError> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")
            .map_err(backend("in-memory options"))?;
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .map_err(backend("open SQLite"))?;
        let store = Self { pool };
        store.run_migrations().await?;
        Ok(store)
    }

    /// Create tables and indexes.
    async fn run_migrations(&self) -> Result<(), StorageError> {
        let statements = [
            (
                "macros table",
                r#"
                CREATE TABLE IF NOT EXISTS macros (
                    id          TEXT PRIMARY KEY NOT NULL,
                    doc         TEXT NOT NULL,
                    created_at  TEXT NOT NULL
                )
                "#,
            ),
            (
                "history table",
                r#"
                CREATE TABLE IF NOT EXISTS history (
                    seq         INTEGER PRIMARY KEY,
                    tool        TEXT NOT NULL,
                    params      TEXT NOT NULL DEFAULT '{}',
                    outcome     TEXT NOT NULL,
                    session_id  TEXT,
                    timestamp   TEXT NOT NULL
                )
                "#,
            ),
            (
                "history timestamp index",
                "CREATE INDEX IF NOT EXISTS idx_history_timestamp ON history(timestamp)",
            ),
            (
                "sessions table",
                r#"
                CREATE TABLE IF NOT EXISTS sessions (
                    id           TEXT PRIMARY KEY NOT NULL,
                    status       TEXT NOT NULL,
                    doc          TEXT NOT NULL,
                    created_at   TEXT NOT NULL,
                    finished_at  TEXT
                )
                "#,
            ),
            (
                "schedules table",
                r#"
                CREATE TABLE IF NOT EXISTS schedules (
                    id    TEXT PRIMARY KEY NOT NULL,
                    name  TEXT NOT NULL,
                    doc   TEXT NOT NULL
                )
                "#,
            ),
            (
                "runner_state table",
                r#"
                CREATE TABLE IF NOT EXISTS runner_state (
                    id   INTEGER PRIMARY KEY CHECK (id = 1),
                    doc  TEXT NOT NULL
                )
                "#,
            ),
        ];

        for (what, sql) in statements {
            sqlx::query(sql)
                .execute(&self.pool)
                .await
                .map_err(|e| StorageError::Migration(format!("{what}: {e}")))?;
        }

        debug!("SQLite migrations complete");
        Ok(())
    }

    fn row_to_history(row: &sqlx::sqlite::SqliteRow) -> Result<HistoryEntry, StorageError> {
        let seq: i64 = row.try_get("seq").map_err(backend("seq column"))?;
        let key = format!("history#{seq}");
        let tool: String = row.try_get("tool").map_err(backend("tool column"))?;
        let params: String = row.try_get("params").map_err(backend("params column"))?;
        let outcome: String = row.try_get("outcome").map_err(backend("outcome column"))?;
        let session_id: Option<String> =
            row.try_get("session_id").map_err(backend("session_id column"))?;
        let timestamp: String = row.try_get("timestamp").map_err(backend("timestamp column"))?;

        Ok(HistoryEntry {
            seq: seq as u64,
            tool,
            params: decode(&key, &params)?,
            outcome: decode(&key, &outcome)?,
            session_id,
            timestamp: parse_ts(&key, &timestamp)?,
        })
    }

    fn docs<T: DeserializeOwned>(
        rows: &[sqlx::sqlite::SqliteRow],
        table: &str,
    ) -> Result<Vec<T>, StorageError> {
        rows.iter()
            .map(|row| {
                let id: String = row.try_get("id").map_err(backend("id column"))?;
                let doc: String = row.try_get("doc").map_err(backend("doc column"))?;
                decode(&format!("{table}/{id}"), &doc)
            })
            .collect()
    }
}

#[async_trait]
impl StateStore for SqliteStore {
    fn name(&self) -> &str {
        "sqlite"
    }

    async fn put_macro(&self, item: &Macro) -> Result<(), StorageError> {
        let doc = encode(&item.id, item)?;
        sqlx::query(
            r#"
            INSERT INTO macros (id, doc, created_at) VALUES (?1, ?2, ?3)
            ON CONFLICT(id) DO UPDATE SET doc = excluded.doc
            "#,
        )
        .bind(&item.id)
        .bind(&doc)
        .bind(ts(&item.created_at))
        .execute(&self.pool)
        .await
        .map_err(backend("upsert macro"))?;
        debug!(macro_id = %item.id, "Stored macro");
        Ok(())
    }

    async fn get_macro(&self, id: &str) -> Result<Option<Macro>, StorageError> {
        let rows = sqlx::query("SELECT id, doc FROM macros WHERE id = ?1")
            .bind(id)
            .fetch_all(&self.pool)
            .await
            .map_err(backend("select macro"))?;
        Ok(Self::docs(&rows, "macros")?.into_iter().next())
    }

    async fn list_macros(&self) -> Result<Vec<Macro>, StorageError> {
        let rows = sqlx::query("SELECT id, doc FROM macros ORDER BY created_at, id")
            .fetch_all(&self.pool)
            .await
            .map_err(backend("list macros"))?;
        Self::docs(&rows, "macros")
    }

    async fn delete_macro(&self, id: &str) -> Result<bool, StorageError> {
        let result = sqlx::query("DELETE FROM macros WHERE id = ?1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(backend("delete macro"))?;
        Ok(result.rows_affected() > 0)
    }

    async fn append_history(&self, entry: &HistoryEntry) -> Result<(), StorageError> {
        let key = format!("history#{}", entry.seq);
        sqlx::query(
            r#"
            INSERT INTO history (seq, tool, params, outcome, session_id, timestamp)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
        )
        .bind(entry.seq as i64)
        .bind(&entry.tool)
        .bind(encode(&key, &entry.params)?)
        .bind(encode(&key, &entry.outcome)?)
        .bind(&entry.session_id)
        .bind(ts(&entry.timestamp))
        .execute(&self.pool)
        .await
        .map_err(backend("append history"))?;
        Ok(())
    }

    async fn last_history(&self) -> Result<Option<HistoryEntry>, StorageError> {
        let row = sqlx::query("SELECT * FROM history ORDER BY seq DESC LIMIT 1")
            .fetch_optional(&self.pool)
            .await
            .map_err(backend("last history"))?;
        row.as_ref().map(Self::row_to_history).transpose()
    }

    async fn recent_history(&self, n: usize) -> Result<Vec<HistoryEntry>, StorageError> {
        let rows = sqlx::query(
            "SELECT * FROM (SELECT * FROM history ORDER BY seq DESC LIMIT ?1) ORDER BY seq ASC",
        )
        .bind(n as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(backend("recent history"))?;
        rows.iter().map(Self::row_to_history).collect()
    }

    async fn history_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<HistoryEntry>, StorageError> {
        let rows = sqlx::query(
            "SELECT * FROM history WHERE timestamp >= ?1 AND timestamp <= ?2 ORDER BY seq ASC",
        )
        .bind(ts(&from))
        .bind(ts(&to))
        .fetch_all(&self.pool)
        .await
        .map_err(backend("history range"))?;
        rows.iter().map(Self::row_to_history).collect()
    }

    async fn history_page(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        after_seq: u64,
        limit: usize,
    ) -> Result<Vec<HistoryEntry>, StorageError> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM history
            WHERE seq > ?1 AND timestamp >= ?2 AND timestamp <= ?3
            ORDER BY seq ASC
            LIMIT ?4
            "#,
        )
        .bind(after_seq as i64)
        .bind(ts(&from))
        .bind(ts(&to))
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(backend("history page"))?;
        rows.iter().map(Self::row_to_history).collect()
    }

    async fn put_session(&self, session: &ExecutionSession) -> Result<(), StorageError> {
        let doc = encode(&session.id, session)?;
        sqlx::query(
            r#"
            INSERT INTO sessions (id, status, doc, created_at, finished_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            ON CONFLICT(id) DO UPDATE SET
                status = excluded.status,
                doc = excluded.doc,
                finished_at = excluded.finished_at
            "#,
        )
        .bind(&session.id)
        .bind(session.status.as_str())
        .bind(&doc)
        .bind(ts(&session.created_at))
        .bind(session.finished_at.as_ref().map(ts))
        .execute(&self.pool)
        .await
        .map_err(backend("upsert session"))?;
        Ok(())
    }

    async fn get_session(&self, id: &str) -> Result<Option<ExecutionSession>, StorageError> {
        let rows = sqlx::query("SELECT id, doc FROM sessions WHERE id = ?1")
            .bind(id)
            .fetch_all(&self.pool)
            .await
            .map_err(backend("select session"))?;
        Ok(Self::docs(&rows, "sessions")?.into_iter().next())
    }

    async fn list_sessions(&self) -> Result<Vec<ExecutionSession>, StorageError> {
        let rows = sqlx::query("SELECT id, doc FROM sessions ORDER BY created_at, id")
            .fetch_all(&self.pool)
            .await
            .map_err(backend("list sessions"))?;
        Self::docs(&rows, "sessions")
    }

    async fn purge_sessions(&self, before: DateTime<Utc>) -> Result<usize, StorageError> {
        let result = sqlx::query(
            r#"
            DELETE FROM sessions
            WHERE status IN ('succeeded', 'failed', 'cancelled')
              AND finished_at IS NOT NULL
              AND finished_at < ?1
            "#,
        )
        .bind(ts(&before))
        .execute(&self.pool)
        .await
        .map_err(backend("purge sessions"))?;
        Ok(result.rows_affected() as usize)
    }

    async fn put_schedule(&self, item: &ScheduledItem) -> Result<(), StorageError> {
        let doc = encode(&item.id, item)?;
        sqlx::query(
            r#"
            INSERT INTO schedules (id, name, doc) VALUES (?1, ?2, ?3)
            ON CONFLICT(id) DO UPDATE SET name = excluded.name, doc = excluded.doc
            "#,
        )
        .bind(&item.id)
        .bind(&item.name)
        .bind(&doc)
        .execute(&self.pool)
        .await
        .map_err(backend("upsert schedule"))?;
        Ok(())
    }

    async fn list_schedules(&self) -> Result<Vec<ScheduledItem>, StorageError> {
        let rows = sqlx::query("SELECT id, doc FROM schedules ORDER BY name, id")
            .fetch_all(&self.pool)
            .await
            .map_err(backend("list schedules"))?;
        Self::docs(&rows, "schedules")
    }

    async fn delete_schedule(&self, id: &str) -> Result<bool, StorageError> {
        let result = sqlx::query("DELETE FROM schedules WHERE id = ?1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(backend("delete schedule"))?;
        Ok(result.rows_affected() > 0)
    }

    async fn load_runner_state(&self) -> Result<Option<RunnerState>, StorageError> {
        let row = sqlx::query("SELECT doc FROM runner_state WHERE id = 1")
            .fetch_optional(&self.pool)
            .await
            .map_err(backend("load runner state"))?;
        match row {
            Some(row) => {
                let doc: String = row.try_get("doc").map_err(backend("doc column"))?;
                Ok(Some(decode("runner_state", &doc)?))
            }
            None => Ok(None),
        }
    }

    async fn save_runner_state(&self, state: &RunnerState) -> Result<(), StorageError> {
        let doc = encode("runner_state", state)?;
        sqlx::query(
            r#"
            INSERT INTO runner_state (id, doc) VALUES (1, ?1)
            ON CONFLICT(id) DO UPDATE SET doc = excluded.doc
            "#,
        )
        .bind(&doc)
        .execute(&self.pool)
        .await
        .map_err(backend("save runner state"))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use stepwise_core::{
        MacroSettings, MacroStatus, Outcome, SessionStatus, SessionTarget, Step,
    };

    async fn open_temp() -> (tempfile::TempDir, SqliteStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteStore::open(&dir.path().join("state.db")).await.unwrap();
        (dir, store)
    }

    fn entry(seq: u64, tool: &str, at: DateTime<Utc>) -> HistoryEntry {
        let mut e = HistoryEntry::pending(
            &Step::new(tool).with_param("selector", "#x"),
            Outcome::Ok,
            Some("s1".into()),
        );
        e.seq = seq;
        e.timestamp = at;
        e
    }

    #[tokio::test]
    async fn macro_roundtrip_preserves_steps_and_settings() {
        let (_dir, store) = open_temp().await;
        let now = Utc::now();
        let m = Macro {
            id: "m1".into(),
            name: "login".into(),
            description: "log into the portal".into(),
            steps: vec![
                Step::new("click").with_param("selector", "#login"),
                Step::new("type").with_param("selector", "#user").with_param("text", "a"),
            ],
            settings: MacroSettings { speed: 2.0, loops: 3, continue_on_error: true },
            status: MacroStatus::Active,
            created_at: now,
            updated_at: now,
        };
        store.put_macro(&m).await.unwrap();
        let loaded = store.get_macro("m1").await.unwrap().unwrap();
        assert_eq!(loaded.steps, m.steps);
        assert_eq!(loaded.settings, m.settings);
        assert_eq!(store.list_macros().await.unwrap().len(), 1);
        assert!(store.delete_macro("m1").await.unwrap());
        assert!(store.get_macro("m1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn history_ordering_and_ranges() {
        let (_dir, store) = open_temp().await;
        let t0 = Utc::now();
        for i in 0..4u64 {
            store
                .append_history(&entry(i + 1, "click", t0 + Duration::milliseconds(i as i64)))
                .await
                .unwrap();
        }
        let last = store.last_history().await.unwrap().unwrap();
        assert_eq!(last.seq, 4);
        assert_eq!(last.session_id.as_deref(), Some("s1"));

        let recent = store.recent_history(3).await.unwrap();
        assert_eq!(recent.iter().map(|e| e.seq).collect::<Vec<_>>(), vec![2, 3, 4]);

        let between = store
            .history_between(t0 + Duration::milliseconds(1), t0 + Duration::milliseconds(2))
            .await
            .unwrap();
        assert_eq!(between.iter().map(|e| e.seq).collect::<Vec<_>>(), vec![2, 3]);

        let (from, to) = (t0 - Duration::seconds(1), t0 + Duration::seconds(1));
        let page = store.history_page(from, to, 0, 3).await.unwrap();
        assert_eq!(page.iter().map(|e| e.seq).collect::<Vec<_>>(), vec![1, 2, 3]);
        let page = store.history_page(from, to, 3, 3).await.unwrap();
        assert_eq!(page.iter().map(|e| e.seq).collect::<Vec<_>>(), vec![4]);
        assert!(store.history_page(from, to, 4, 3).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn sessions_and_purge() {
        let (_dir, store) = open_temp().await;
        let now = Utc::now();
        let target = SessionTarget::Macro { macro_id: "m".into(), speed: 1.0, loops: 1 };
        let mut old = ExecutionSession::new("old", target.clone(), now - Duration::hours(3));
        old.status = SessionStatus::Cancelled;
        old.finished_at = Some(now - Duration::hours(2));
        let live = ExecutionSession::new("live", target, now);
        store.put_session(&old).await.unwrap();
        store.put_session(&live).await.unwrap();

        assert_eq!(store.list_sessions().await.unwrap().len(), 2);
        assert_eq!(store.purge_sessions(now - Duration::hours(1)).await.unwrap(), 1);
        assert!(store.get_session("old").await.unwrap().is_none());
        assert_eq!(
            store.get_session("live").await.unwrap().unwrap().status,
            SessionStatus::Pending
        );
    }

    #[tokio::test]
    async fn runner_state_singleton() {
        let store = SqliteStore::in_memory().await.unwrap();
        let mut state = RunnerState::default();
        store.save_runner_state(&state).await.unwrap();
        state.running = true;
        state.last_tick = Some(Utc::now());
        store.save_runner_state(&state).await.unwrap();
        assert_eq!(store.load_runner_state().await.unwrap(), Some(state));
    }
}
