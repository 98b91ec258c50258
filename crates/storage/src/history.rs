//! The append-only action log.
//!
//! Every action (recorded, manual, macro step, autonomous step) goes through
//! [`HistoryLog::append`], which stamps a sequence number and a timestamp that
//! is strictly greater than the previous entry's. Timestamps are truncated to
//! microseconds so they survive a round trip through the store unchanged.

use chrono::{DateTime, Duration, SubsecRound, Utc};
use std::ops::Deref;
use std::sync::Arc;
use stepwise_core::error::StorageError;
use stepwise_core::{Clock, HistoryEntry, StateStore};
use tokio::sync::Mutex;
use tracing::debug;

/// An immutable, cheaply clonable slice of history.
///
/// Can be iterated any number of times; the miner and the planner both
/// borrow it as `&[HistoryEntry]`.
#[derive(Debug, Clone, Default)]
pub struct HistoryWindow {
    entries: Arc<[HistoryEntry]>,
}

impl HistoryWindow {
    pub fn new(entries: Vec<HistoryEntry>) -> Self {
        Self {
            entries: entries.into(),
        }
    }

    pub fn as_slice(&self) -> &[HistoryEntry] {
        &self.entries
    }
}

impl Deref for HistoryWindow {
    type Target = [HistoryEntry];

    fn deref(&self) -> &[HistoryEntry] {
        &self.entries
    }
}

impl<'a> IntoIterator for &'a HistoryWindow {
    type Item = &'a HistoryEntry;
    type IntoIter = std::slice::Iter<'a, HistoryEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

/// Sequence/timestamp cursor, loaded lazily from the store.
#[derive(Debug, Clone, Copy)]
struct Cursor {
    seq: u64,
    timestamp: Option<DateTime<Utc>>,
}

pub struct HistoryLog {
    store: Arc<dyn StateStore>,
    clock: Arc<dyn Clock>,
    cursor: Mutex<Option<Cursor>>,
}

impl HistoryLog {
    pub fn new(store: Arc<dyn StateStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            clock,
            cursor: Mutex::new(None),
        }
    }

    /// Stamp and persist an entry. Returns the entry as stored.
    pub async fn append(&self, mut entry: HistoryEntry) -> Result<HistoryEntry, StorageError> {
        let mut guard = self.cursor.lock().await;
        let cursor = match *guard {
            Some(c) => c,
            None => {
                let last = self.store.last_history().await?;
                Cursor {
                    seq: last.as_ref().map(|e| e.seq).unwrap_or(0),
                    timestamp: last.map(|e| e.timestamp),
                }
            }
        };

        let mut timestamp = self.clock.now().trunc_subsecs(6);
        if let Some(prev) = cursor.timestamp {
            if timestamp <= prev {
                timestamp = prev + Duration::microseconds(1);
            }
        }

        entry.seq = cursor.seq + 1;
        entry.timestamp = timestamp;
        self.store.append_history(&entry).await?;

        *guard = Some(Cursor {
            seq: entry.seq,
            timestamp: Some(timestamp),
        });
        debug!(seq = entry.seq, tool = %entry.tool, "History appended");
        Ok(entry)
    }

    /// The last `n` entries, oldest first. The whole window is loaded, so
    /// memory is bounded by `n`.
    pub async fn recent(&self, n: usize) -> Result<HistoryWindow, StorageError> {
        Ok(HistoryWindow::new(self.store.recent_history(n).await?))
    }

    /// Entries with `from <= timestamp <= to`, loaded at once. Use
    /// [`HistoryLog::scan`] for ranges that may be large.
    pub async fn between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<HistoryWindow, StorageError> {
        Ok(HistoryWindow::new(self.store.history_between(from, to).await?))
    }

    /// Walk `from <= timestamp <= to` lazily, `page_size` entries per fetch.
    pub fn scan(&self, from: DateTime<Utc>, to: DateTime<Utc>, page_size: usize) -> HistoryScan {
        HistoryScan {
            store: self.store.clone(),
            from,
            to,
            page_size: page_size.max(1),
            after_seq: 0,
        }
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }
}

/// A lazy, restartable pass over a time range of history.
///
/// Each [`HistoryScan::next_page`] fetches one page from the store, so
/// entries appended behind the cursor during the scan are picked up.
pub struct HistoryScan {
    store: Arc<dyn StateStore>,
    from: DateTime<Utc>,
    to: DateTime<Utc>,
    page_size: usize,
    after_seq: u64,
}

impl HistoryScan {
    /// The next page, or `None` once the range is exhausted.
    pub async fn next_page(&mut self) -> Result<Option<HistoryWindow>, StorageError> {
        let page = self
            .store
            .history_page(self.from, self.to, self.after_seq, self.page_size)
            .await?;
        let Some(last) = page.last() else {
            return Ok(None);
        };
        self.after_seq = last.seq;
        Ok(Some(HistoryWindow::new(page)))
    }

    /// Start again from the beginning of the range.
    pub fn rewind(&mut self) {
        self.after_seq = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::InMemoryStore;
    use chrono::TimeZone;
    use stepwise_core::{ManualClock, Outcome, Step};

    fn pending(tool: &str) -> HistoryEntry {
        HistoryEntry::pending(&Step::new(tool), Outcome::Ok, None)
    }

    #[tokio::test]
    async fn frozen_clock_still_yields_increasing_timestamps() {
        let store: Arc<dyn StateStore> = Arc::new(InMemoryStore::new());
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let log = HistoryLog::new(store, clock);

        let a = log.append(pending("click")).await.unwrap();
        let b = log.append(pending("type")).await.unwrap();
        let c = log.append(pending("submit")).await.unwrap();

        assert_eq!((a.seq, b.seq, c.seq), (1, 2, 3));
        assert!(a.timestamp < b.timestamp);
        assert!(b.timestamp < c.timestamp);
    }

    #[tokio::test]
    async fn resumes_sequence_from_existing_store() {
        let store: Arc<dyn StateStore> = Arc::new(InMemoryStore::new());
        let clock: Arc<dyn Clock> = Arc::new(ManualClock::new(Utc::now()));

        let first = HistoryLog::new(store.clone(), clock.clone());
        first.append(pending("click")).await.unwrap();
        first.append(pending("click")).await.unwrap();

        let second = HistoryLog::new(store, clock);
        let next = second.append(pending("scroll")).await.unwrap();
        assert_eq!(next.seq, 3);
    }

    #[tokio::test]
    async fn window_is_reiterable() {
        let store: Arc<dyn StateStore> = Arc::new(InMemoryStore::new());
        let start = Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap();
        let clock = Arc::new(ManualClock::new(start));
        let log = HistoryLog::new(store, clock.clone());
        for tool in ["a", "b", "c"] {
            log.append(pending(tool)).await.unwrap();
            clock.advance(Duration::seconds(1));
        }

        let window = log.between(start, clock.now()).await.unwrap();
        let once: Vec<_> = window.iter().map(|e| e.tool.clone()).collect();
        let twice: Vec<_> = (&window).into_iter().map(|e| e.tool.clone()).collect();
        assert_eq!(once, vec!["a", "b", "c"]);
        assert_eq!(once, twice);

        let recent = log.recent(2).await.unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[1].tool, "c");
    }

    #[tokio::test]
    async fn scan_pages_through_a_range_and_rewinds() {
        let store: Arc<dyn StateStore> = Arc::new(InMemoryStore::new());
        let start = Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap();
        let clock = Arc::new(ManualClock::new(start));
        let log = HistoryLog::new(store, clock.clone());
        for tool in ["a", "b", "c", "d", "e"] {
            log.append(pending(tool)).await.unwrap();
            clock.advance(Duration::seconds(1));
        }

        let mut scan = log.scan(start + Duration::seconds(1), start + Duration::seconds(3), 2);
        let mut pages = Vec::new();
        while let Some(page) = scan.next_page().await.unwrap() {
            pages.push(page.iter().map(|e| e.tool.clone()).collect::<Vec<_>>());
        }
        assert_eq!(pages, vec![vec!["b", "c"], vec!["d"]]);

        scan.rewind();
        let first = scan.next_page().await.unwrap().unwrap();
        assert_eq!(first[0].tool, "b");
    }
}
