//! Domain event system: lets UIs and loggers follow sessions and recordings
//! without polling.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;

use crate::session::{RecoveryStrategy, SessionStatus};

/// All domain events in the system.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum DomainEvent {
    /// A run was accepted and placed on the worker queue
    SessionQueued {
        session_id: String,
        queue_depth: usize,
        timestamp: DateTime<Utc>,
    },

    /// A session changed status
    SessionStatusChanged {
        session_id: String,
        status: SessionStatus,
        timestamp: DateTime<Utc>,
    },

    /// An action was executed
    StepExecuted {
        session_id: String,
        tool: String,
        success: bool,
        duration_ms: u64,
        timestamp: DateTime<Utc>,
    },

    /// A recovery strategy was tried
    RecoveryAttempted {
        session_id: String,
        attempt: u32,
        strategy: RecoveryStrategy,
        timestamp: DateTime<Utc>,
    },

    RecordingStarted {
        timestamp: DateTime<Utc>,
    },

    RecordingStopped {
        steps: usize,
        macro_id: Option<String>,
        timestamp: DateTime<Utc>,
    },

    /// The runner evaluated its schedules
    RunnerTicked {
        started: usize,
        skipped: usize,
        timestamp: DateTime<Utc>,
    },
}

/// A broadcast-based event bus for domain events.
///
/// Uses `tokio::sync::broadcast` for multi-consumer pub/sub.
pub struct EventBus {
    sender: broadcast::Sender<Arc<DomainEvent>>,
}

impl EventBus {
    /// Create a new event bus with the given capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event to all subscribers.
    pub fn publish(&self, event: DomainEvent) {
        // No subscribers is fine
        let _ = self.sender.send(Arc::new(event));
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Arc<DomainEvent>> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}
