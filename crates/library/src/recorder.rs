//! The capture session that turns live actions into a macro.
//!
//! One recorder per process. The `Idle`/`Recording` state is the only
//! guard against a second concurrent recording; there is no separate lock.
//! The recorder never performs actions itself, it only listens.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use stepwise_core::{
    Clock, DomainEvent, Error, EventBus, HistoryEntry, Macro, Outcome, Result, Step,
};
use stepwise_storage::HistoryLog;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::macro_store::MacroStore;

#[derive(Debug)]
enum State {
    Idle,
    Recording {
        started_at: DateTime<Utc>,
        buffer: Vec<Step>,
    },
}

/// Result of [`Recorder::stop`].
#[derive(Debug)]
pub enum StopOutcome {
    Saved(Macro),
    /// Nothing was captured, so no macro was created.
    Empty,
}

/// An action as it landed in history.
#[derive(Debug, Clone)]
pub struct Observed {
    pub entry: HistoryEntry,
    /// Whether the step went into the recording buffer.
    pub captured: bool,
}

pub struct Recorder {
    state: Mutex<State>,
    macros: Arc<MacroStore>,
    history: Arc<HistoryLog>,
    events: Arc<EventBus>,
    skip_failed: bool,
}

impl Recorder {
    pub fn new(macros: Arc<MacroStore>, history: Arc<HistoryLog>, events: Arc<EventBus>) -> Self {
        Self {
            state: Mutex::new(State::Idle),
            macros,
            history,
            events,
            skip_failed: false,
        }
    }

    /// Keep failed actions out of the draft. Off by default.
    pub fn with_skip_failed(mut self, skip_failed: bool) -> Self {
        self.skip_failed = skip_failed;
        self
    }

    pub async fn is_recording(&self) -> bool {
        matches!(*self.state.lock().await, State::Recording { .. })
    }

    pub async fn start(&self) -> Result<()> {
        let mut state = self.state.lock().await;
        if matches!(*state, State::Recording { .. }) {
            return Err(Error::AlreadyRecording);
        }
        let started_at = self.history.clock().now();
        *state = State::Recording {
            started_at,
            buffer: Vec::new(),
        };
        info!("Recording started");
        self.events.publish(DomainEvent::RecordingStarted {
            timestamp: started_at,
        });
        Ok(())
    }

    /// Log an externally performed action. It always goes to history; while
    /// recording it is also captured into the draft, unless it failed and
    /// the recorder skips failures.
    pub async fn observe(&self, step: Step, outcome: Outcome) -> Result<Observed> {
        let mut state = self.state.lock().await;
        let entry = self
            .history
            .append(HistoryEntry::pending(&step, outcome, None))
            .await?;

        let captured = match &mut *state {
            State::Recording { buffer, .. } if entry.outcome.is_ok() || !self.skip_failed => {
                buffer.push(step);
                debug!(tool = %entry.tool, buffered = buffer.len(), "Captured step");
                true
            }
            _ => false,
        };
        Ok(Observed { entry, captured })
    }

    /// Finish recording. A non-empty buffer becomes a new active macro; if
    /// that fails the recording stays open so nothing is lost.
    pub async fn stop(
        &self,
        name: impl Into<String>,
        description: impl Into<String>,
    ) -> Result<StopOutcome> {
        let mut state = self.state.lock().await;
        let (started_at, buffer) = match std::mem::replace(&mut *state, State::Idle) {
            State::Recording { started_at, buffer } => (started_at, buffer),
            State::Idle => return Err(Error::NotRecording),
        };

        if buffer.is_empty() {
            info!("Recording stopped with nothing captured");
            self.publish_stopped(0, None);
            return Ok(StopOutcome::Empty);
        }

        match self.macros.create(name, description, buffer.clone()).await {
            Ok(saved) => {
                info!(macro_id = %saved.id, steps = buffer.len(), "Recording saved");
                self.publish_stopped(buffer.len(), Some(saved.id.clone()));
                Ok(StopOutcome::Saved(saved))
            }
            Err(e) => {
                *state = State::Recording { started_at, buffer };
                Err(e)
            }
        }
    }

    /// Drop the buffer without creating a macro. Returns how many steps were
    /// discarded.
    pub async fn cancel(&self) -> Result<usize> {
        let mut state = self.state.lock().await;
        match std::mem::replace(&mut *state, State::Idle) {
            State::Recording { buffer, .. } => {
                info!(discarded = buffer.len(), "Recording cancelled");
                self.publish_stopped(0, None);
                Ok(buffer.len())
            }
            State::Idle => Err(Error::NotRecording),
        }
    }

    fn publish_stopped(&self, steps: usize, macro_id: Option<String>) {
        self.events.publish(DomainEvent::RecordingStopped {
            steps,
            macro_id,
            timestamp: self.history.clock().now(),
        });
    }
}
