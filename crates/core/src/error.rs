//! Error types for the stepwise domain.
//!
//! Uses `thiserror` for ergonomic error definitions. Caller-facing failures
//! live in [`Error`]; failures that happen inside a running session are
//! [`ExecutionError`]s and end up on the session record instead.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The top-level error type returned synchronously to callers.
#[derive(Debug, Error)]
pub enum Error {
    /// Malformed macro or step, rejected before persistence.
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    #[error("Index {index} out of range for {len} steps")]
    Range { index: usize, len: usize },

    #[error("A recording session is already in progress")]
    AlreadyRecording,

    #[error("No recording session is in progress")]
    NotRecording,

    #[error("Session {id} is {status}, cannot {action}")]
    InvalidState {
        id: String,
        status: String,
        action: &'static str,
    },

    // --- Storage errors ---
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    // --- Configuration errors ---
    #[error("Configuration error: {message}")]
    Config { message: String },

    // --- Serialization ---
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // --- Generic ---
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    pub fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        Error::NotFound {
            kind,
            id: id.into(),
        }
    }
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

/// Storage faults. These are fatal for the operation that hit them.
#[derive(Debug, Clone, Error)]
pub enum StorageError {
    #[error("Backend failure: {0}")]
    Backend(String),

    #[error("Corrupt record {key}: {reason}")]
    Corrupt { key: String, reason: String },

    #[error("Migration failed: {0}")]
    Migration(String),
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PerceptionError {
    #[error("Perception unavailable: {0}")]
    Unavailable(String),
}

/// Why a session ended in `failed`. Serialized into the session record so a
/// terminal session can be diagnosed without replaying it.
#[derive(Debug, Clone, Error, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ExecutionError {
    #[error("Perception unavailable: {reason}")]
    PerceptionUnavailable { reason: String },

    #[error("Action failed: {tool}: {reason}")]
    ActionFailed { tool: String, reason: String },

    #[error("Recovery exhausted after {attempts} attempts: {last_error}")]
    RecoveryExhausted { attempts: u32, last_error: String },

    #[error("Approval not granted within {waited_secs}s")]
    ApprovalTimeout { waited_secs: u64 },

    #[error("Planner cannot proceed: {reason}")]
    CannotProceed { reason: String },

    #[error("Iteration limit of {limit} reached")]
    IterationLimit { limit: u32 },

    #[error("Macro {macro_id} is not runnable: {reason}")]
    MacroUnavailable { macro_id: String, reason: String },

    /// The state store failed mid-run; the session could not be tracked.
    #[error("Storage failure: {reason}")]
    Storage { reason: String },

    /// The process stopped while the session was queued or in flight.
    #[error("Interrupted while {status}")]
    Interrupted { status: String },
}
