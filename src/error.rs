//! Error types for sbsync.
//!
//! All errors are strongly typed using thiserror. The southbound pipeline
//! never surfaces these to the store (failures there are logged), but the
//! accessor, configuration and construction paths return them to callers.

use thiserror::Error;

use crate::storage::StorageError;

/// Validation errors raised by malformed events, destinations or configuration.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Required field '{field}' is missing")]
    MissingField {
        field: String,
    },

    #[error("Invalid tree path '{path}': {reason}")]
    InvalidPath {
        path: String,
        reason: String,
    },

    #[error("Invalid REST URI '{uri}'")]
    InvalidUri {
        uri: String,
    },

    #[error("Snapshots do not match a '{kind}' event")]
    InconsistentEvent {
        kind: &'static str,
    },

    #[error("Invalid configuration: {reason}")]
    InvalidConfig {
        reason: String,
    },
}

/// Execution errors raised by worker pools and the serialized accessor.
#[derive(Debug, Error)]
pub enum ExecutionError {
    #[error("Queue '{path}' is full (capacity {capacity})")]
    QueueFull {
        path: String,
        capacity: usize,
    },

    #[error("Worker '{path}' is disconnected")]
    Disconnected {
        path: String,
    },

    #[error("Operation timed out after {duration_ms}ms")]
    Timeout {
        duration_ms: u64,
    },

    #[error("Failed to spawn worker '{name}': {message}")]
    Spawn {
        name: String,
        message: String,
    },
}

/// Errors raised while talking to a southbound REST endpoint.
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("Transport failure for {uri}: {message}")]
    Transport {
        uri: String,
        message: String,
    },

    #[error("Unexpected status {status} from {uri}")]
    Status {
        uri: String,
        status: u16,
    },
}

/// Errors raised while exporting an entity to its southbound JSON form.
#[derive(Debug, Error)]
pub enum ExportError {
    #[error("Failed to export {kind}: {source}")]
    Json {
        kind: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

/// Top-level error type for sbsync.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Execution error: {0}")]
    Execution(#[from] ExecutionError),

    #[error("Store error: {0}")]
    Store(#[from] StorageError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {message}")]
    Internal {
        message: String,
    },
}

impl SyncError {
    /// Creates an internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Returns true if this is a validation error.
    #[must_use]
    pub const fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }

    /// Returns true if this is a store commit conflict.
    #[must_use]
    pub const fn is_conflict(&self) -> bool {
        matches!(self, Self::Store(StorageError::Conflict { .. }))
    }

    /// Returns true if a worker queue rejected the request.
    #[must_use]
    pub const fn is_queue_full(&self) -> bool {
        matches!(self, Self::Execution(ExecutionError::QueueFull { .. }))
    }
}

/// Result type alias for sbsync operations.
pub type SyncResult<T> = Result<T, SyncError>;
