//! Abstract data-tree traits.
//!
//! The synchronizer consumes a transactional, hierarchical store and its
//! change notifications through these traits. The in-memory backend in
//! `memory.rs` is the reference implementation.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use thiserror::Error;
use uuid::Uuid;

use crate::change::ModificationKind;

use super::path::TreePath;

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Another transaction committed to a touched path first.
    #[error("Optimistic lock failed on {path}")]
    Conflict {
        /// Path that changed underneath the transaction.
        path: String,
    },

    /// Stored data did not match the requested type.
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// Backend error.
    #[error("Storage backend error: {0}")]
    BackendError(String),
}

/// Partition of the data tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Datastore {
    /// Intended configuration, written by operators and northbound APIs.
    Configuration,
    /// Observed/derived state, written by the controller itself.
    Operational,
}

impl fmt::Display for Datastore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Configuration => f.write_str("configuration"),
            Self::Operational => f.write_str("operational"),
        }
    }
}

/// One node's modification within a committed transaction.
#[derive(Debug, Clone, PartialEq)]
pub struct DataTreeModification {
    /// Node path.
    pub path: TreePath,
    /// What happened to the node.
    pub kind: ModificationKind,
    /// Value before the commit.
    pub before: Option<JsonValue>,
    /// Value after the commit.
    pub after: Option<JsonValue>,
    /// Commit time.
    pub committed_at: DateTime<Utc>,
}

/// Receives batches of modifications for a registered subtree.
///
/// Called on a thread owned by the store. Implementations must return
/// promptly and must not block on I/O.
pub trait DataTreeChangeListener: Send + Sync {
    /// Handle one batch, in commit order.
    fn on_data_tree_changed(&self, changes: &[DataTreeModification]);
}

/// A read-write transaction against one partition.
///
/// Writes are staged until `submit`; reads observe staged writes.
pub trait ReadWriteTransaction: Send {
    /// Read the node at `path`.
    fn read(&mut self, path: &TreePath) -> Result<Option<JsonValue>, StorageError>;

    /// Values of the direct children of `parent`, in key order.
    fn list(&mut self, parent: &TreePath) -> Result<Vec<JsonValue>, StorageError>;

    /// Replace (or create) the node at `path`.
    fn put(&mut self, path: TreePath, data: JsonValue);

    /// Merge `data` into the node at `path`, creating it if absent.
    fn merge(&mut self, path: TreePath, data: JsonValue);

    /// Remove the node at `path` and everything below it.
    fn delete(&mut self, path: TreePath);

    /// Commit staged writes. Fails with `Conflict` if a touched path was
    /// committed by someone else after this transaction was opened.
    fn submit(self: Box<Self>) -> Result<(), StorageError>;
}

/// A transactional data tree with change notifications.
pub trait DataStore: Send + Sync {
    /// Open a transaction against `scope`.
    fn new_transaction(&self, scope: Datastore) -> Box<dyn ReadWriteTransaction>;

    /// Register `listener` for direct children of `subtree` in `scope`.
    ///
    /// Existing children are delivered first as one `Created` batch.
    fn register_listener(
        &self,
        scope: Datastore,
        subtree: TreePath,
        listener: Arc<dyn DataTreeChangeListener>,
    ) -> Result<ListenerRegistration, StorageError>;
}

/// Handle for a listener registration. Dropping it unregisters.
pub struct ListenerRegistration {
    id: Uuid,
    subtree: TreePath,
    close: Option<Box<dyn FnOnce() + Send>>,
}

impl ListenerRegistration {
    /// Wrap a backend-specific unregistration action.
    pub fn new(id: Uuid, subtree: TreePath, close: impl FnOnce() + Send + 'static) -> Self {
        Self {
            id,
            subtree,
            close: Some(Box::new(close)),
        }
    }

    /// Registration id.
    #[must_use]
    pub const fn id(&self) -> Uuid {
        self.id
    }

    /// Registered subtree.
    #[must_use]
    pub const fn subtree(&self) -> &TreePath {
        &self.subtree
    }

    /// Explicitly unregister. Idempotent with drop.
    pub fn close(mut self) {
        if let Some(close) = self.close.take() {
            close();
        }
    }
}

impl fmt::Debug for ListenerRegistration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListenerRegistration")
            .field("id", &self.id)
            .field("subtree", &self.subtree)
            .finish_non_exhaustive()
    }
}

impl Drop for ListenerRegistration {
    fn drop(&mut self) {
        if let Some(close) = self.close.take() {
            close();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::atomic::{AtomicUsize, Ordering};

    // Compile-time test: ensure traits are object-safe
    fn _assert_store_object_safe(_: &dyn DataStore) {}
    fn _assert_transaction_object_safe(_: &dyn ReadWriteTransaction) {}
    fn _assert_listener_object_safe(_: &dyn DataTreeChangeListener) {}

    #[test]
    fn test_storage_error_display() {
        let err = StorageError::Conflict {
            path: "a/b".to_string(),
        };
        assert!(err.to_string().contains("a/b"));
    }

    #[test]
    fn registration_closes_exactly_once() {
        let closed = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&closed);
        let reg = ListenerRegistration::new(Uuid::new_v4(), TreePath::from_static("a"), move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        reg.close();
        assert_eq!(closed.load(Ordering::SeqCst), 1);

        let counter = Arc::clone(&closed);
        {
            let _reg = ListenerRegistration::new(Uuid::new_v4(), TreePath::from_static("a"), move || {
                counter.fetch_add(1, Ordering::SeqCst);
            });
        }
        assert_eq!(closed.load(Ordering::SeqCst), 2);
    }
}
