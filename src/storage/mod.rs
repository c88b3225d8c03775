//! Data-tree abstractions and the in-memory backend.
//!
//! The traits describe the external store the synchronizer collaborates
//! with; `InMemoryDataStore` implements them for embedded use and tests.

mod memory;
mod path;
mod traits;

pub use memory::InMemoryDataStore;
pub use path::TreePath;
pub use traits::{
    DataStore, DataTreeChangeListener, DataTreeModification, Datastore, ListenerRegistration,
    ReadWriteTransaction, StorageError,
};
