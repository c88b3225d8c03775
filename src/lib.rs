//! # sbsync - Southbound REST synchronizer
//!
//! sbsync watches a hierarchical, transactional data tree and mirrors every
//! change of a service-chaining entity onto the network element that runs
//! it, as an idempotent REST call.
//!
//! ## Core Concepts
//!
//! - **ChangeEvent**: one entity's before/after snapshot and modification kind
//! - **OperationClassifier**: maps an event to `POST`, `PUT` or `DELETE`
//! - **Task**: one operation on one entity, fanned out to its destinations
//! - **Dispatcher**: per-kind worker pool, ordered per resource key
//! - **SerializedAccessor**: one worker per resource family for store access
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use sbsync::{InMemoryDataStore, RecordingSink, SouthboundSync, SyncConfig};
//!
//! let store = InMemoryDataStore::new()?;
//! let sink = Arc::new(RecordingSink::new());
//! let sync = SouthboundSync::start(&SyncConfig::default(), Arc::new(store), sink)?;
//!
//! let classifiers = sync.classifier_api()?;
//! assert!(classifiers.add_rendered_path("clsf1", "rsp1"));
//! sync.shutdown()?;
//! # Ok::<(), sbsync::SyncError>(())
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

// Core types
pub mod change;
pub mod classifier;
pub mod entity;
pub mod error;
pub mod model;

// Store and southbound plumbing
pub mod storage;
pub mod southbound;

// Pipeline
pub mod accessor;
pub mod dispatcher;
pub mod listener;
pub mod resolve;
pub mod task;

// Wiring
pub mod api;
pub mod config;
pub mod logging;
pub mod provider;

pub use accessor::{AccessHandle, Accessors, ChildList, SerializedAccessor};
pub use api::ServiceClassifierApi;
pub use change::{ChangeEvent, ModificationKind};
pub use classifier::{OperationClassifier, PresenceClassifier, PutOnWrite, RestOperation};
pub use config::{AccessorConfig, DispatcherConfig, HttpConfig, LoggingConfig, OrderingMode, SyncConfig};
pub use dispatcher::{Dispatcher, DispatcherStats};
pub use entity::{EntityKind, ResourceKey, SouthboundEntity, TreeEntity};
pub use error::{ExecutionError, ExportError, SinkError, SyncError, SyncResult, ValidationError};
pub use listener::Listener;
pub use provider::SouthboundSync;
pub use resolve::ClassifierForwarders;
#[cfg(feature = "http")]
pub use southbound::HttpRestSink;
pub use southbound::{Exporter, JsonExporter, RecordingSink, RestRequest, RestSink};
pub use storage::{
    DataStore, DataTreeChangeListener, DataTreeModification, Datastore, InMemoryDataStore, ListenerRegistration,
    ReadWriteTransaction, StorageError, TreePath,
};
pub use task::{DestinationResolver, SelfAddressed, Task, TaskBuilder, TaskOutcome};
