//! Serialized store access.
//!
//! A `SerializedAccessor` owns one worker thread per resource family. Every
//! read-modify-write against that family runs as a typed closure on the
//! worker, so at most one transaction per family is in flight and callers
//! never race each other into commit conflicts.

use std::collections::HashMap;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use serde_json::Value as JsonValue;
use tracing::{debug, error, warn};

use crate::config::AccessorConfig;
use crate::entity::{ResourceKey, TreeEntity};
use crate::error::{ExecutionError, SyncError, SyncResult};
use crate::storage::{DataStore, Datastore, StorageError};

/// A tree entity that owns a keyed list of children.
///
/// Implemented by parents that `merge_append` can extend.
pub trait ChildList<C>: TreeEntity {
    /// An empty parent with the given key.
    fn empty(key: &ResourceKey) -> Self;

    /// Replace the child with the same key, or append it.
    fn upsert_child(&mut self, child: C);

    /// Remove the child with `child_key`. Returns true if it was present.
    fn remove_child(&mut self, child_key: &ResourceKey) -> bool;
}

type Job = Box<dyn FnOnce(&dyn DataStore) + Send>;

fn decode<T: TreeEntity>(value: JsonValue) -> Result<T, StorageError> {
    serde_json::from_value(value).map_err(|e| StorageError::SerializationError(e.to_string()))
}

fn encode<T: TreeEntity>(entity: &T) -> Result<JsonValue, StorageError> {
    serde_json::to_value(entity).map_err(|e| StorageError::SerializationError(e.to_string()))
}

fn read_entity<T: TreeEntity>(store: &dyn DataStore, scope: Datastore, key: &ResourceKey) -> Result<Option<T>, StorageError> {
    let mut tx = store.new_transaction(scope);
    tx.read(&T::path_for(key))?.map(decode).transpose()
}

fn write_entity<T: TreeEntity>(store: &dyn DataStore, scope: Datastore, entity: &T) -> Result<(), StorageError> {
    let mut tx = store.new_transaction(scope);
    tx.put(T::path_for(&entity.key()), encode(entity)?);
    tx.submit()
}

fn delete_entity<T: TreeEntity>(store: &dyn DataStore, scope: Datastore, key: &ResourceKey) -> Result<(), StorageError> {
    let mut tx = store.new_transaction(scope);
    tx.delete(T::path_for(key));
    tx.submit()
}

/// Handle to a job submitted to an accessor.
pub struct AccessHandle<R> {
    family: String,
    rx: Receiver<R>,
}

impl<R> AccessHandle<R> {
    /// Block until the job finishes.
    pub fn join(self) -> SyncResult<R> {
        self.rx
            .recv()
            .map_err(|_| SyncError::Execution(ExecutionError::Disconnected { path: self.family }))
    }

    /// Block until the job finishes or `timeout` elapses.
    pub fn join_timeout(self, timeout: Duration) -> SyncResult<R> {
        self.rx.recv_timeout(timeout).map_err(|err| match err {
            RecvTimeoutError::Timeout => SyncError::Execution(ExecutionError::Timeout {
                duration_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
            }),
            RecvTimeoutError::Disconnected => {
                SyncError::Execution(ExecutionError::Disconnected { path: self.family })
            }
        })
    }
}

impl<R> fmt::Debug for AccessHandle<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessHandle").field("family", &self.family).finish_non_exhaustive()
    }
}

/// Single-worker gate in front of the store for one resource family.
pub struct SerializedAccessor {
    family: String,
    tx: Option<Sender<Job>>,
    worker: Option<JoinHandle<()>>,
}

impl fmt::Debug for SerializedAccessor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SerializedAccessor").field("family", &self.family).finish_non_exhaustive()
    }
}

impl SerializedAccessor {
    /// Start the worker for `family`.
    pub fn start(family: impl Into<String>, store: Arc<dyn DataStore>, config: &AccessorConfig) -> SyncResult<Self> {
        let family = family.into();
        let (tx, rx) = bounded::<Job>(config.queue_capacity.max(1));
        let name = format!("sbsync-accessor-{family}");
        let worker_family = family.clone();

        let worker = thread::Builder::new()
            .name(name.clone())
            .spawn(move || {
                for job in rx {
                    // The job's reply sender is dropped while unwinding, so its
                    // caller sees Disconnected and the worker keeps serving.
                    if panic::catch_unwind(AssertUnwindSafe(|| job(store.as_ref()))).is_err() {
                        error!(family = %worker_family, "accessor job panicked");
                    }
                }
            })
            .map_err(|e| ExecutionError::Spawn {
                name,
                message: e.to_string(),
            })?;

        debug!(%family, "started serialized accessor");
        Ok(Self {
            family,
            tx: Some(tx),
            worker: Some(worker),
        })
    }

    /// Resource family served by this accessor.
    #[must_use]
    pub fn family(&self) -> &str {
        &self.family
    }

    /// Queue `job` behind every job submitted before it.
    ///
    /// Blocks while the queue is full; there is no submission timeout.
    pub fn submit<R, F>(&self, job: F) -> SyncResult<AccessHandle<R>>
    where
        F: FnOnce(&dyn DataStore) -> R + Send + 'static,
        R: Send + 'static,
    {
        let disconnected = || {
            SyncError::Execution(ExecutionError::Disconnected {
                path: self.family.clone(),
            })
        };
        let tx = self.tx.as_ref().ok_or_else(disconnected)?;
        let (reply_tx, reply_rx) = bounded::<R>(1);
        tx.send(Box::new(move |store: &dyn DataStore| {
            let _ = reply_tx.send(job(store));
        }))
        .map_err(|_| disconnected())?;

        Ok(AccessHandle {
            family: self.family.clone(),
            rx: reply_rx,
        })
    }

    /// Run `job` on the worker and wait for its result.
    pub fn execute<R, F>(&self, job: F) -> SyncResult<R>
    where
        F: FnOnce(&dyn DataStore) -> R + Send + 'static,
        R: Send + 'static,
    {
        self.submit(job)?.join()
    }

    /// Read the entity at `key`. Missing entities and failures yield `None`.
    pub fn read<T: TreeEntity>(&self, key: &ResourceKey, scope: Datastore) -> Option<T> {
        let k = key.clone();
        self.settle("read", key, self.execute(move |store| read_entity::<T>(store, scope, &k)))
            .flatten()
    }

    /// Write `entity` at its key. Returns false on conflict or failure.
    pub fn write<T: TreeEntity>(&self, entity: &T, scope: Datastore) -> bool {
        let key = entity.key();
        let entity = entity.clone();
        self.settle("write", &key, self.execute(move |store| write_entity(store, scope, &entity)))
            .is_some()
    }

    /// Delete the entity at `key`. Returns false on conflict or failure.
    pub fn delete<T: TreeEntity>(&self, key: &ResourceKey, scope: Datastore) -> bool {
        let k = key.clone();
        self.settle("delete", key, self.execute(move |store| delete_entity::<T>(store, scope, &k)))
            .is_some()
    }

    /// Read the parent at `parent_key` (or start an empty one), upsert
    /// `child`, write it back. One serialized unit.
    pub fn merge_append<P, C>(&self, parent_key: &ResourceKey, child: C, scope: Datastore) -> bool
    where
        P: ChildList<C>,
        C: Send + 'static,
    {
        let k = parent_key.clone();
        let result = self.execute(move |store| {
            let path = P::path_for(&k);
            let mut tx = store.new_transaction(scope);
            let mut parent: P = match tx.read(&path)? {
                Some(value) => decode(value)?,
                None => P::empty(&k),
            };
            parent.upsert_child(child);
            tx.put(path, encode(&parent)?);
            tx.submit()
        });
        self.settle("merge-append", parent_key, result).is_some()
    }

    /// Remove the child `child_key` from the parent at `parent_key`.
    ///
    /// Returns false if the parent or child is missing, or on failure.
    pub fn remove_child<P, C>(&self, parent_key: &ResourceKey, child_key: &ResourceKey, scope: Datastore) -> bool
    where
        P: ChildList<C>,
    {
        let k = parent_key.clone();
        let child_key = child_key.clone();
        let result = self.execute(move |store| {
            let path = P::path_for(&k);
            let mut tx = store.new_transaction(scope);
            let Some(value) = tx.read(&path)? else {
                return Ok(false);
            };
            let mut parent: P = decode(value)?;
            if !parent.remove_child(&child_key) {
                return Ok(false);
            }
            tx.put(path, encode(&parent)?);
            tx.submit().map(|()| true)
        });
        self.settle("remove-child", parent_key, result).unwrap_or(false)
    }

    fn settle<R>(&self, op: &'static str, key: &ResourceKey, result: SyncResult<Result<R, StorageError>>) -> Option<R> {
        match result {
            Ok(Ok(value)) => Some(value),
            Ok(Err(StorageError::Conflict { path })) => {
                debug!(family = %self.family, op, %key, %path, "store commit conflict");
                None
            }
            Ok(Err(err)) => {
                warn!(family = %self.family, op, %key, error = %err, "store access failed");
                None
            }
            Err(err) => {
                warn!(family = %self.family, op, %key, error = %err, "accessor unavailable");
                None
            }
        }
    }

    /// Stop accepting jobs, finish the queued ones and join the worker.
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        drop(self.tx.take());
        if let Some(worker) = self.worker.take() {
            // The last handle may be dropped by a job on the worker itself.
            if worker.thread().id() != thread::current().id() {
                let _ = worker.join();
            }
        }
    }
}

impl Drop for SerializedAccessor {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Hands out exactly one accessor per resource family.
pub struct Accessors {
    store: Arc<dyn DataStore>,
    config: AccessorConfig,
    families: Mutex<HashMap<String, Arc<SerializedAccessor>>>,
}

impl fmt::Debug for Accessors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Accessors").field("config", &self.config).finish_non_exhaustive()
    }
}

impl Accessors {
    /// Create an empty registry over `store`.
    #[must_use]
    pub fn new(store: Arc<dyn DataStore>, config: AccessorConfig) -> Self {
        Self {
            store,
            config,
            families: Mutex::new(HashMap::new()),
        }
    }

    /// The accessor for `family`, started on first use.
    pub fn get(&self, family: &str) -> SyncResult<Arc<SerializedAccessor>> {
        let mut families = self
            .families
            .lock()
            .map_err(|_| SyncError::internal("poisoned lock: accessors"))?;
        if let Some(existing) = families.get(family) {
            return Ok(Arc::clone(existing));
        }
        let accessor = Arc::new(SerializedAccessor::start(family, Arc::clone(&self.store), &self.config)?);
        families.insert(family.to_string(), Arc::clone(&accessor));
        Ok(accessor)
    }

    /// Number of started accessors.
    #[must_use]
    pub fn len(&self) -> usize {
        self.families.lock().map(|f| f.len()).unwrap_or(0)
    }

    /// True if no accessor has been started.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::time::Instant;

    use crate::model::{ClassifierState, SclRenderedServicePath, ServiceFunction};
    use crate::storage::InMemoryDataStore;

    fn accessor(family: &str) -> (InMemoryDataStore, SerializedAccessor) {
        let store = InMemoryDataStore::new().unwrap();
        let accessor = SerializedAccessor::start(family, Arc::new(store.clone()), &AccessorConfig::default()).unwrap();
        (store, accessor)
    }

    #[test]
    fn write_read_delete() {
        let (_store, acc) = accessor("sf");
        let key = ResourceKey::new("sf1");
        assert!(acc.read::<ServiceFunction>(&key, Datastore::Configuration).is_none());

        let sf = ServiceFunction::new("sf1").with_rest_uri("http://h:5000");
        assert!(acc.write(&sf, Datastore::Configuration));
        assert_eq!(acc.read::<ServiceFunction>(&key, Datastore::Configuration), Some(sf));
        assert!(acc.read::<ServiceFunction>(&key, Datastore::Operational).is_none());

        assert!(acc.delete::<ServiceFunction>(&key, Datastore::Configuration));
        assert!(acc.read::<ServiceFunction>(&key, Datastore::Configuration).is_none());
    }

    #[test]
    fn undecodable_entry_reads_as_none() {
        let (store, acc) = accessor("sf");
        let mut tx = store.new_transaction(Datastore::Configuration);
        tx.put(ServiceFunction::path_for(&ResourceKey::new("bad")), serde_json::json!(42));
        tx.submit().unwrap();
        assert!(acc.read::<ServiceFunction>(&ResourceKey::new("bad"), Datastore::Configuration).is_none());
    }

    #[test]
    fn jobs_run_on_the_family_worker_in_order() {
        let (_store, acc) = accessor("clsf");
        let handles: Vec<_> = (0..10)
            .map(|i| {
                acc.submit(move |_| (i, thread::current().name().map(str::to_string)))
                    .unwrap()
            })
            .collect();
        for (expected, handle) in handles.into_iter().enumerate() {
            let (i, name) = handle.join().unwrap();
            assert_eq!(i, expected);
            assert_eq!(name.as_deref(), Some("sbsync-accessor-clsf"));
        }
    }

    #[test]
    fn join_timeout_reports_timeout() {
        let (_store, acc) = accessor("slow");
        let handle = acc.submit(|_| thread::sleep(Duration::from_millis(200))).unwrap();
        let started = Instant::now();
        let err = handle.join_timeout(Duration::from_millis(10)).unwrap_err();
        assert!(matches!(err, SyncError::Execution(ExecutionError::Timeout { duration_ms: 10 })));
        assert!(started.elapsed() < Duration::from_millis(150));
    }

    #[test]
    fn panicking_job_reports_disconnected_and_worker_survives() {
        let (_store, acc) = accessor("boom");
        let handle = acc.submit(|_| -> u8 { panic!("job failed") }).unwrap();
        let err = handle.join().unwrap_err();
        let SyncError::Execution(ExecutionError::Disconnected { path }) = err else {
            panic!("expected Disconnected, got {err:?}");
        };
        assert_eq!(path, "boom");

        let sf = ServiceFunction::new("sf1");
        assert!(acc.write(&sf, Datastore::Configuration));
        assert_eq!(acc.read::<ServiceFunction>(&ResourceKey::new("sf1"), Datastore::Configuration), Some(sf));
    }

    #[test]
    fn merge_append_creates_then_extends_parent() {
        let (_store, acc) = accessor("clsf-state");
        let key = ResourceKey::new("clsf1");
        assert!(acc.merge_append::<ClassifierState, _>(&key, SclRenderedServicePath::new("rsp1"), Datastore::Operational));
        assert!(acc.merge_append::<ClassifierState, _>(&key, SclRenderedServicePath::new("rsp2"), Datastore::Operational));
        assert!(acc.merge_append::<ClassifierState, _>(&key, SclRenderedServicePath::new("rsp1"), Datastore::Operational));

        let state: ClassifierState = acc.read(&key, Datastore::Operational).unwrap();
        assert_eq!(state.rendered_path_names(), vec!["rsp1", "rsp2"]);

        assert!(acc.remove_child::<ClassifierState, SclRenderedServicePath>(
            &key,
            &ResourceKey::new("rsp1"),
            Datastore::Operational
        ));
        assert!(!acc.remove_child::<ClassifierState, SclRenderedServicePath>(
            &key,
            &ResourceKey::new("rsp1"),
            Datastore::Operational
        ));
        assert!(!acc.remove_child::<ClassifierState, SclRenderedServicePath>(
            &ResourceKey::new("absent"),
            &ResourceKey::new("rsp2"),
            Datastore::Operational
        ));
        let state: ClassifierState = acc.read(&key, Datastore::Operational).unwrap();
        assert_eq!(state.rendered_path_names(), vec!["rsp2"]);
    }

    #[test]
    fn concurrent_merge_append_keeps_every_child() {
        let (_store, acc) = accessor("clsf-state");
        let acc = Arc::new(acc);
        let key = ResourceKey::new("clsf1");

        let threads: Vec<_> = (0..8)
            .map(|i| {
                let acc = Arc::clone(&acc);
                let key = key.clone();
                thread::spawn(move || {
                    acc.merge_append::<ClassifierState, _>(
                        &key,
                        SclRenderedServicePath::new(format!("rsp{i}")),
                        Datastore::Operational,
                    )
                })
            })
            .collect();
        for t in threads {
            assert!(t.join().unwrap());
        }

        let state: ClassifierState = acc.read(&key, Datastore::Operational).unwrap();
        let mut names = state.rendered_path_names();
        names.sort_unstable();
        assert_eq!(names, vec!["rsp0", "rsp1", "rsp2", "rsp3", "rsp4", "rsp5", "rsp6", "rsp7"]);
    }

    #[test]
    fn registry_hands_out_one_accessor_per_family() {
        let store = InMemoryDataStore::new().unwrap();
        let accessors = Accessors::new(Arc::new(store), AccessorConfig::default());
        assert!(accessors.is_empty());

        let a = accessors.get("clsf").unwrap();
        let b = accessors.get("clsf").unwrap();
        let c = accessors.get("sf").unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert!(!Arc::ptr_eq(&a, &c));
        assert_eq!(accessors.len(), 2);
        assert_eq!(c.family(), "sf");
    }
}
