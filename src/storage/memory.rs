//! In-memory data tree.
//!
//! Thread-safe reference implementation of `DataStore`. Values are JSON
//! documents keyed by `TreePath`, split into configuration and operational
//! partitions. Commits use optimistic concurrency and fan out change
//! notifications on a dedicated notifier thread, in commit order.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::fmt;
use std::sync::{Arc, Mutex, RwLock};
use std::thread;
use std::time::Duration;

use chrono::Utc;
use crossbeam_channel::{bounded, unbounded, Receiver, Sender};
use serde_json::Value as JsonValue;
use tracing::{debug, trace};
use uuid::Uuid;

use crate::change::ModificationKind;

use super::path::TreePath;
use super::traits::{
    DataStore, DataTreeChangeListener, DataTreeModification, Datastore, ListenerRegistration,
    ReadWriteTransaction, StorageError,
};

fn lock_err(context: &'static str) -> StorageError {
    StorageError::BackendError(format!("poisoned lock: {context}"))
}

/// Recursively merge `patch` into `base`. Objects merge key by key; any other
/// value in `patch` replaces the one in `base`.
fn deep_merge(base: JsonValue, patch: JsonValue) -> JsonValue {
    match (base, patch) {
        (JsonValue::Object(mut base), JsonValue::Object(patch)) => {
            for (k, v) in patch {
                let merged = match base.remove(&k) {
                    Some(existing) => deep_merge(existing, v),
                    None => v,
                };
                base.insert(k, merged);
            }
            JsonValue::Object(base)
        }
        (_, patch) => patch,
    }
}

#[derive(Debug, Default)]
struct Partition {
    entries: BTreeMap<TreePath, JsonValue>,
    // Last commit sequence that touched a path; kept after deletion.
    versions: HashMap<TreePath, u64>,
}

impl Partition {
    fn version_of(&self, path: &TreePath) -> u64 {
        self.versions.get(path).copied().unwrap_or(0)
    }

    /// `path` itself plus every stored node below it.
    fn subtree_paths(&self, path: &TreePath) -> Vec<TreePath> {
        self.entries
            .range(path.clone()..)
            .take_while(|(k, _)| k.starts_with(path))
            .map(|(k, _)| k.clone())
            .collect()
    }
}

#[derive(Debug, Default)]
struct StoreState {
    configuration: Partition,
    operational: Partition,
    commit_seq: u64,
}

impl StoreState {
    fn partition(&self, scope: Datastore) -> &Partition {
        match scope {
            Datastore::Configuration => &self.configuration,
            Datastore::Operational => &self.operational,
        }
    }

    fn partition_mut(&mut self, scope: Datastore) -> &mut Partition {
        match scope {
            Datastore::Configuration => &mut self.configuration,
            Datastore::Operational => &mut self.operational,
        }
    }
}

struct Registration {
    id: Uuid,
    scope: Datastore,
    subtree: TreePath,
    // Commits with a sequence at or below this were covered by the initial batch.
    since_seq: u64,
    listener: Arc<dyn DataTreeChangeListener>,
}

enum Notice {
    Commit {
        seq: u64,
        scope: Datastore,
        changes: Vec<DataTreeModification>,
    },
    Initial {
        registration: Uuid,
        changes: Vec<DataTreeModification>,
    },
    Barrier(Sender<()>),
}

struct Inner {
    state: RwLock<StoreState>,
    registrations: Arc<Mutex<Vec<Registration>>>,
    notify_tx: Sender<Notice>,
}

/// Thread-safe in-memory data tree.
///
/// Cloning is cheap and yields another handle to the same tree.
#[derive(Clone)]
pub struct InMemoryDataStore {
    inner: Arc<Inner>,
}

impl fmt::Debug for InMemoryDataStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InMemoryDataStore").finish_non_exhaustive()
    }
}

impl InMemoryDataStore {
    /// Create an empty tree and start its notifier thread.
    pub fn new() -> Result<Self, StorageError> {
        let (notify_tx, notify_rx) = unbounded::<Notice>();
        let registrations = Arc::new(Mutex::new(Vec::new()));

        let thread_registrations = Arc::clone(&registrations);
        // Detached: the notifier exits once the last store handle and
        // transaction (the senders) are gone.
        thread::Builder::new()
            .name("sbsync-store-notifier".to_string())
            .spawn(move || notifier_loop(&thread_registrations, &notify_rx))
            .map_err(|e| StorageError::BackendError(format!("failed to spawn notifier: {e}")))?;

        Ok(Self {
            inner: Arc::new(Inner {
                state: RwLock::new(StoreState::default()),
                registrations,
                notify_tx,
            }),
        })
    }

    /// Read a committed node outside of any transaction.
    pub fn snapshot(&self, scope: Datastore, path: &TreePath) -> Result<Option<JsonValue>, StorageError> {
        let state = self.inner.state.read().map_err(|_| lock_err("store.snapshot"))?;
        Ok(state.partition(scope).entries.get(path).cloned())
    }

    /// Number of live listener registrations.
    pub fn listener_count(&self) -> usize {
        self.inner.registrations.lock().map(|r| r.len()).unwrap_or(0)
    }

    /// Wait until every notification queued so far has been delivered.
    ///
    /// Returns false if delivery did not finish within `timeout`.
    pub fn settle(&self, timeout: Duration) -> bool {
        let (tx, rx) = bounded::<()>(1);
        if self.inner.notify_tx.send(Notice::Barrier(tx)).is_err() {
            return false;
        }
        rx.recv_timeout(timeout).is_ok()
    }
}

impl DataStore for InMemoryDataStore {
    fn new_transaction(&self, scope: Datastore) -> Box<dyn ReadWriteTransaction> {
        let base_seq = self.inner.state.read().map(|s| s.commit_seq).unwrap_or(0);
        Box::new(InMemoryTransaction {
            id: Uuid::new_v4(),
            inner: Arc::clone(&self.inner),
            scope,
            base_seq,
            reads: HashSet::new(),
            ops: Vec::new(),
            staged: BTreeMap::new(),
        })
    }

    fn register_listener(
        &self,
        scope: Datastore,
        subtree: TreePath,
        listener: Arc<dyn DataTreeChangeListener>,
    ) -> Result<ListenerRegistration, StorageError> {
        let id = Uuid::new_v4();

        // Holding the read lock keeps commits out while the initial batch is
        // captured and queued, so nothing is missed or delivered twice.
        let state = self.inner.state.read().map_err(|_| lock_err("store.register"))?;
        let now = Utc::now();
        let initial: Vec<DataTreeModification> = state
            .partition(scope)
            .entries
            .range(subtree.clone()..)
            .take_while(|(p, _)| p.starts_with(&subtree))
            .filter(|(p, _)| p.is_child_of(&subtree))
            .map(|(p, v)| DataTreeModification {
                path: p.clone(),
                kind: ModificationKind::Created,
                before: None,
                after: Some(v.clone()),
                committed_at: now,
            })
            .collect();

        self.inner
            .registrations
            .lock()
            .map_err(|_| lock_err("store.registrations"))?
            .push(Registration {
                id,
                scope,
                subtree: subtree.clone(),
                since_seq: state.commit_seq,
                listener,
            });

        if !initial.is_empty() {
            let _ = self.inner.notify_tx.send(Notice::Initial {
                registration: id,
                changes: initial,
            });
        }
        drop(state);

        debug!(%id, %scope, %subtree, "registered data tree listener");

        let registrations = Arc::downgrade(&self.inner.registrations);
        Ok(ListenerRegistration::new(id, subtree, move || {
            if let Some(registrations) = registrations.upgrade() {
                if let Ok(mut regs) = registrations.lock() {
                    regs.retain(|r| r.id != id);
                }
            }
        }))
    }
}

enum StagedOp {
    Put(TreePath, JsonValue),
    Merge(TreePath, JsonValue),
    Delete(TreePath),
}

impl StagedOp {
    fn path(&self) -> &TreePath {
        match self {
            Self::Put(p, _) | Self::Merge(p, _) | Self::Delete(p) => p,
        }
    }
}

struct Touch {
    before: Option<JsonValue>,
    merged_only: bool,
}

struct InMemoryTransaction {
    id: Uuid,
    inner: Arc<Inner>,
    scope: Datastore,
    base_seq: u64,
    reads: HashSet<TreePath>,
    ops: Vec<StagedOp>,
    // Read-your-writes overlay; `None` marks a staged deletion.
    staged: BTreeMap<TreePath, Option<JsonValue>>,
}

impl InMemoryTransaction {
    fn peek(&self, path: &TreePath) -> Result<Option<JsonValue>, StorageError> {
        if let Some(staged) = self.staged.get(path) {
            return Ok(staged.clone());
        }
        let mut ancestor = path.parent();
        while let Some(p) = ancestor {
            if let Some(None) = self.staged.get(&p) {
                return Ok(None);
            }
            ancestor = p.parent();
        }

        let state = self.inner.state.read().map_err(|_| lock_err("transaction.read"))?;
        Ok(state.partition(self.scope).entries.get(path).cloned())
    }
}

impl ReadWriteTransaction for InMemoryTransaction {
    fn read(&mut self, path: &TreePath) -> Result<Option<JsonValue>, StorageError> {
        let value = self.peek(path)?;
        self.reads.insert(path.clone());
        Ok(value)
    }

    fn list(&mut self, parent: &TreePath) -> Result<Vec<JsonValue>, StorageError> {
        let mut paths: BTreeSet<TreePath> = {
            let state = self.inner.state.read().map_err(|_| lock_err("transaction.list"))?;
            state
                .partition(self.scope)
                .entries
                .range(parent.clone()..)
                .take_while(|(p, _)| p.starts_with(parent))
                .filter(|(p, _)| p.is_child_of(parent))
                .map(|(p, _)| p.clone())
                .collect()
        };
        paths.extend(
            self.staged
                .range(parent.clone()..)
                .take_while(|(p, _)| p.starts_with(parent))
                .filter(|(p, _)| p.is_child_of(parent))
                .map(|(p, _)| p.clone()),
        );

        let mut values = Vec::with_capacity(paths.len());
        for path in paths {
            if let Some(value) = self.peek(&path)? {
                values.push(value);
            }
            self.reads.insert(path);
        }
        Ok(values)
    }

    fn put(&mut self, path: TreePath, data: JsonValue) {
        self.staged.insert(path.clone(), Some(data.clone()));
        self.ops.push(StagedOp::Put(path, data));
    }

    fn merge(&mut self, path: TreePath, data: JsonValue) {
        let merged = match self.peek(&path).ok().flatten() {
            Some(base) => deep_merge(base, data.clone()),
            None => data.clone(),
        };
        self.staged.insert(path.clone(), Some(merged));
        self.ops.push(StagedOp::Merge(path, data));
    }

    fn delete(&mut self, path: TreePath) {
        let below: Vec<TreePath> = self
            .staged
            .range(path.clone()..)
            .take_while(|(k, _)| k.starts_with(&path))
            .map(|(k, _)| k.clone())
            .collect();
        for p in below {
            self.staged.insert(p, None);
        }
        self.staged.insert(path.clone(), None);
        self.ops.push(StagedOp::Delete(path));
    }

    fn submit(self: Box<Self>) -> Result<(), StorageError> {
        let this = *self;
        if this.ops.is_empty() {
            return Ok(());
        }

        let mut state = this.inner.state.write().map_err(|_| lock_err("transaction.submit"))?;

        {
            let partition = state.partition(this.scope);
            let mut checked: Vec<&TreePath> = this.reads.iter().collect();
            checked.extend(this.ops.iter().map(StagedOp::path));
            for path in checked {
                if partition.version_of(path) > this.base_seq {
                    debug!(tx = %this.id, %path, "transaction conflict");
                    return Err(StorageError::Conflict {
                        path: path.to_string(),
                    });
                }
            }
            for op in &this.ops {
                if let StagedOp::Delete(path) = op {
                    for below in partition.subtree_paths(path) {
                        if partition.version_of(&below) > this.base_seq {
                            return Err(StorageError::Conflict {
                                path: below.to_string(),
                            });
                        }
                    }
                }
            }
        }

        let seq = state.commit_seq + 1;
        let committed_at = Utc::now();
        let scope = this.scope;

        let changes = {
            let partition = state.partition_mut(scope);
            let mut order: Vec<TreePath> = Vec::new();
            let mut touched: HashMap<TreePath, Touch> = HashMap::new();

            let mut note = |partition: &Partition, path: &TreePath, is_merge: bool| {
                if let Some(touch) = touched.get_mut(path) {
                    touch.merged_only &= is_merge;
                } else {
                    order.push(path.clone());
                    touched.insert(
                        path.clone(),
                        Touch {
                            before: partition.entries.get(path).cloned(),
                            merged_only: is_merge,
                        },
                    );
                }
            };

            for op in this.ops {
                match op {
                    StagedOp::Put(path, data) => {
                        note(partition, &path, false);
                        partition.entries.insert(path.clone(), data);
                        partition.versions.insert(path, seq);
                    }
                    StagedOp::Merge(path, data) => {
                        note(partition, &path, true);
                        let merged = match partition.entries.remove(&path) {
                            Some(base) => deep_merge(base, data),
                            None => data,
                        };
                        partition.entries.insert(path.clone(), merged);
                        partition.versions.insert(path, seq);
                    }
                    StagedOp::Delete(path) => {
                        for below in partition.subtree_paths(&path) {
                            note(partition, &below, false);
                            partition.entries.remove(&below);
                            partition.versions.insert(below, seq);
                        }
                        partition.versions.insert(path, seq);
                    }
                }
            }

            let mut changes = Vec::with_capacity(order.len());
            for path in order {
                let Some(touch) = touched.remove(&path) else {
                    continue;
                };
                let after = partition.entries.get(&path).cloned();
                let kind = match (&touch.before, &after) {
                    (None, None) => continue,
                    (Some(b), Some(a)) if b == a => continue,
                    (None, Some(_)) => ModificationKind::Created,
                    (Some(_), None) => ModificationKind::Deleted,
                    (Some(_), Some(_)) if touch.merged_only => ModificationKind::SubtreeModified,
                    (Some(_), Some(_)) => ModificationKind::Updated,
                };
                changes.push(DataTreeModification {
                    path,
                    kind,
                    before: touch.before,
                    after,
                    committed_at,
                });
            }
            changes
        };

        state.commit_seq = seq;
        trace!(tx = %this.id, seq, %scope, changes = changes.len(), "transaction committed");

        // Queued under the write lock so notices leave in commit order.
        if !changes.is_empty() {
            let _ = this.inner.notify_tx.send(Notice::Commit { seq, scope, changes });
        }
        Ok(())
    }
}

fn notifier_loop(registrations: &Mutex<Vec<Registration>>, rx: &Receiver<Notice>) {
    for notice in rx {
        let deliveries: Vec<(Arc<dyn DataTreeChangeListener>, Vec<DataTreeModification>)> = match notice {
            Notice::Barrier(reply) => {
                let _ = reply.send(());
                continue;
            }
            Notice::Commit { seq, scope, changes } => {
                let Ok(regs) = registrations.lock() else {
                    break;
                };
                regs.iter()
                    .filter(|r| r.scope == scope && r.since_seq < seq)
                    .filter_map(|r| {
                        let batch: Vec<DataTreeModification> = changes
                            .iter()
                            .filter(|c| c.path.is_child_of(&r.subtree))
                            .cloned()
                            .collect();
                        (!batch.is_empty()).then(|| (Arc::clone(&r.listener), batch))
                    })
                    .collect()
            }
            Notice::Initial { registration, changes } => {
                let Ok(regs) = registrations.lock() else {
                    break;
                };
                regs.iter()
                    .filter(|r| r.id == registration)
                    .map(|r| (Arc::clone(&r.listener), changes.clone()))
                    .collect()
            }
        };

        // Listeners run without the registry lock so they may unregister.
        for (listener, batch) in deliveries {
            listener.on_data_tree_changed(&batch);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;

    #[derive(Default)]
    struct Recorder {
        seen: Mutex<Vec<DataTreeModification>>,
    }

    impl DataTreeChangeListener for Recorder {
        fn on_data_tree_changed(&self, changes: &[DataTreeModification]) {
            self.seen.lock().unwrap().extend(changes.iter().cloned());
        }
    }

    impl Recorder {
        fn kinds(&self) -> Vec<(String, ModificationKind)> {
            self.seen
                .lock()
                .unwrap()
                .iter()
                .map(|m| (m.path.last().unwrap().to_string(), m.kind))
                .collect()
        }
    }

    fn list() -> TreePath {
        TreePath::from_static("service-functions/service-function")
    }

    fn put(store: &InMemoryDataStore, scope: Datastore, path: TreePath, value: JsonValue) {
        let mut tx = store.new_transaction(scope);
        tx.put(path, value);
        tx.submit().unwrap();
    }

    #[test]
    fn put_then_read_roundtrip() {
        let store = InMemoryDataStore::new().unwrap();
        put(&store, Datastore::Configuration, list().child("sf1"), json!({"name": "sf1"}));

        let mut tx = store.new_transaction(Datastore::Configuration);
        assert_eq!(tx.read(&list().child("sf1")).unwrap(), Some(json!({"name": "sf1"})));

        // Partitions are isolated.
        let mut tx = store.new_transaction(Datastore::Operational);
        assert_eq!(tx.read(&list().child("sf1")).unwrap(), None);
    }

    #[test]
    fn reads_observe_staged_writes() {
        let store = InMemoryDataStore::new().unwrap();
        let mut tx = store.new_transaction(Datastore::Configuration);
        tx.put(list().child("sf1"), json!({"name": "sf1"}));
        assert!(tx.read(&list().child("sf1")).unwrap().is_some());
        tx.delete(list());
        assert!(tx.read(&list().child("sf1")).unwrap().is_none());
    }

    #[test]
    fn list_returns_direct_children_with_staged_writes() {
        let store = InMemoryDataStore::new().unwrap();
        put(&store, Datastore::Configuration, list().child("sf1"), json!(1));
        put(&store, Datastore::Configuration, list().child("sf2"), json!(2));
        put(&store, Datastore::Configuration, list().child("sf2").child("nested"), json!(9));

        let mut tx = store.new_transaction(Datastore::Configuration);
        assert_eq!(tx.list(&list()).unwrap(), vec![json!(1), json!(2)]);

        tx.delete(list().child("sf1"));
        tx.put(list().child("sf3"), json!(3));
        assert_eq!(tx.list(&list()).unwrap(), vec![json!(2), json!(3)]);

        tx.delete(list());
        assert!(tx.list(&list()).unwrap().is_empty());
    }

    #[test]
    fn concurrent_writers_conflict() {
        let store = InMemoryDataStore::new().unwrap();
        let path = list().child("sf1");

        let mut a = store.new_transaction(Datastore::Configuration);
        let mut b = store.new_transaction(Datastore::Configuration);
        assert!(a.read(&path).unwrap().is_none());
        assert!(b.read(&path).unwrap().is_none());
        a.put(path.clone(), json!({"v": 1}));
        b.put(path.clone(), json!({"v": 2}));

        a.submit().unwrap();
        let err = b.submit().unwrap_err();
        assert!(matches!(err, StorageError::Conflict { .. }));
        assert_eq!(
            store.snapshot(Datastore::Configuration, &path).unwrap(),
            Some(json!({"v": 1}))
        );
    }

    #[test]
    fn disjoint_writers_do_not_conflict() {
        let store = InMemoryDataStore::new().unwrap();
        let mut a = store.new_transaction(Datastore::Configuration);
        let mut b = store.new_transaction(Datastore::Configuration);
        a.put(list().child("sf1"), json!(1));
        b.put(list().child("sf2"), json!(2));
        a.submit().unwrap();
        b.submit().unwrap();
    }

    #[test]
    fn merge_combines_objects() {
        let store = InMemoryDataStore::new().unwrap();
        let path = list().child("sf1");
        put(&store, Datastore::Configuration, path.clone(), json!({"name": "sf1", "a": {"x": 1}}));

        let mut tx = store.new_transaction(Datastore::Configuration);
        tx.merge(path.clone(), json!({"a": {"y": 2}, "b": true}));
        tx.submit().unwrap();

        assert_eq!(
            store.snapshot(Datastore::Configuration, &path).unwrap(),
            Some(json!({"name": "sf1", "a": {"x": 1, "y": 2}, "b": true}))
        );
    }

    #[test]
    fn listener_sees_kinds_in_commit_order() {
        let store = InMemoryDataStore::new().unwrap();
        let recorder = Arc::new(Recorder::default());
        let _reg = store
            .register_listener(Datastore::Configuration, list(), recorder.clone())
            .unwrap();

        let path = list().child("sf1");
        put(&store, Datastore::Configuration, path.clone(), json!({"v": 1}));
        put(&store, Datastore::Configuration, path.clone(), json!({"v": 2}));
        // Identical rewrite produces no event.
        put(&store, Datastore::Configuration, path.clone(), json!({"v": 2}));

        let mut tx = store.new_transaction(Datastore::Configuration);
        tx.merge(path.clone(), json!({"w": 3}));
        tx.submit().unwrap();

        let mut tx = store.new_transaction(Datastore::Configuration);
        tx.delete(path);
        tx.submit().unwrap();

        assert!(store.settle(Duration::from_secs(1)));
        assert_eq!(
            recorder.kinds(),
            vec![
                ("sf1".to_string(), ModificationKind::Created),
                ("sf1".to_string(), ModificationKind::Updated),
                ("sf1".to_string(), ModificationKind::SubtreeModified),
                ("sf1".to_string(), ModificationKind::Deleted),
            ]
        );
    }

    #[test]
    fn listener_ignores_other_subtrees_and_scopes() {
        let store = InMemoryDataStore::new().unwrap();
        let recorder = Arc::new(Recorder::default());
        let _reg = store
            .register_listener(Datastore::Configuration, list(), recorder.clone())
            .unwrap();

        put(&store, Datastore::Operational, list().child("sf1"), json!(1));
        put(&store, Datastore::Configuration, TreePath::from_static("access-lists/acl/a"), json!(1));
        put(&store, Datastore::Configuration, list().child("sf1").child("nested"), json!(1));

        assert!(store.settle(Duration::from_secs(1)));
        assert!(recorder.kinds().is_empty());
    }

    #[test]
    fn registration_delivers_existing_children_once() {
        let store = InMemoryDataStore::new().unwrap();
        put(&store, Datastore::Configuration, list().child("sf1"), json!(1));
        put(&store, Datastore::Configuration, list().child("sf2"), json!(2));

        let recorder = Arc::new(Recorder::default());
        let _reg = store
            .register_listener(Datastore::Configuration, list(), recorder.clone())
            .unwrap();
        put(&store, Datastore::Configuration, list().child("sf3"), json!(3));

        assert!(store.settle(Duration::from_secs(1)));
        assert_eq!(
            recorder.kinds(),
            vec![
                ("sf1".to_string(), ModificationKind::Created),
                ("sf2".to_string(), ModificationKind::Created),
                ("sf3".to_string(), ModificationKind::Created),
            ]
        );
    }

    #[test]
    fn closed_registration_stops_delivery() {
        let store = InMemoryDataStore::new().unwrap();
        let recorder = Arc::new(Recorder::default());
        let reg = store
            .register_listener(Datastore::Configuration, list(), recorder.clone())
            .unwrap();
        assert_eq!(store.listener_count(), 1);
        reg.close();
        assert_eq!(store.listener_count(), 0);

        put(&store, Datastore::Configuration, list().child("sf1"), json!(1));
        assert!(store.settle(Duration::from_secs(1)));
        assert!(recorder.kinds().is_empty());
    }

    #[test]
    fn delete_removes_descendants() {
        let store = InMemoryDataStore::new().unwrap();
        put(&store, Datastore::Configuration, list().child("sf1"), json!(1));
        put(&store, Datastore::Configuration, list().child("sf2"), json!(2));

        let mut tx = store.new_transaction(Datastore::Configuration);
        tx.delete(list());
        tx.submit().unwrap();

        assert!(store
            .snapshot(Datastore::Configuration, &list().child("sf1"))
            .unwrap()
            .is_none());
        assert!(store
            .snapshot(Datastore::Configuration, &list().child("sf2"))
            .unwrap()
            .is_none());
    }
}
