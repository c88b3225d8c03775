//! Data-tree listeners.
//!
//! A `Listener` watches one entity list in the configuration partition and
//! turns each modification into a southbound task. It runs on the store's
//! notification thread and only enqueues; all I/O happens on the
//! dispatcher's workers.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tracing::{debug, trace, warn};

use crate::change::ChangeEvent;
use crate::classifier::{OperationClassifier, PresenceClassifier};
use crate::dispatcher::Dispatcher;
use crate::entity::SouthboundEntity;
use crate::error::ValidationError;
use crate::storage::{
    DataStore, DataTreeChangeListener, DataTreeModification, Datastore, ListenerRegistration, StorageError,
    TreePath,
};
use crate::task::{DestinationResolver, SelfAddressed, Task};

/// Binds an entity list to a classifier, a resolver and a dispatcher.
pub struct Listener<T: SouthboundEntity, C: OperationClassifier = PresenceClassifier> {
    classifier: C,
    resolver: Arc<dyn DestinationResolver<T>>,
    dispatcher: Arc<Dispatcher<T>>,
    dropped: AtomicU64,
}

impl<T: SouthboundEntity, C: OperationClassifier> fmt::Debug for Listener<T, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Listener")
            .field("kind", &T::KIND)
            .field("dropped", &self.dropped())
            .finish_non_exhaustive()
    }
}

impl<T: SouthboundEntity, C: OperationClassifier> Listener<T, C> {
    /// Events whose task was rejected by a bounded dispatcher queue.
    #[must_use]
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl<T: SouthboundEntity> Listener<T> {
    /// Default policy: presence classification, self-addressed destinations.
    #[must_use]
    pub fn new(dispatcher: Arc<Dispatcher<T>>) -> Self {
        Self::with_parts(PresenceClassifier, Arc::new(SelfAddressed), dispatcher)
    }
}

impl<T: SouthboundEntity, C: OperationClassifier + 'static> Listener<T, C> {
    /// Assemble a listener from its parts.
    #[must_use]
    pub fn with_parts(classifier: C, resolver: Arc<dyn DestinationResolver<T>>, dispatcher: Arc<Dispatcher<T>>) -> Self {
        Self {
            classifier,
            resolver,
            dispatcher,
            dropped: AtomicU64::new(0),
        }
    }

    /// The watched subtree.
    #[must_use]
    pub fn subtree() -> TreePath {
        T::list_path()
    }

    /// Register with `store`'s configuration partition.
    pub fn register(self: &Arc<Self>, store: &dyn DataStore) -> Result<ListenerRegistration, StorageError> {
        let listener: Arc<dyn DataTreeChangeListener> = Arc::clone(self) as Arc<dyn DataTreeChangeListener>;
        store.register_listener(Datastore::Configuration, Self::subtree(), listener)
    }

    /// Classify each event and enqueue the resulting tasks, in order.
    pub fn on_changes(&self, events: &[ChangeEvent<T>]) {
        for event in events {
            let Some((operation, entity)) = self.classifier.classify(event) else {
                trace!(kind = %T::KIND, modification = event.kind().as_str(), "ignored change");
                continue;
            };

            let task = Task::builder(operation, entity.clone())
                .destinations(self.resolver.destinations(entity))
                .build();

            debug!(
                task = %task.id(),
                kind = %T::KIND,
                key = %entity.key(),
                op = %operation,
                destinations = task.destinations().len(),
                "submitting southbound task"
            );
            if let Err(err) = self.dispatcher.submit(task) {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                warn!(kind = %T::KIND, key = %entity.key(), error = %err, "southbound task dropped");
            }
        }
    }
}

fn to_event<T: SouthboundEntity>(change: &DataTreeModification) -> Result<ChangeEvent<T>, String> {
    let decode = |value: &Option<serde_json::Value>| {
        value
            .clone()
            .map(serde_json::from_value::<T>)
            .transpose()
            .map_err(|e| e.to_string())
    };
    let before = decode(&change.before)?;
    let after = decode(&change.after)?;
    ChangeEvent::new(change.kind, before, after).map_err(|e: ValidationError| e.to_string())
}

impl<T: SouthboundEntity, C: OperationClassifier + 'static> DataTreeChangeListener for Listener<T, C> {
    fn on_data_tree_changed(&self, changes: &[DataTreeModification]) {
        let events: Vec<ChangeEvent<T>> = changes
            .iter()
            .filter_map(|change| {
                to_event(change)
                    .map_err(|error| warn!(kind = %T::KIND, path = %change.path, %error, "skipping undecodable change"))
                    .ok()
            })
            .collect();
        self.on_changes(&events);
    }
}
