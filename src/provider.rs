//! Synchronizer wiring.
//!
//! `SouthboundSync` owns one dispatcher per entity kind, the listener
//! registrations that feed them, and the accessor registry used by the
//! store APIs.

use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tracing::info;

use crate::accessor::Accessors;
use crate::api::ServiceClassifierApi;
use crate::classifier::{PresenceClassifier, PutOnWrite};
use crate::config::SyncConfig;
use crate::dispatcher::{Dispatcher, DispatcherStats};
use crate::entity::{EntityKind, SouthboundEntity};
use crate::error::{SyncError, SyncResult};
use crate::listener::Listener;
use crate::model::{AccessList, ServiceFunction, ServiceFunctionForwarder, ServiceFunctionGroup};
use crate::resolve::ClassifierForwarders;
use crate::southbound::{JsonExporter, RestSink};
use crate::storage::{DataStore, ListenerRegistration};
use crate::task::SelfAddressed;

fn dispatcher<T: SouthboundEntity>(config: &SyncConfig, sink: &Arc<dyn RestSink>) -> SyncResult<Arc<Dispatcher<T>>> {
    let dispatcher = Dispatcher::start(&config.dispatcher(T::KIND), Arc::clone(sink), Arc::new(JsonExporter::<T>::new()))?;
    Ok(Arc::new(dispatcher))
}

/// The running southbound synchronizer.
pub struct SouthboundSync {
    accessors: Accessors,
    service_functions: Arc<Dispatcher<ServiceFunction>>,
    groups: Arc<Dispatcher<ServiceFunctionGroup>>,
    forwarders: Arc<Dispatcher<ServiceFunctionForwarder>>,
    access_lists: Arc<Dispatcher<AccessList>>,
    registrations: Mutex<Vec<ListenerRegistration>>,
}

impl fmt::Debug for SouthboundSync {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SouthboundSync")
            .field("service_functions", &self.service_functions)
            .field("groups", &self.groups)
            .field("forwarders", &self.forwarders)
            .field("access_lists", &self.access_lists)
            .finish_non_exhaustive()
    }
}

impl SouthboundSync {
    /// Start the dispatchers and register the four listeners on `store`.
    ///
    /// Entities already in the store are delivered to the listeners as
    /// creations right away.
    pub fn start(config: &SyncConfig, store: Arc<dyn DataStore>, sink: Arc<dyn RestSink>) -> SyncResult<Self> {
        config.validate()?;

        let service_functions = dispatcher::<ServiceFunction>(config, &sink)?;
        let groups = dispatcher::<ServiceFunctionGroup>(config, &sink)?;
        let forwarders = dispatcher::<ServiceFunctionForwarder>(config, &sink)?;
        let access_lists = dispatcher::<AccessList>(config, &sink)?;

        let registrations = vec![
            Arc::new(Listener::new(Arc::clone(&service_functions))).register(store.as_ref())?,
            Arc::new(Listener::with_parts(PutOnWrite, Arc::new(SelfAddressed), Arc::clone(&groups)))
                .register(store.as_ref())?,
            Arc::new(Listener::new(Arc::clone(&forwarders))).register(store.as_ref())?,
            Arc::new(Listener::with_parts(
                PresenceClassifier,
                Arc::new(ClassifierForwarders::new(Arc::clone(&store))),
                Arc::clone(&access_lists),
            ))
            .register(store.as_ref())?,
        ];

        info!(listeners = registrations.len(), "southbound synchronizer started");
        Ok(Self {
            accessors: Accessors::new(store, config.accessor.clone()),
            service_functions,
            groups,
            forwarders,
            access_lists,
            registrations: Mutex::new(registrations),
        })
    }

    /// Start with an HTTP sink built from `config.http`.
    #[cfg(feature = "http")]
    pub fn start_http(config: &SyncConfig, store: Arc<dyn DataStore>) -> SyncResult<Self> {
        let sink = crate::southbound::HttpRestSink::new(&config.http)?;
        Self::start(config, store, Arc::new(sink))
    }

    /// The accessor registry shared by store APIs.
    #[must_use]
    pub const fn accessors(&self) -> &Accessors {
        &self.accessors
    }

    /// Classifier store API over this synchronizer's accessors.
    pub fn classifier_api(&self) -> SyncResult<ServiceClassifierApi> {
        ServiceClassifierApi::new(&self.accessors)
    }

    /// Counters of one kind's dispatcher.
    #[must_use]
    pub fn stats(&self, kind: EntityKind) -> DispatcherStats {
        match kind {
            EntityKind::ServiceFunction => self.service_functions.stats(),
            EntityKind::ServiceFunctionGroup => self.groups.stats(),
            EntityKind::ServiceFunctionForwarder => self.forwarders.stats(),
            EntityKind::AccessList => self.access_lists.stats(),
        }
    }

    /// Wait until every dispatcher has executed what it accepted.
    pub fn wait_idle(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let remaining = || deadline.saturating_duration_since(Instant::now());
        self.service_functions.wait_idle(remaining())
            && self.groups.wait_idle(remaining())
            && self.forwarders.wait_idle(remaining())
            && self.access_lists.wait_idle(remaining())
    }

    /// Unregister the listeners, then drain and stop the dispatchers.
    /// Idempotent.
    pub fn shutdown(&self) -> SyncResult<()> {
        let registrations = std::mem::take(
            &mut *self
                .registrations
                .lock()
                .map_err(|_| SyncError::internal("poisoned lock: registrations"))?,
        );
        let stopping = !registrations.is_empty();
        for registration in registrations {
            registration.close();
        }

        self.service_functions.shutdown();
        self.groups.shutdown();
        self.forwarders.shutdown();
        self.access_lists.shutdown();
        if stopping {
            info!("southbound synchronizer stopped");
        }
        Ok(())
    }
}

impl Drop for SouthboundSync {
    fn drop(&mut self) {
        let _ = self.shutdown();
    }
}
