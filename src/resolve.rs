//! Destination lookup for entities that have no endpoint of their own.

use std::fmt;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;
use tracing::{debug, warn};

use crate::entity::{ResourceKey, TreeEntity};
use crate::model::{AccessList, ServiceFunctionClassifier, ServiceFunctionForwarder};
use crate::storage::{DataStore, Datastore, ReadWriteTransaction, StorageError};
use crate::task::{destination_uri, DestinationResolver};

/// Resolves an ACL to the forwarders that apply it.
///
/// Every configured classifier whose `access-list` names the ACL contributes
/// its forwarders; each forwarder with a `rest-uri` yields one destination.
/// Duplicates are dropped, first occurrence wins.
pub struct ClassifierForwarders {
    store: Arc<dyn DataStore>,
}

impl fmt::Debug for ClassifierForwarders {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClassifierForwarders").finish_non_exhaustive()
    }
}

impl ClassifierForwarders {
    /// Resolve against `store`'s configuration partition.
    #[must_use]
    pub fn new(store: Arc<dyn DataStore>) -> Self {
        Self { store }
    }

    fn resolve(&self, acl: &AccessList) -> Result<Vec<String>, StorageError> {
        let mut tx = self.store.new_transaction(Datastore::Configuration);
        let classifiers: Vec<ServiceFunctionClassifier> = tx
            .list(&ServiceFunctionClassifier::list_path())?
            .into_iter()
            .filter_map(decode_logged::<ServiceFunctionClassifier>)
            .filter(|c| c.access_list.as_deref() == Some(acl.acl_name.as_str()))
            .collect();

        let mut uris = Vec::new();
        for forwarder_ref in classifiers.iter().flat_map(|c| &c.scl_service_function_forwarder) {
            let Some(forwarder) = read::<ServiceFunctionForwarder>(&mut *tx, &ResourceKey::new(forwarder_ref.name.as_str()))?
            else {
                debug!(acl = %acl.acl_name, sff = %forwarder_ref.name, "classifier references unknown forwarder");
                continue;
            };
            if let Some(base) = forwarder.rest_uri.as_deref() {
                let uri = destination_uri::<AccessList>(base, &acl.key());
                if !uris.contains(&uri) {
                    uris.push(uri);
                }
            }
        }
        Ok(uris)
    }
}

fn decode_logged<T: DeserializeOwned>(value: JsonValue) -> Option<T> {
    serde_json::from_value(value)
        .map_err(|e| warn!(error = %e, "skipping undecodable tree entry"))
        .ok()
}

fn read<T: TreeEntity>(tx: &mut dyn ReadWriteTransaction, key: &ResourceKey) -> Result<Option<T>, StorageError> {
    Ok(tx.read(&T::path_for(key))?.and_then(decode_logged))
}

impl DestinationResolver<AccessList> for ClassifierForwarders {
    fn destinations(&self, acl: &AccessList) -> Vec<String> {
        self.resolve(acl).unwrap_or_else(|err| {
            warn!(acl = %acl.acl_name, error = %err, "failed to resolve acl destinations");
            Vec::new()
        })
    }
}
