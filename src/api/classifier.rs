//! Classifier and classifier-state access.
//!
//! Classifiers live in the configuration partition; their state (the
//! rendered paths that use them) is operational. Every call goes through the
//! classifier family's accessor, so concurrent appends to one state entry
//! cannot lose updates.

use std::sync::Arc;

use crate::accessor::{Accessors, SerializedAccessor};
use crate::entity::ResourceKey;
use crate::error::SyncResult;
use crate::model::{ClassifierState, SclRenderedServicePath, ServiceFunctionClassifier};
use crate::storage::Datastore;

/// Store operations on classifiers and their state.
#[derive(Debug, Clone)]
pub struct ServiceClassifierApi {
    accessor: Arc<SerializedAccessor>,
}

impl ServiceClassifierApi {
    /// Resource family shared by classifiers and classifier state.
    pub const FAMILY: &'static str = "service-function-classifier";

    /// Bind to the classifier family's accessor.
    pub fn new(accessors: &Accessors) -> SyncResult<Self> {
        Ok(Self {
            accessor: accessors.get(Self::FAMILY)?,
        })
    }

    /// Read a classifier by name.
    #[must_use]
    pub fn read_classifier(&self, name: &str) -> Option<ServiceFunctionClassifier> {
        self.accessor.read(&ResourceKey::new(name), Datastore::Configuration)
    }

    /// Create or replace a classifier.
    #[must_use]
    pub fn write_classifier(&self, classifier: &ServiceFunctionClassifier) -> bool {
        self.accessor.write(classifier, Datastore::Configuration)
    }

    /// Remove a classifier.
    #[must_use]
    pub fn delete_classifier(&self, name: &str) -> bool {
        self.accessor
            .delete::<ServiceFunctionClassifier>(&ResourceKey::new(name), Datastore::Configuration)
    }

    /// Record that `rendered_path` uses `classifier`, creating the state
    /// entry on first use.
    #[must_use]
    pub fn add_rendered_path(&self, classifier: &str, rendered_path: &str) -> bool {
        self.accessor.merge_append::<ClassifierState, _>(
            &ResourceKey::new(classifier),
            SclRenderedServicePath::new(rendered_path),
            Datastore::Operational,
        )
    }

    /// Forget that `rendered_path` uses `classifier`.
    #[must_use]
    pub fn remove_rendered_path(&self, classifier: &str, rendered_path: &str) -> bool {
        self.accessor.remove_child::<ClassifierState, SclRenderedServicePath>(
            &ResourceKey::new(classifier),
            &ResourceKey::new(rendered_path),
            Datastore::Operational,
        )
    }

    /// Read a classifier's state.
    #[must_use]
    pub fn read_state(&self, classifier: &str) -> Option<ClassifierState> {
        self.accessor.read(&ResourceKey::new(classifier), Datastore::Operational)
    }

    /// Remove a classifier's state entry.
    #[must_use]
    pub fn delete_state(&self, classifier: &str) -> bool {
        self.accessor
            .delete::<ClassifierState>(&ResourceKey::new(classifier), Datastore::Operational)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::config::AccessorConfig;
    use crate::storage::InMemoryDataStore;

    fn api() -> ServiceClassifierApi {
        let store = InMemoryDataStore::new().unwrap();
        let accessors = Accessors::new(Arc::new(store), AccessorConfig::default());
        ServiceClassifierApi::new(&accessors).unwrap()
    }

    #[test]
    fn classifier_crud() {
        let api = api();
        let c1 = ServiceFunctionClassifier::new("clsfName1", "accessList1", &["sffName1"]);
        let c2 = ServiceFunctionClassifier::new("clsfName2", "accessList2", &["sffName2"]);

        assert!(api.read_classifier("clsfName1").is_none());
        assert!(api.write_classifier(&c1));
        assert_eq!(api.read_classifier("clsfName1"), Some(c1.clone()));

        assert!(api.write_classifier(&c2));
        assert_eq!(api.read_classifier("clsfName1"), Some(c1));
        assert_eq!(api.read_classifier("clsfName2"), Some(c2));

        assert!(api.delete_classifier("clsfName1"));
        assert!(api.read_classifier("clsfName1").is_none());
    }

    #[test]
    fn rendered_paths_accumulate_in_state() {
        let api = api();
        assert!(api.read_state("clsfName").is_none());

        assert!(api.add_rendered_path("clsfName", "rspName1"));
        assert_eq!(api.read_state("clsfName").unwrap().rendered_path_names(), vec!["rspName1"]);

        assert!(api.add_rendered_path("clsfName", "rspName2"));
        assert_eq!(
            api.read_state("clsfName").unwrap().rendered_path_names(),
            vec!["rspName1", "rspName2"]
        );

        assert!(api.remove_rendered_path("clsfName", "rspName1"));
        assert_eq!(api.read_state("clsfName").unwrap().rendered_path_names(), vec!["rspName2"]);

        assert!(api.delete_state("clsfName"));
        assert!(api.read_state("clsfName").is_none());
        // Classifier configuration is untouched by state operations.
        assert!(api.read_classifier("clsfName").is_none());
    }
}
