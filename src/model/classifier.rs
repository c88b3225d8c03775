//! Service function classifiers and their operational state.

use serde::{Deserialize, Serialize};

use crate::accessor::ChildList;
use crate::entity::{ResourceKey, TreeEntity};

/// A classifier binds an ACL to the forwarders that apply it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ServiceFunctionClassifier {
    /// Unique name, the list key.
    pub name: String,
    /// Name of the ACL this classifier matches on.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_list: Option<String>,
    /// Forwarders applying this classifier.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub scl_service_function_forwarder: Vec<SclServiceFunctionForwarder>,
}

/// Reference from a classifier to a forwarder.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct SclServiceFunctionForwarder {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interface: Option<String>,
}

impl ServiceFunctionClassifier {
    /// A classifier over `access_list` applied at the named forwarders.
    #[must_use]
    pub fn new(name: impl Into<String>, access_list: impl Into<String>, forwarders: &[&str]) -> Self {
        Self {
            name: name.into(),
            access_list: Some(access_list.into()),
            scl_service_function_forwarder: forwarders
                .iter()
                .map(|f| SclServiceFunctionForwarder {
                    name: (*f).to_string(),
                    interface: None,
                })
                .collect(),
        }
    }
}

impl TreeEntity for ServiceFunctionClassifier {
    const LIST_PATH: &'static str = "service-function-classifiers/service-function-classifier";

    fn key(&self) -> ResourceKey {
        ResourceKey::new(self.name.as_str())
    }
}

/// Operational state of a classifier: the rendered paths it feeds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ClassifierState {
    /// Classifier name, the list key.
    pub name: String,
    /// Rendered service paths using this classifier, in insertion order.
    #[serde(default)]
    pub scl_rendered_service_path: Vec<SclRenderedServicePath>,
}

/// Reference to a rendered service path.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SclRenderedServicePath {
    pub name: String,
}

impl SclRenderedServicePath {
    /// Reference the rendered path `name`.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl ClassifierState {
    /// Names of the referenced rendered paths.
    #[must_use]
    pub fn rendered_path_names(&self) -> Vec<&str> {
        self.scl_rendered_service_path
            .iter()
            .map(|p| p.name.as_str())
            .collect()
    }
}

impl TreeEntity for ClassifierState {
    const LIST_PATH: &'static str = "service-function-classifiers-state/service-function-classifier-state";

    fn key(&self) -> ResourceKey {
        ResourceKey::new(self.name.as_str())
    }
}

impl ChildList<SclRenderedServicePath> for ClassifierState {
    fn empty(key: &ResourceKey) -> Self {
        Self {
            name: key.to_string(),
            scl_rendered_service_path: Vec::new(),
        }
    }

    fn upsert_child(&mut self, child: SclRenderedServicePath) {
        match self
            .scl_rendered_service_path
            .iter_mut()
            .find(|p| p.name == child.name)
        {
            Some(existing) => *existing = child,
            None => self.scl_rendered_service_path.push(child),
        }
    }

    fn remove_child(&mut self, child_key: &ResourceKey) -> bool {
        let before = self.scl_rendered_service_path.len();
        self.scl_rendered_service_path
            .retain(|p| p.name != child_key.as_str());
        self.scl_rendered_service_path.len() != before
    }
}
