//! Service function forwarders.

use serde::{Deserialize, Serialize};

use crate::entity::{EntityKind, ResourceKey, SouthboundEntity, TreeEntity};

/// A service function forwarder: steers traffic between service functions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ServiceFunctionForwarder {
    /// Unique name, the list key.
    pub name: String,
    /// Base URI of the agent running this forwarder.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rest_uri: Option<String>,
    /// Management address.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip_mgmt_address: Option<String>,
    /// Node hosting the forwarder.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_node: Option<String>,
}

impl ServiceFunctionForwarder {
    /// A forwarder with only its name set.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            rest_uri: None,
            ip_mgmt_address: None,
            service_node: None,
        }
    }

    /// Set the southbound base URI.
    #[must_use]
    pub fn with_rest_uri(mut self, uri: impl Into<String>) -> Self {
        self.rest_uri = Some(uri.into());
        self
    }
}

impl TreeEntity for ServiceFunctionForwarder {
    const LIST_PATH: &'static str = "service-function-forwarders/service-function-forwarder";

    fn key(&self) -> ResourceKey {
        ResourceKey::new(self.name.as_str())
    }
}

impl SouthboundEntity for ServiceFunctionForwarder {
    const KIND: EntityKind = EntityKind::ServiceFunctionForwarder;
    const REST_PATH: &'static str =
        "/config/service-function-forwarder:service-function-forwarders/service-function-forwarder/";
    const CONTAINER: &'static str = "service-function-forwarder";

    fn rest_uri(&self) -> Option<&str> {
        self.rest_uri.as_deref()
    }
}
