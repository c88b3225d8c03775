//! Service functions.

use serde::{Deserialize, Serialize};

use crate::entity::{EntityKind, ResourceKey, SouthboundEntity, TreeEntity};

/// A service function instance (firewall, DPI, NAT, ...).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ServiceFunction {
    /// Unique name, the list key.
    pub name: String,
    /// Service function type.
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub sf_type: Option<String>,
    /// Base URI of the agent managing this function.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rest_uri: Option<String>,
    /// Management address.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip_mgmt_address: Option<String>,
    /// Data-plane attachment points.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sf_data_plane_locator: Vec<DataPlaneLocator>,
}

/// Where a service function attaches to the data plane.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct DataPlaneLocator {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transport: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_function_forwarder: Option<String>,
}

impl ServiceFunction {
    /// A function with only its name set.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            sf_type: None,
            rest_uri: None,
            ip_mgmt_address: None,
            sf_data_plane_locator: Vec::new(),
        }
    }

    /// Set the southbound base URI.
    #[must_use]
    pub fn with_rest_uri(mut self, uri: impl Into<String>) -> Self {
        self.rest_uri = Some(uri.into());
        self
    }

    /// Set the function type.
    #[must_use]
    pub fn with_type(mut self, sf_type: impl Into<String>) -> Self {
        self.sf_type = Some(sf_type.into());
        self
    }
}

impl TreeEntity for ServiceFunction {
    const LIST_PATH: &'static str = "service-functions/service-function";

    fn key(&self) -> ResourceKey {
        ResourceKey::new(self.name.as_str())
    }
}

impl SouthboundEntity for ServiceFunction {
    const KIND: EntityKind = EntityKind::ServiceFunction;
    const REST_PATH: &'static str = "/config/service-function:service-functions/service-function/";
    const CONTAINER: &'static str = "service-function";

    fn rest_uri(&self) -> Option<&str> {
        self.rest_uri.as_deref()
    }
}
