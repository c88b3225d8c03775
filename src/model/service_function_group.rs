//! Service function groups.

use serde::{Deserialize, Serialize};

use crate::entity::{EntityKind, ResourceKey, SouthboundEntity, TreeEntity};

/// A load-balanced group of interchangeable service functions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ServiceFunctionGroup {
    /// Unique name, the list key.
    pub name: String,
    /// Type shared by every member.
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub group_type: Option<String>,
    /// Base URI of the agent managing this group.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rest_uri: Option<String>,
    /// Selection algorithm name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub algorithm: Option<String>,
    /// Member functions.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sfc_service_function: Vec<SfgMember>,
}

/// Reference to a member service function.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SfgMember {
    pub name: String,
}

impl ServiceFunctionGroup {
    /// A group with only its name set.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            group_type: None,
            rest_uri: None,
            algorithm: None,
            sfc_service_function: Vec::new(),
        }
    }

    /// Set the southbound base URI.
    #[must_use]
    pub fn with_rest_uri(mut self, uri: impl Into<String>) -> Self {
        self.rest_uri = Some(uri.into());
        self
    }
}

impl TreeEntity for ServiceFunctionGroup {
    const LIST_PATH: &'static str = "service-function-groups/service-function-group";

    fn key(&self) -> ResourceKey {
        ResourceKey::new(self.name.as_str())
    }
}

impl SouthboundEntity for ServiceFunctionGroup {
    const KIND: EntityKind = EntityKind::ServiceFunctionGroup;
    const REST_PATH: &'static str = "/config/service-function-group:service-function-groups/service-function-group/";
    const CONTAINER: &'static str = "service-function-group";

    fn rest_uri(&self) -> Option<&str> {
        self.rest_uri.as_deref()
    }
}
