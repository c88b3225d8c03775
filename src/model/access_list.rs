//! IETF access lists, pushed to the forwarders of the classifiers that use them.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::entity::{EntityKind, ResourceKey, SouthboundEntity, TreeEntity};

/// An access control list. Classifiers reference ACLs by name.
///
/// ACLs carry no southbound address of their own; they are pushed to the
/// forwarders of every classifier that uses them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct AccessList {
    /// Unique name, the list key.
    pub acl_name: String,
    /// ACL flavour (ipv4, ipv6, eth, ...).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub acl_type: Option<String>,
    /// Ordered rules.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub aces: Vec<AccessListEntry>,
}

/// One ACL rule. Match and action bodies are passed through untouched.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct AccessListEntry {
    pub rule_name: String,
    #[serde(default)]
    pub matches: JsonValue,
    #[serde(default)]
    pub actions: JsonValue,
}

impl AccessList {
    /// An empty ACL.
    #[must_use]
    pub fn new(acl_name: impl Into<String>) -> Self {
        Self {
            acl_name: acl_name.into(),
            acl_type: None,
            aces: Vec::new(),
        }
    }
}

impl TreeEntity for AccessList {
    const LIST_PATH: &'static str = "access-lists/acl";

    fn key(&self) -> ResourceKey {
        ResourceKey::new(self.acl_name.as_str())
    }
}

impl SouthboundEntity for AccessList {
    const KIND: EntityKind = EntityKind::AccessList;
    const REST_PATH: &'static str = "/config/ietf-access-control-list:access-lists/acl/";
    const CONTAINER: &'static str = "acl";

    fn rest_uri(&self) -> Option<&str> {
        None
    }
}
