//! Entity identity and kind metadata.
//!
//! Every synchronized entity lives at `<list path>/<key>` in the data tree.
//! Southbound entities additionally know their REST path suffix and where
//! their southbound endpoint lives.

use std::fmt;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::storage::TreePath;

/// Opaque identifier of a tree entity, unique within its subtree.
///
/// # Examples
///
/// ```
/// use sbsync::ResourceKey;
///
/// let key = ResourceKey::new("sf1");
/// assert_eq!(key.as_str(), "sf1");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceKey(String);

impl ResourceKey {
    /// Wraps a key value.
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Returns the key as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ResourceKey {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for ResourceKey {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Kinds of entities synchronized southbound. Each kind gets its own pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EntityKind {
    /// Service function.
    ServiceFunction,
    /// Service function group.
    ServiceFunctionGroup,
    /// Service function forwarder.
    ServiceFunctionForwarder,
    /// Access control list.
    AccessList,
}

impl EntityKind {
    /// All southbound kinds.
    pub const ALL: [Self; 4] = [
        Self::ServiceFunction,
        Self::ServiceFunctionGroup,
        Self::ServiceFunctionForwarder,
        Self::AccessList,
    ];

    /// Returns the canonical kebab-case name, also used for worker names.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::ServiceFunction => "service-function",
            Self::ServiceFunctionGroup => "service-function-group",
            Self::ServiceFunctionForwarder => "service-function-forwarder",
            Self::AccessList => "access-list",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An entity stored as a keyed list entry in the data tree.
pub trait TreeEntity: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    /// Path of the list that holds entries of this type.
    const LIST_PATH: &'static str;

    /// The entity's key within its list.
    fn key(&self) -> ResourceKey;

    /// Path of the list node.
    #[must_use]
    fn list_path() -> TreePath {
        TreePath::from_static(Self::LIST_PATH)
    }

    /// Path of the entry identified by `key`.
    #[must_use]
    fn path_for(key: &ResourceKey) -> TreePath {
        Self::list_path().child(key.as_str())
    }
}

/// An entity that is pushed to network elements over REST.
pub trait SouthboundEntity: TreeEntity {
    /// Entity kind.
    const KIND: EntityKind;

    /// Fixed REST path appended to the base URI, ending in `/`.
    const REST_PATH: &'static str;

    /// JSON list name used by the exporter, e.g. `service-function`.
    const CONTAINER: &'static str;

    /// Base URI of the entity's own southbound endpoint, if configured.
    fn rest_uri(&self) -> Option<&str>;
}
