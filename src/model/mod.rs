//! Data-tree entity models.
//!
//! Field names follow the tree's kebab-case JSON representation so stored
//! documents, change notifications and southbound payloads share one shape.

mod access_list;
mod classifier;
mod forwarder;
mod service_function;
mod service_function_group;

pub use access_list::{AccessList, AccessListEntry};
pub use classifier::{ClassifierState, SclRenderedServicePath, SclServiceFunctionForwarder, ServiceFunctionClassifier};
pub use forwarder::ServiceFunctionForwarder;
pub use service_function::{DataPlaneLocator, ServiceFunction};
pub use service_function_group::{ServiceFunctionGroup, SfgMember};
