//! Northbound-facing store APIs built on the serialized accessor.

mod classifier;

pub use classifier::ServiceClassifierApi;
