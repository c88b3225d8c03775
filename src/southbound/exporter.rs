//! Kind-specific JSON exporters.

use std::marker::PhantomData;

use serde_json::{Map, Value as JsonValue};

use crate::entity::SouthboundEntity;
use crate::error::ExportError;

/// Serializes an entity into the body of a southbound request.
pub trait Exporter<T>: Send + Sync {
    /// Produce the request body.
    fn export(&self, entity: &T) -> Result<String, ExportError>;
}

/// Wraps the entity in a single-element list named after its kind:
/// `{"service-function": [{...}]}`.
#[derive(Debug)]
pub struct JsonExporter<T> {
    _marker: PhantomData<fn(&T)>,
}

impl<T> JsonExporter<T> {
    /// Create an exporter.
    #[must_use]
    pub const fn new() -> Self {
        Self { _marker: PhantomData }
    }
}

impl<T> Default for JsonExporter<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: SouthboundEntity> Exporter<T> for JsonExporter<T> {
    fn export(&self, entity: &T) -> Result<String, ExportError> {
        let value = serde_json::to_value(entity).map_err(|source| ExportError::Json {
            kind: T::KIND.as_str(),
            source,
        })?;
        let mut body = Map::new();
        body.insert(T::CONTAINER.to_string(), JsonValue::Array(vec![value]));
        serde_json::to_string(&JsonValue::Object(body)).map_err(|source| ExportError::Json {
            kind: T::KIND.as_str(),
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::model::{AccessList, ServiceFunction};

    #[test]
    fn wraps_entity_in_named_list() {
        let sf = ServiceFunction::new("sf1").with_rest_uri("http://h:5000");
        let body = JsonExporter::<ServiceFunction>::new().export(&sf).unwrap();
        let v: JsonValue = serde_json::from_str(&body).unwrap();
        assert_eq!(v["service-function"][0]["name"], "sf1");
        assert_eq!(v["service-function"][0]["rest-uri"], "http://h:5000");
    }

    #[test]
    fn acl_container_name() {
        let body = JsonExporter::<AccessList>::new()
            .export(&AccessList::new("acl1"))
            .unwrap();
        let v: JsonValue = serde_json::from_str(&body).unwrap();
        assert_eq!(v["acl"][0]["acl-name"], "acl1");
    }
}
