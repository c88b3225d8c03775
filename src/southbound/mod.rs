//! Southbound REST side: payload export and request delivery.

mod exporter;
#[cfg(feature = "http")]
mod http;
mod sink;

pub use exporter::{Exporter, JsonExporter};
#[cfg(feature = "http")]
pub use http::HttpRestSink;
pub use sink::{RecordingSink, RestRequest, RestSink};
