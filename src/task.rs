//! Southbound tasks.
//!
//! A `Task` is one REST operation on one entity, fanned out to zero or more
//! destination URIs. Destinations are only appended through `TaskBuilder`;
//! once built the task is immutable and may be executed any number of times.
//! Each destination succeeds or fails on its own, including one that is not
//! a usable http(s) URI.

use std::sync::OnceLock;

use regex::Regex;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::classifier::RestOperation;
use crate::entity::{ResourceKey, SouthboundEntity};
use crate::error::ValidationError;
use crate::southbound::{Exporter, RestRequest, RestSink};

static HTTP_URI: OnceLock<Result<Regex, regex::Error>> = OnceLock::new();

fn is_http_uri(uri: &str) -> bool {
    HTTP_URI
        .get_or_init(|| Regex::new(r"^https?://[^\s/]+(/\S*)?$"))
        .as_ref()
        .is_ok_and(|re| re.is_match(uri))
}

/// Computes the destination URIs of an entity.
pub trait DestinationResolver<T>: Send + Sync {
    /// Full destination URIs, in call order. Empty means nothing to do.
    fn destinations(&self, entity: &T) -> Vec<String>;
}

/// Destinations from the entity's own REST endpoint:
/// `<rest-uri><kind path><key>`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SelfAddressed;

impl<T: SouthboundEntity> DestinationResolver<T> for SelfAddressed {
    fn destinations(&self, entity: &T) -> Vec<String> {
        entity
            .rest_uri()
            .map(|base| destination_uri::<T>(base, &entity.key()))
            .into_iter()
            .collect()
    }
}

/// `<base><T::REST_PATH><key>`, tolerating a trailing `/` on `base`.
///
/// The key is percent-encoded as a single path segment.
#[must_use]
pub fn destination_uri<T: SouthboundEntity>(base: &str, key: &ResourceKey) -> String {
    format!(
        "{}{}{}",
        base.trim_end_matches('/'),
        T::REST_PATH,
        urlencoding::encode(key.as_str())
    )
}

/// Per-execution result counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TaskOutcome {
    /// Destinations that accepted the call.
    pub succeeded: usize,
    /// Destinations that failed.
    pub failed: usize,
}

/// One southbound operation.
#[derive(Debug, Clone, PartialEq)]
pub struct Task<T> {
    id: Uuid,
    operation: RestOperation,
    entity: T,
    destinations: Vec<String>,
}

impl<T: SouthboundEntity> Task<T> {
    /// Start building a task.
    #[must_use]
    pub fn builder(operation: RestOperation, entity: T) -> TaskBuilder<T> {
        TaskBuilder::new(operation, entity)
    }

    /// Unique task id, used in logs.
    #[must_use]
    pub const fn id(&self) -> Uuid {
        self.id
    }

    /// The REST operation.
    #[must_use]
    pub const fn operation(&self) -> RestOperation {
        self.operation
    }

    /// The entity snapshot sent (or deleted).
    #[must_use]
    pub const fn entity(&self) -> &T {
        &self.entity
    }

    /// Key of the entity; tasks with equal keys are ordered.
    #[must_use]
    pub fn key(&self) -> ResourceKey {
        self.entity.key()
    }

    /// Destination URIs in call order.
    #[must_use]
    pub fn destinations(&self) -> &[String] {
        &self.destinations
    }

    /// Issue the call against every destination, in order.
    ///
    /// Best effort: a failed or malformed destination is logged, counted as
    /// failed, and the remaining ones are still called.
    pub fn execute(&self, sink: &dyn RestSink, exporter: &dyn Exporter<T>) -> TaskOutcome {
        let mut outcome = TaskOutcome::default();
        if self.destinations.is_empty() {
            debug!(task = %self.id, kind = %T::KIND, key = %self.key(), "no southbound destination");
            return outcome;
        }

        let body = if self.operation.has_body() {
            match exporter.export(&self.entity) {
                Ok(body) => Some(body),
                Err(err) => {
                    error!(task = %self.id, kind = %T::KIND, key = %self.key(), error = %err, "export failed");
                    outcome.failed = self.destinations.len();
                    return outcome;
                }
            }
        } else {
            None
        };

        for uri in &self.destinations {
            if !is_http_uri(uri) {
                outcome.failed += 1;
                let err = ValidationError::InvalidUri { uri: uri.clone() };
                warn!(task = %self.id, kind = %T::KIND, error = %err, "skipping southbound destination");
                continue;
            }
            let request = RestRequest {
                operation: self.operation,
                uri: uri.clone(),
                body: body.clone(),
            };
            match sink.send(&request) {
                Ok(()) => {
                    outcome.succeeded += 1;
                    info!(task = %self.id, kind = %T::KIND, op = %self.operation, %uri, "southbound call done");
                }
                Err(err) => {
                    outcome.failed += 1;
                    warn!(task = %self.id, kind = %T::KIND, op = %self.operation, %uri, error = %err, "southbound call failed");
                }
            }
        }
        outcome
    }
}

/// Accumulates destinations before freezing them into a `Task`.
#[derive(Debug)]
pub struct TaskBuilder<T> {
    operation: RestOperation,
    entity: T,
    destinations: Vec<String>,
}

impl<T: SouthboundEntity> TaskBuilder<T> {
    /// A builder with no destinations.
    #[must_use]
    pub const fn new(operation: RestOperation, entity: T) -> Self {
        Self {
            operation,
            entity,
            destinations: Vec::new(),
        }
    }

    /// Append one destination.
    #[must_use]
    pub fn destination(mut self, uri: impl Into<String>) -> Self {
        self.destinations.push(uri.into());
        self
    }

    /// Append several destinations.
    #[must_use]
    pub fn destinations<I, S>(mut self, uris: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.destinations.extend(uris.into_iter().map(Into::into));
        self
    }

    /// Freeze the task.
    #[must_use]
    pub fn build(self) -> Task<T> {
        Task {
            id: Uuid::new_v4(),
            operation: self.operation,
            entity: self.entity,
            destinations: self.destinations,
        }
    }
}
