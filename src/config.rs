//! Synchronizer configuration.
//!
//! Every section has defaults, so an empty JSON object is a valid config.
//! Pool sizes are per entity kind so one busy kind cannot starve the others.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::entity::EntityKind;
use crate::error::{SyncResult, ValidationError};

/// How a dispatcher maps tasks onto its workers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OrderingMode {
    /// Each resource key hashes to one worker lane: strict per-key order.
    #[default]
    KeyAffinity,
    /// One FIFO queue shared by all workers: same-key tasks may overlap.
    SharedQueue,
}

/// Worker pool settings for one entity kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields, rename_all = "kebab-case")]
pub struct DispatcherConfig {
    /// Number of worker threads.
    pub workers: usize,
    /// Maximum queued tasks (per lane in key-affinity mode). `None` queues
    /// without limit; a bound makes `submit` reject tasks once it is reached.
    pub queue_capacity: Option<usize>,
    /// Task-to-worker mapping.
    pub ordering: OrderingMode,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            workers: 10,
            queue_capacity: None,
            ordering: OrderingMode::KeyAffinity,
        }
    }
}

impl DispatcherConfig {
    /// Default settings with `workers` threads.
    #[must_use]
    pub fn with_workers(workers: usize) -> Self {
        Self {
            workers,
            ..Self::default()
        }
    }

    /// Built-in pool settings for `kind`.
    #[must_use]
    pub fn default_for(kind: EntityKind) -> Self {
        match kind {
            EntityKind::ServiceFunctionGroup => Self::with_workers(5),
            EntityKind::ServiceFunction | EntityKind::ServiceFunctionForwarder | EntityKind::AccessList => {
                Self::with_workers(10)
            }
        }
    }
}

/// Serialized store accessor settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields, rename_all = "kebab-case")]
pub struct AccessorConfig {
    /// Maximum queued jobs per resource family. Submitters block when full.
    pub queue_capacity: usize,
}

impl Default for AccessorConfig {
    fn default() -> Self {
        Self { queue_capacity: 256 }
    }
}

/// Southbound HTTP client settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields, rename_all = "kebab-case")]
pub struct HttpConfig {
    /// Whole-request timeout.
    pub timeout_ms: u64,
    /// Basic-auth user, if the agents require one.
    pub username: Option<String>,
    /// Basic-auth password.
    pub password: Option<String>,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 5_000,
            username: None,
            password: None,
        }
    }
}

/// Logging settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields, rename_all = "kebab-case")]
pub struct LoggingConfig {
    /// `tracing-subscriber` filter directive; `RUST_LOG` takes precedence.
    pub filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
        }
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields, rename_all = "kebab-case")]
pub struct SyncConfig {
    /// Per-kind pool overrides; missing kinds use `DispatcherConfig::default_for`.
    pub dispatchers: BTreeMap<EntityKind, DispatcherConfig>,
    /// Accessor settings.
    pub accessor: AccessorConfig,
    /// HTTP client settings.
    pub http: HttpConfig,
    /// Logging settings.
    pub logging: LoggingConfig,
}

impl SyncConfig {
    /// Parse and validate a JSON document.
    pub fn from_json_str(json: &str) -> SyncResult<Self> {
        let config: Self = serde_json::from_str(json).map_err(|e| ValidationError::InvalidConfig {
            reason: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a JSON file.
    pub fn from_file(path: impl AsRef<Path>) -> SyncResult<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    /// Effective pool settings for `kind`.
    #[must_use]
    pub fn dispatcher(&self, kind: EntityKind) -> DispatcherConfig {
        self.dispatchers
            .get(&kind)
            .cloned()
            .unwrap_or_else(|| DispatcherConfig::default_for(kind))
    }

    /// Reject settings that cannot run.
    pub fn validate(&self) -> Result<(), ValidationError> {
        for (kind, d) in &self.dispatchers {
            if d.workers == 0 {
                return Err(ValidationError::InvalidConfig {
                    reason: format!("dispatcher '{kind}' needs at least one worker"),
                });
            }
            if d.queue_capacity == Some(0) {
                return Err(ValidationError::InvalidConfig {
                    reason: format!("dispatcher '{kind}' needs a non-zero queue capacity"),
                });
            }
        }
        if self.accessor.queue_capacity == 0 {
            return Err(ValidationError::InvalidConfig {
                reason: "accessor needs a non-zero queue capacity".to_string(),
            });
        }
        if self.http.timeout_ms == 0 {
            return Err(ValidationError::InvalidConfig {
                reason: "http timeout must be non-zero".to_string(),
            });
        }
        Ok(())
    }
}
