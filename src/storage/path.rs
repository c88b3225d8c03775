//! Tree paths.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Location of a node in the data tree, as a sequence of segments.
///
/// Keys are ordinary segments: the entry `sf1` of the service-function list
/// lives at `service-functions/service-function/sf1`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TreePath(Vec<String>);

impl TreePath {
    /// Parses a `/`-separated path. Empty paths and empty segments are rejected.
    pub fn parse(path: &str) -> Result<Self, ValidationError> {
        let trimmed = path.trim_matches('/');
        if trimmed.is_empty() {
            return Err(ValidationError::InvalidPath {
                path: path.to_string(),
                reason: "path is empty".to_string(),
            });
        }

        let mut segments = Vec::new();
        for segment in trimmed.split('/') {
            if segment.trim().is_empty() {
                return Err(ValidationError::InvalidPath {
                    path: path.to_string(),
                    reason: "empty segment".to_string(),
                });
            }
            segments.push(segment.to_string());
        }
        Ok(Self(segments))
    }

    /// Builds a path from a compile-time constant, skipping empty segments.
    #[must_use]
    pub fn from_static(path: &'static str) -> Self {
        Self(
            path.split('/')
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect(),
        )
    }

    /// Returns a new path with `segment` appended.
    #[must_use]
    pub fn child(&self, segment: impl Into<String>) -> Self {
        let mut segments = self.0.clone();
        segments.push(segment.into());
        Self(segments)
    }

    /// The parent path, or `None` for a single-segment path.
    #[must_use]
    pub fn parent(&self) -> Option<Self> {
        if self.0.len() <= 1 {
            return None;
        }
        Some(Self(self.0[..self.0.len() - 1].to_vec()))
    }

    /// Last segment (the key, for list entries).
    #[must_use]
    pub fn last(&self) -> Option<&str> {
        self.0.last().map(String::as_str)
    }

    /// Path segments.
    #[must_use]
    pub fn segments(&self) -> &[String] {
        &self.0
    }

    /// True if `self` equals `prefix` or lies below it.
    #[must_use]
    pub fn starts_with(&self, prefix: &Self) -> bool {
        self.0.starts_with(&prefix.0)
    }

    /// True if `self` is a direct child of `parent`.
    #[must_use]
    pub fn is_child_of(&self, parent: &Self) -> bool {
        self.0.len() == parent.0.len() + 1 && self.starts_with(parent)
    }
}

impl fmt::Display for TreePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.join("/"))
    }
}

impl TryFrom<String> for TreePath {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<TreePath> for String {
    fn from(value: TreePath) -> Self {
        value.to_string()
    }
}
