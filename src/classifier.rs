//! Operation classification.
//!
//! Maps a change event to the southbound REST operation it requires and the
//! snapshot to send. Classifiers are pure: no shared state, no I/O.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::change::{ChangeEvent, ModificationKind};

/// Southbound REST operation. Derived per event, never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RestOperation {
    /// Create.
    Post,
    /// Replace.
    Put,
    /// Remove.
    Delete,
}

impl RestOperation {
    /// HTTP method name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Delete => "DELETE",
        }
    }

    /// True if the request carries a body.
    #[must_use]
    pub const fn has_body(&self) -> bool {
        matches!(self, Self::Post | Self::Put)
    }
}

impl fmt::Display for RestOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Selects the REST operation for a change event.
pub trait OperationClassifier: Send + Sync {
    /// Returns the operation and the snapshot to export, or `None` to drop
    /// the event.
    fn classify<'a, T>(&self, event: &'a ChangeEvent<T>) -> Option<(RestOperation, &'a T)>;
}

/// Default policy.
///
/// - `Deleted` → `DELETE` with the before snapshot.
/// - `Created` → `POST` with the after snapshot.
/// - `Updated`, `Written`, `SubtreeModified` → `POST` when there was no
///   before snapshot, `PUT` otherwise.
/// - Anything else is dropped.
#[derive(Debug, Default, Clone, Copy)]
pub struct PresenceClassifier;

impl OperationClassifier for PresenceClassifier {
    fn classify<'a, T>(&self, event: &'a ChangeEvent<T>) -> Option<(RestOperation, &'a T)> {
        match event.kind() {
            ModificationKind::Deleted => event.before().map(|b| (RestOperation::Delete, b)),
            ModificationKind::Created => event.after().map(|a| (RestOperation::Post, a)),
            ModificationKind::Updated | ModificationKind::Written | ModificationKind::SubtreeModified => {
                let op = if event.before().is_none() {
                    RestOperation::Post
                } else {
                    RestOperation::Put
                };
                event.after().map(|a| (op, a))
            }
            ModificationKind::Unmodified => None,
        }
    }
}

/// Every write becomes a `PUT`; deletions stay `DELETE`.
///
/// Used for kinds whose agents treat `PUT` as create-or-replace.
#[derive(Debug, Default, Clone, Copy)]
pub struct PutOnWrite;

impl OperationClassifier for PutOnWrite {
    fn classify<'a, T>(&self, event: &'a ChangeEvent<T>) -> Option<(RestOperation, &'a T)> {
        match event.kind() {
            ModificationKind::Deleted => event.before().map(|b| (RestOperation::Delete, b)),
            ModificationKind::Created
            | ModificationKind::Updated
            | ModificationKind::Written
            | ModificationKind::SubtreeModified => event.after().map(|a| (RestOperation::Put, a)),
            ModificationKind::Unmodified => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deleted_maps_to_delete_with_before() {
        let ev = ChangeEvent::deleted("acl1");
        assert_eq!(PresenceClassifier.classify(&ev), Some((RestOperation::Delete, &"acl1")));
    }

    #[test]
    fn created_maps_to_post_with_after() {
        let ev = ChangeEvent::created("sf1");
        assert_eq!(PresenceClassifier.classify(&ev), Some((RestOperation::Post, &"sf1")));
    }

    #[test]
    fn update_without_before_is_post() {
        let ev = ChangeEvent::new(ModificationKind::Updated, None, Some("sf1")).unwrap();
        assert_eq!(PresenceClassifier.classify(&ev), Some((RestOperation::Post, &"sf1")));
    }

    #[test]
    fn update_with_before_is_put_with_after() {
        let ev = ChangeEvent::updated("old", "new");
        assert_eq!(PresenceClassifier.classify(&ev), Some((RestOperation::Put, &"new")));

        let ev = ChangeEvent::new(ModificationKind::SubtreeModified, Some("old"), Some("new")).unwrap();
        assert_eq!(PresenceClassifier.classify(&ev), Some((RestOperation::Put, &"new")));

        let ev = ChangeEvent::written(None, "new");
        assert_eq!(PresenceClassifier.classify(&ev), Some((RestOperation::Post, &"new")));
    }

    #[test]
    fn unmodified_is_dropped() {
        let ev = ChangeEvent::new(ModificationKind::Unmodified, Some(1), Some(1)).unwrap();
        assert_eq!(PresenceClassifier.classify(&ev), None);
        assert_eq!(PutOnWrite.classify(&ev), None);
    }

    #[test]
    fn put_on_write_never_posts() {
        let ev = ChangeEvent::created("sfg1");
        assert_eq!(PutOnWrite.classify(&ev), Some((RestOperation::Put, &"sfg1")));
        let ev = ChangeEvent::deleted("sfg1");
        assert_eq!(PutOnWrite.classify(&ev), Some((RestOperation::Delete, &"sfg1")));
    }

    #[test]
    fn operation_names() {
        assert_eq!(RestOperation::Delete.to_string(), "DELETE");
        assert!(!RestOperation::Delete.has_body());
        assert!(RestOperation::Put.has_body());
    }
}
