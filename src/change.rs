//! Change events produced by the data tree.
//!
//! A `ChangeEvent` is the typed view of one entity's modification: what it
//! looked like before the commit, what it looks like after, and the kind of
//! modification the store reported.

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Modification kind reported by the store for one tree node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ModificationKind {
    /// Node did not exist before the commit.
    Created,
    /// Node existed and was replaced.
    Updated,
    /// Generic write without a create/update distinction.
    Written,
    /// Node existed and some of its children changed (merge).
    SubtreeModified,
    /// Node was removed.
    Deleted,
    /// Metadata-only touch; carries no data change.
    Unmodified,
}

impl ModificationKind {
    /// Returns the canonical lowercase name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Updated => "updated",
            Self::Written => "written",
            Self::SubtreeModified => "subtree-modified",
            Self::Deleted => "deleted",
            Self::Unmodified => "unmodified",
        }
    }
}

/// One entity's before/after snapshot plus the modification kind.
///
/// Construction checks that the snapshot the kind depends on is present:
/// deletions carry `before`, everything that writes carries `after`.
/// `Updated`/`Written`/`SubtreeModified` may lack `before`; the operation
/// classifier treats such an event as a create.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeEvent<T> {
    kind: ModificationKind,
    before: Option<T>,
    after: Option<T>,
}

impl<T> ChangeEvent<T> {
    /// Build an event, validating the kind against the snapshots.
    pub fn new(kind: ModificationKind, before: Option<T>, after: Option<T>) -> Result<Self, ValidationError> {
        let (needs_before, needs_after, forbids_before, forbids_after) = match kind {
            ModificationKind::Created => (false, true, true, false),
            ModificationKind::Deleted => (true, false, false, true),
            ModificationKind::Updated | ModificationKind::Written | ModificationKind::SubtreeModified => {
                (false, true, false, false)
            }
            ModificationKind::Unmodified => (false, false, false, false),
        };

        if needs_before && before.is_none() {
            return Err(ValidationError::MissingField {
                field: "before".to_string(),
            });
        }
        if needs_after && after.is_none() {
            return Err(ValidationError::MissingField {
                field: "after".to_string(),
            });
        }
        if (forbids_before && before.is_some()) || (forbids_after && after.is_some()) {
            return Err(ValidationError::InconsistentEvent {
                kind: kind.as_str(),
            });
        }

        Ok(Self { kind, before, after })
    }

    /// A newly created entity.
    #[must_use]
    pub const fn created(after: T) -> Self {
        Self {
            kind: ModificationKind::Created,
            before: None,
            after: Some(after),
        }
    }

    /// An entity replaced in place.
    #[must_use]
    pub const fn updated(before: T, after: T) -> Self {
        Self {
            kind: ModificationKind::Updated,
            before: Some(before),
            after: Some(after),
        }
    }

    /// A generic write; `before` is present only if the entity already existed.
    #[must_use]
    pub const fn written(before: Option<T>, after: T) -> Self {
        Self {
            kind: ModificationKind::Written,
            before,
            after: Some(after),
        }
    }

    /// A removed entity.
    #[must_use]
    pub const fn deleted(before: T) -> Self {
        Self {
            kind: ModificationKind::Deleted,
            before: Some(before),
            after: None,
        }
    }

    /// The modification kind.
    #[must_use]
    pub const fn kind(&self) -> ModificationKind {
        self.kind
    }

    /// Snapshot before the commit.
    #[must_use]
    pub const fn before(&self) -> Option<&T> {
        self.before.as_ref()
    }

    /// Snapshot after the commit.
    #[must_use]
    pub const fn after(&self) -> Option<&T> {
        self.after.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deleted_requires_before() {
        let err = ChangeEvent::<u32>::new(ModificationKind::Deleted, None, None).unwrap_err();
        assert!(matches!(err, ValidationError::MissingField { ref field } if field == "before"));
    }

    #[test]
    fn created_rejects_before() {
        assert!(ChangeEvent::new(ModificationKind::Created, Some(1), Some(2)).is_err());
    }

    #[test]
    fn updated_allows_missing_before() {
        let ev = ChangeEvent::new(ModificationKind::Updated, None, Some(7)).unwrap();
        assert_eq!(ev.before(), None);
        assert_eq!(ev.after(), Some(&7));
    }

    #[test]
    fn unmodified_accepts_anything() {
        let ev = ChangeEvent::new(ModificationKind::Unmodified, Some(1), Some(1)).unwrap();
        assert_eq!(ev.kind(), ModificationKind::Unmodified);
    }

    #[test]
    fn kind_serializes_kebab_case() {
        let s = serde_json::to_string(&ModificationKind::SubtreeModified).unwrap();
        assert_eq!(s, "\"subtree-modified\"");
        assert_eq!(ModificationKind::SubtreeModified.as_str(), "subtree-modified");
    }
}
