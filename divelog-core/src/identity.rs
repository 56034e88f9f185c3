//! Identity types for divelog entities

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::{DiveLogResult, ValidationError};

/// Timestamp type using UTC timezone.
pub type Timestamp = DateTime<Utc>;

/// Opaque, store-assigned entity identifier.
///
/// UUIDv7 so identifiers sort by creation time. Serialized as the hyphenated
/// string form, which is also the canonical form used for equality checks in
/// reference lists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(Uuid);

impl EntityId {
    pub const fn new(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Generate a fresh, timestamp-sortable identifier.
    pub fn now_v7() -> Self {
        Self(Uuid::now_v7())
    }

    pub const fn nil() -> Self {
        Self(Uuid::nil())
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for EntityId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

impl From<Uuid> for EntityId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl From<EntityId> for serde_json::Value {
    fn from(id: EntityId) -> Self {
        serde_json::Value::String(id.to_string())
    }
}

/// Entities that carry their own identifier once persisted.
pub trait Identified {
    /// The identifier, absent for entities that were never stored.
    fn entity_id(&self) -> Option<EntityId>;
}

// ============================================================================
// REFERENCES
// ============================================================================

/// A reference field that holds either a raw identifier or, after relation
/// expansion, the fully loaded entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Ref<T> {
    Id(EntityId),
    Loaded(Box<T>),
}

impl<T> Ref<T> {
    /// The loaded entity, if this reference has been expanded.
    pub fn loaded(&self) -> Option<&T> {
        match self {
            Ref::Id(_) => None,
            Ref::Loaded(entity) => Some(entity),
        }
    }

    pub fn is_loaded(&self) -> bool {
        matches!(self, Ref::Loaded(_))
    }
}

impl<T> From<EntityId> for Ref<T> {
    fn from(id: EntityId) -> Self {
        Ref::Id(id)
    }
}

/// Anything that names an entity: a raw identifier, a reference, or the
/// entity itself.
pub trait ResolveId {
    fn resolve_id(&self) -> Option<EntityId>;
}

impl ResolveId for EntityId {
    fn resolve_id(&self) -> Option<EntityId> {
        Some(*self)
    }
}

impl<T: Identified> ResolveId for Ref<T> {
    fn resolve_id(&self) -> Option<EntityId> {
        match self {
            Ref::Id(id) => Some(*id),
            Ref::Loaded(entity) => entity.entity_id(),
        }
    }
}

impl<R: ResolveId + ?Sized> ResolveId for &R {
    fn resolve_id(&self) -> Option<EntityId> {
        (**self).resolve_id()
    }
}

/// Normalize a reference or entity into its canonical identifier.
///
/// Returns `None` only for a loaded entity that was never persisted.
pub fn resolve_id(reference: &impl ResolveId) -> Option<EntityId> {
    reference.resolve_id()
}

/// Like [`resolve_id`], failing when no identifier is available.
///
/// # Errors
/// Returns `ValidationError::RequiredFieldMissing` naming `resource.id`.
pub fn require_id(reference: &impl ResolveId, resource: &'static str) -> DiveLogResult<EntityId> {
    reference.resolve_id().ok_or_else(|| {
        ValidationError::RequiredFieldMissing {
            resource,
            field: "id".to_string(),
        }
        .into()
    })
}

/// Whether a reference list names `id`, comparing canonical identifiers.
pub fn contains_id<T: Identified>(refs: &[Ref<T>], id: EntityId) -> bool {
    refs.iter().any(|r| r.resolve_id() == Some(id))
}
