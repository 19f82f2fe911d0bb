use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use uuid::Uuid;

use bodega_core::{BrandId, CategoryId, ProductId, ProviderId, SnapshotId, UserId};

/// Kind of catalog entity a snapshot belongs to.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Product,
    Brand,
    Category,
    Provider,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Product => "product",
            EntityKind::Brand => "brand",
            EntityKind::Category => "category",
            EntityKind::Provider => "provider",
        }
    }
}

impl core::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Reference to one catalog entity, across all auditable kinds.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntityRef {
    pub kind: EntityKind,
    pub id: Uuid,
}

impl EntityRef {
    pub fn product(id: ProductId) -> Self {
        Self {
            kind: EntityKind::Product,
            id: id.into(),
        }
    }

    pub fn brand(id: BrandId) -> Self {
        Self {
            kind: EntityKind::Brand,
            id: id.into(),
        }
    }

    pub fn category(id: CategoryId) -> Self {
        Self {
            kind: EntityKind::Category,
            id: id.into(),
        }
    }

    pub fn provider(id: ProviderId) -> Self {
        Self {
            kind: EntityKind::Provider,
            id: id.into(),
        }
    }
}

impl core::fmt::Display for EntityRef {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}/{}", self.kind, self.id)
    }
}

/// What kind of mutation produced a snapshot.
///
/// Deletion in the catalog is normally logical (`active` flips to false);
/// both that retirement and the rare hard delete of a movement-free product
/// are tagged `Deleted`.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    Created,
    Updated,
    Deleted,
}

/// An immutable copy of a catalog entity's field values at a point in
/// mutation. Never mutated or deleted except by an explicit purge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditSnapshot {
    /// Store-assigned id (UUIDv7, time-ordered).
    pub id: SnapshotId,
    pub entity: EntityRef,
    pub change: ChangeKind,
    pub acting_user: UserId,
    /// Store-assigned commit time.
    pub recorded_at: DateTime<Utc>,
    /// Full field values of the entity after the mutation.
    pub fields: JsonValue,
}
