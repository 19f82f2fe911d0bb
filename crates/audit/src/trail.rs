//! Audit trail boundary: versioned snapshots of catalog entity state.
//!
//! The movement ledger is its own audit trail for stock; this trail covers
//! catalog metadata (who changed what, and when). Snapshots are recorded by
//! an explicit call from the mutation path, inside the same unit of work as
//! the mutation — never via a fire-and-forget background hook.

use serde_json::Value as JsonValue;
use thiserror::Error;

use bodega_core::UserId;

use crate::snapshot::{AuditSnapshot, ChangeKind, EntityRef};

/// Page bounds for snapshot listings.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub struct SnapshotPage {
    pub offset: usize,
    pub limit: Option<usize>,
}

impl SnapshotPage {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn first(limit: usize) -> Self {
        Self {
            offset: 0,
            limit: Some(limit),
        }
    }
}

/// Outcome of a `record` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Recorded {
    /// A snapshot was appended.
    Snapshot(AuditSnapshot),
    /// The save produced no field-level change; nothing was recorded.
    Unchanged,
}

impl Recorded {
    pub fn snapshot(self) -> Option<AuditSnapshot> {
        match self {
            Recorded::Snapshot(s) => Some(s),
            Recorded::Unchanged => None,
        }
    }
}

/// Audit trail operation error.
#[derive(Debug, Error)]
pub enum AuditError {
    /// Storage-layer failure; the enclosing mutation must be rejected.
    #[error("audit storage failure: {0}")]
    Storage(String),
}

/// Append-only store of entity snapshots.
///
/// Implementations must assign id and timestamp, keep snapshots immutable,
/// and skip recording an `Updated` snapshot whose field values equal the
/// entity's latest one (noise avoidance, not an error). `Created` and
/// `Deleted` snapshots are always recorded: the transition itself is the
/// information, whatever the fields say. `purge` is the single,
/// operator-triggered deletion path.
pub trait AuditTrail: Send + Sync {
    fn record(
        &self,
        entity: EntityRef,
        change: ChangeKind,
        acting_user: UserId,
        fields: JsonValue,
    ) -> Result<Recorded, AuditError>;

    /// Snapshots for one entity, newest first.
    fn list(&self, entity: EntityRef, page: SnapshotPage) -> Result<Vec<AuditSnapshot>, AuditError>;

    /// Remove every snapshot for an entity; returns how many were removed.
    fn purge(&self, entity: EntityRef) -> Result<u64, AuditError>;
}

impl<T> AuditTrail for std::sync::Arc<T>
where
    T: AuditTrail + ?Sized,
{
    fn record(
        &self,
        entity: EntityRef,
        change: ChangeKind,
        acting_user: UserId,
        fields: JsonValue,
    ) -> Result<Recorded, AuditError> {
        (**self).record(entity, change, acting_user, fields)
    }

    fn list(&self, entity: EntityRef, page: SnapshotPage) -> Result<Vec<AuditSnapshot>, AuditError> {
        (**self).list(entity, page)
    }

    fn purge(&self, entity: EntityRef) -> Result<u64, AuditError> {
        (**self).purge(entity)
    }
}
