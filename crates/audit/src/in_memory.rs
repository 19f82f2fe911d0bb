//! In-memory audit trail for tests/dev.

use std::collections::HashMap;
use std::sync::RwLock;

use chrono::Utc;
use serde_json::Value as JsonValue;

use bodega_core::{SnapshotId, UserId};

use crate::snapshot::{AuditSnapshot, ChangeKind, EntityRef};
use crate::trail::{AuditError, AuditTrail, Recorded, SnapshotPage};

/// In-memory append-only audit trail. Not optimized for performance.
#[derive(Debug, Default)]
pub struct InMemoryAuditTrail {
    snapshots: RwLock<HashMap<EntityRef, Vec<AuditSnapshot>>>,
}

impl InMemoryAuditTrail {
    pub fn new() -> Self {
        Self::default()
    }
}

fn poisoned() -> AuditError {
    AuditError::Storage("lock poisoned".to_string())
}

impl AuditTrail for InMemoryAuditTrail {
    fn record(
        &self,
        entity: EntityRef,
        change: ChangeKind,
        acting_user: UserId,
        fields: JsonValue,
    ) -> Result<Recorded, AuditError> {
        let mut snapshots = self.snapshots.write().map_err(|_| poisoned())?;
        let history = snapshots.entry(entity).or_default();

        // Skip updates that changed nothing at the field level. Creates and
        // deletions are transitions in their own right and always land, even
        // when the field payload matches the latest snapshot.
        if change == ChangeKind::Updated {
            if let Some(last) = history.last() {
                if last.fields == fields {
                    return Ok(Recorded::Unchanged);
                }
            }
        }

        let snapshot = AuditSnapshot {
            id: SnapshotId::new(),
            entity,
            change,
            acting_user,
            recorded_at: Utc::now(),
            fields,
        };
        history.push(snapshot.clone());
        Ok(Recorded::Snapshot(snapshot))
    }

    fn list(&self, entity: EntityRef, page: SnapshotPage) -> Result<Vec<AuditSnapshot>, AuditError> {
        let snapshots = self.snapshots.read().map_err(|_| poisoned())?;
        let mut history = snapshots.get(&entity).cloned().unwrap_or_default();
        history.reverse(); // newest first

        if page.offset >= history.len() {
            return Ok(Vec::new());
        }
        let mut history = history.split_off(page.offset);
        if let Some(limit) = page.limit {
            history.truncate(limit);
        }
        Ok(history)
    }

    fn purge(&self, entity: EntityRef) -> Result<u64, AuditError> {
        let mut snapshots = self.snapshots.write().map_err(|_| poisoned())?;
        Ok(snapshots
            .remove(&entity)
            .map(|h| h.len() as u64)
            .unwrap_or(0))
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use bodega_core::ProductId;

    #[test]
    fn record_assigns_id_and_time_and_orders_newest_first() {
        let trail = InMemoryAuditTrail::new();
        let entity = EntityRef::product(ProductId::new());
        let user = UserId::new();

        let first = trail
            .record(entity, ChangeKind::Created, user, json!({"name": "a"}))
            .unwrap()
            .snapshot()
            .unwrap();
        let second = trail
            .record(entity, ChangeKind::Updated, user, json!({"name": "b"}))
            .unwrap()
            .snapshot()
            .unwrap();
        assert_ne!(first.id, second.id);
        assert!(second.recorded_at >= first.recorded_at);

        let listed = trail.list(entity, SnapshotPage::all()).unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].change, ChangeKind::Updated);
        assert_eq!(listed[1].change, ChangeKind::Created);
    }

    #[test]
    fn unchanged_fields_record_nothing() {
        let trail = InMemoryAuditTrail::new();
        let entity = EntityRef::product(ProductId::new());
        let user = UserId::new();
        let fields = json!({"name": "a", "active": true});

        trail
            .record(entity, ChangeKind::Created, user, fields.clone())
            .unwrap();
        let outcome = trail
            .record(entity, ChangeKind::Updated, user, fields)
            .unwrap();
        assert_eq!(outcome, Recorded::Unchanged);
        assert_eq!(trail.list(entity, SnapshotPage::all()).unwrap().len(), 1);
    }

    #[test]
    fn deletion_with_identical_fields_is_still_recorded() {
        let trail = InMemoryAuditTrail::new();
        let entity = EntityRef::product(ProductId::new());
        let user = UserId::new();
        let fields = json!({"name": "a", "active": true});

        trail
            .record(entity, ChangeKind::Created, user, fields.clone())
            .unwrap();
        let outcome = trail
            .record(entity, ChangeKind::Deleted, user, fields)
            .unwrap();

        assert!(outcome.snapshot().is_some());
        let listed = trail.list(entity, SnapshotPage::all()).unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].change, ChangeKind::Deleted);
    }

    #[test]
    fn purge_is_the_only_deletion_path() {
        let trail = InMemoryAuditTrail::new();
        let entity = EntityRef::product(ProductId::new());
        let other = EntityRef::product(ProductId::new());
        let user = UserId::new();

        trail
            .record(entity, ChangeKind::Created, user, json!({"name": "a"}))
            .unwrap();
        trail
            .record(entity, ChangeKind::Updated, user, json!({"name": "b"}))
            .unwrap();
        trail
            .record(other, ChangeKind::Created, user, json!({"name": "c"}))
            .unwrap();

        assert_eq!(trail.purge(entity).unwrap(), 2);
        assert!(trail.list(entity, SnapshotPage::all()).unwrap().is_empty());
        // Other entities untouched.
        assert_eq!(trail.list(other, SnapshotPage::all()).unwrap().len(), 1);
    }
}
