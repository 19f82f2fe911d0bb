//! Audit trail domain: immutable, versioned snapshots of catalog entity
//! state, independent of the stock ledger.

pub mod in_memory;
pub mod snapshot;
pub mod trail;

pub use in_memory::InMemoryAuditTrail;
pub use snapshot::{AuditSnapshot, ChangeKind, EntityKind, EntityRef};
pub use trail::{AuditError, AuditTrail, Recorded, SnapshotPage};
