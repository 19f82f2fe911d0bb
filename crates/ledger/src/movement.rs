use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use bodega_core::{MovementId, ProductId, UserId};

/// Kind of stock movement.
///
/// Sign convention: `In` adds to the aggregate; `Out` and `Adjust` subtract.
/// `Adjust` records a negative correction (damage, shrinkage, recount-down);
/// a positive correction is recorded as an `In` movement with a reason.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MovementKind {
    In,
    Out,
    Adjust,
}

impl MovementKind {
    /// Stable wire/storage name.
    pub fn as_str(&self) -> &'static str {
        match self {
            MovementKind::In => "in",
            MovementKind::Out => "out",
            MovementKind::Adjust => "adjust",
        }
    }

    /// Whether this kind subtracts from the aggregate.
    pub fn subtracts(&self) -> bool {
        matches!(self, MovementKind::Out | MovementKind::Adjust)
    }

    /// Signed effect of a movement of this kind with the given magnitude.
    pub fn signed_delta(&self, magnitude: u32) -> i64 {
        if self.subtracts() {
            -i64::from(magnitude)
        } else {
            i64::from(magnitude)
        }
    }
}

impl core::fmt::Display for MovementKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A proposed, not-yet-persisted movement.
///
/// Carries no id and no timestamp; both are assigned by the ledger store at
/// append time and are never client-supplied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewMovement {
    pub product_id: ProductId,
    pub kind: MovementKind,
    /// Always positive; the kind carries the sign.
    pub magnitude: u32,
    pub reason: String,
    pub acting_user: UserId,
}

/// One immutable fact about stock changing.
///
/// Once persisted, a movement record's fields never change and the record is
/// never deleted; corrections are made only by appending a compensating
/// record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MovementRecord {
    /// Global, store-assigned id (UUIDv7, time-ordered).
    pub id: MovementId,
    pub product_id: ProductId,
    /// Per-product position in the ledger, starting at 1.
    pub sequence: u64,
    pub kind: MovementKind,
    pub magnitude: u32,
    pub reason: String,
    pub acting_user: UserId,
    /// Store-assigned commit time.
    pub recorded_at: DateTime<Utc>,
}

impl MovementRecord {
    /// Signed effect of this record on the aggregate.
    pub fn signed_delta(&self) -> i64 {
        self.kind.signed_delta(self.magnitude)
    }
}

/// Sum a ledger slice into the derived aggregate.
///
/// Returns the raw signed total. An accepted history never sums below zero,
/// so a negative result indicates corrupted storage and is reported by the
/// caller, not hidden here.
pub fn derive_stock<'a>(records: impl IntoIterator<Item = &'a MovementRecord>) -> i64 {
    records.into_iter().map(MovementRecord::signed_delta).sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn adjust_subtracts() {
        assert_eq!(MovementKind::Adjust.signed_delta(4), -4);
        assert_eq!(MovementKind::Out.signed_delta(3), -3);
        assert_eq!(MovementKind::In.signed_delta(7), 7);
    }

    #[test]
    fn derive_stock_sums_signed_deltas() {
        let base = MovementRecord {
            id: MovementId::new(),
            product_id: ProductId::new(),
            sequence: 1,
            kind: MovementKind::In,
            magnitude: 10,
            reason: "initial".to_string(),
            acting_user: UserId::new(),
            recorded_at: Utc::now(),
        };
        let out = MovementRecord {
            id: MovementId::new(),
            sequence: 2,
            kind: MovementKind::Out,
            magnitude: 3,
            ..base.clone()
        };
        let adjust = MovementRecord {
            id: MovementId::new(),
            sequence: 3,
            kind: MovementKind::Adjust,
            magnitude: 2,
            ..base.clone()
        };

        assert_eq!(derive_stock([&base, &out, &adjust]), 5);
    }

    #[test]
    fn kind_round_trips_through_serde() {
        let json = serde_json::to_string(&MovementKind::Adjust).unwrap();
        assert_eq!(json, "\"adjust\"");
        let back: MovementKind = serde_json::from_str(&json).unwrap();
        assert_eq!(back, MovementKind::Adjust);
    }
}
