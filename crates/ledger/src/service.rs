//! Consistency guard and stock aggregator.
//!
//! `StockLedger` is the **single write path** for stock. Every proposal goes
//! through one guarded operation: validate against the current aggregate,
//! append the record, and install the new cached quantity as one atomic unit
//! (a compare-and-swap append on the stream version). Nothing else in the
//! system writes the cached field except `reconcile`'s repair path, which
//! uses the same CAS discipline.

use tracing::{debug, error, warn};

use bodega_core::{ExpectedVersion, LedgerError, MovementId, ProductId, UserId};

use crate::movement::{derive_stock, MovementKind, MovementRecord, NewMovement};
use crate::store::{LedgerStore, LedgerStoreError, MovementOrder, Page};

/// Retry budget for CAS conflicts before reporting a transient failure.
/// Each retry re-reads the head and re-validates, so a loser of a race
/// converges on either success or a definitive business rejection.
const MAX_CAS_RETRIES: u32 = 16;

/// Outcome of a `reconcile` call.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Reconciliation {
    /// Cached stock before the call.
    pub before: u32,
    /// Ledger-derived stock after the call.
    pub after: u32,
    /// Whether the cached field had drifted and was repaired.
    pub corrected: bool,
}

/// The consistency guard plus read-side aggregator over a [`LedgerStore`].
#[derive(Debug)]
pub struct StockLedger<S> {
    store: S,
}

impl<S> StockLedger<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }
}

impl<S: LedgerStore> StockLedger<S> {
    /// Open an empty ledger stream for a product. Idempotent: registering a
    /// product that already has a stream is a no-op.
    pub fn register_product(&self, product_id: ProductId) -> Result<(), LedgerError> {
        match self.store.register(product_id) {
            Ok(()) => Ok(()),
            Err(LedgerStoreError::AlreadyRegistered(_)) => {
                debug!(%product_id, "ledger stream already registered");
                Ok(())
            }
            Err(e) => Err(map_store_error(e)),
        }
    }

    /// Validate and commit one stock movement.
    ///
    /// The no-negative-stock check is evaluated at the moment of commit: the
    /// head read, the check, and the append-plus-aggregate-update form one
    /// atomic unit via the CAS on the stream version. A concurrent winner
    /// invalidates the read and the proposal is transparently retried
    /// against the fresh state.
    ///
    /// Deliberately not idempotent: each accepted call appends a distinct
    /// record, modelling real repeated transactions.
    pub fn propose_movement(
        &self,
        product_id: ProductId,
        kind: MovementKind,
        magnitude: u32,
        reason: impl Into<String>,
        acting_user: UserId,
    ) -> Result<MovementRecord, LedgerError> {
        if magnitude == 0 {
            return Err(LedgerError::invalid_quantity(
                "movement magnitude must be a positive integer",
            ));
        }
        let reason = reason.into();

        for _ in 0..MAX_CAS_RETRIES {
            let head = self.store.head(product_id).map_err(map_store_error)?;

            let stock_after = if kind.subtracts() {
                if magnitude > head.stock {
                    return Err(LedgerError::InsufficientStock {
                        requested: magnitude,
                        available: head.stock,
                    });
                }
                head.stock - magnitude
            } else {
                head.stock.checked_add(magnitude).ok_or_else(|| {
                    LedgerError::invalid_quantity(format!(
                        "movement of {magnitude} would overflow stock of {}",
                        head.stock
                    ))
                })?
            };

            let movement = NewMovement {
                product_id,
                kind,
                magnitude,
                reason: reason.clone(),
                acting_user,
            };

            match self
                .store
                .append(movement, ExpectedVersion::Exact(head.version), stock_after)
            {
                Ok(record) => {
                    debug!(
                        %product_id,
                        kind = %kind,
                        magnitude,
                        sequence = record.sequence,
                        stock_after,
                        "movement committed"
                    );
                    return Ok(record);
                }
                Err(LedgerStoreError::Conflict(_)) => continue,
                Err(e) => return Err(map_store_error(e)),
            }
        }

        Err(LedgerError::persistence(format!(
            "conflict retry budget exhausted after {MAX_CAS_RETRIES} attempts on product {product_id}"
        )))
    }

    /// Current on-hand quantity. O(1) against the cached stream head.
    pub fn current_stock(&self, product_id: ProductId) -> Result<u32, LedgerError> {
        Ok(self.store.head(product_id).map_err(map_store_error)?.stock)
    }

    /// Re-derive the aggregate from the complete ledger and repair drift.
    ///
    /// O(n) in the product's movements. Idempotent: with no intervening
    /// writes a second call reports `corrected = false` and the same
    /// `after`. Any discrepancy is logged before being fixed — drift means
    /// an earlier unnoticed bug, not a valid state.
    pub fn reconcile(&self, product_id: ProductId) -> Result<Reconciliation, LedgerError> {
        for _ in 0..MAX_CAS_RETRIES {
            let head = self.store.head(product_id).map_err(map_store_error)?;
            let derived = self.derived_stock(product_id)?;

            if derived == head.stock {
                return Ok(Reconciliation {
                    before: head.stock,
                    after: derived,
                    corrected: false,
                });
            }

            warn!(
                %product_id,
                cached = head.stock,
                derived,
                "reconciliation drift detected; repairing cached stock"
            );

            match self
                .store
                .correct_stock(product_id, ExpectedVersion::Exact(head.version), derived)
            {
                Ok(()) => {
                    return Ok(Reconciliation {
                        before: head.stock,
                        after: derived,
                        corrected: true,
                    });
                }
                Err(LedgerStoreError::Conflict(_)) => continue,
                Err(e) => return Err(map_store_error(e)),
            }
        }

        Err(LedgerError::persistence(format!(
            "conflict retry budget exhausted reconciling product {product_id}"
        )))
    }

    /// Check-only integrity pass: succeeds with the stock when cache and
    /// ledger agree, fails with `ReconciliationDrift` when they do not.
    /// Never repairs; use [`StockLedger::reconcile`] for that.
    pub fn verify(&self, product_id: ProductId) -> Result<u32, LedgerError> {
        let head = self.store.head(product_id).map_err(map_store_error)?;
        let derived = self.derived_stock(product_id)?;
        if derived != head.stock {
            return Err(LedgerError::ReconciliationDrift {
                cached: head.stock,
                derived,
            });
        }
        Ok(head.stock)
    }

    /// Time-ordered movement history for one product.
    pub fn list_movements(
        &self,
        product_id: ProductId,
        order: MovementOrder,
        page: Page,
    ) -> Result<Vec<MovementRecord>, LedgerError> {
        self.store
            .list_for(product_id, order, page)
            .map_err(map_store_error)
    }

    /// Cross-product movement history for audit/reporting.
    pub fn list_all_movements(
        &self,
        order: MovementOrder,
        page: Page,
    ) -> Result<Vec<MovementRecord>, LedgerError> {
        self.store.list_all(order, page).map_err(map_store_error)
    }

    /// Movement records are append-only history; deletion is refused
    /// unconditionally, before any store is consulted. Present to document
    /// the refusal: corrections are compensating movements.
    pub fn delete_movement(&self, id: MovementId) -> Result<(), LedgerError> {
        Err(LedgerError::immutable_movement(id))
    }

    /// Whether any movement references the product.
    pub fn has_movements(&self, product_id: ProductId) -> Result<bool, LedgerError> {
        self.store.has_movements(product_id).map_err(map_store_error)
    }

    fn derived_stock(&self, product_id: ProductId) -> Result<u32, LedgerError> {
        let records = self
            .store
            .list_for(product_id, MovementOrder::Ascending, Page::all())
            .map_err(map_store_error)?;
        let derived = derive_stock(&records);
        if derived < 0 {
            // An accepted history can never sum below zero; this is storage
            // corruption, not drift. Clamp for the cached field but shout.
            error!(%product_id, derived, "ledger sums negative; storage is corrupted");
        }
        Ok(u32::try_from(derived.max(0)).unwrap_or(u32::MAX))
    }
}

fn map_store_error(err: LedgerStoreError) -> LedgerError {
    match err {
        LedgerStoreError::UnknownProduct(id) => LedgerError::ProductNotFound(id),
        LedgerStoreError::AlreadyRegistered(id) => {
            LedgerError::persistence(format!("ledger stream already exists for product {id}"))
        }
        // A conflict that escapes the retry loop is an infrastructure-level
        // failure from the caller's point of view.
        LedgerStoreError::Conflict(msg) | LedgerStoreError::Storage(msg) => {
            LedgerError::persistence(msg)
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Barrier};

    use super::*;
    use crate::in_memory::InMemoryLedgerStore;

    fn ledger() -> StockLedger<InMemoryLedgerStore> {
        StockLedger::new(InMemoryLedgerStore::new())
    }

    fn registered(ledger: &StockLedger<InMemoryLedgerStore>) -> ProductId {
        let product_id = ProductId::new();
        ledger.register_product(product_id).unwrap();
        product_id
    }

    #[test]
    fn end_to_end_in_out_and_oversell() {
        let ledger = ledger();
        let product_id = registered(&ledger);
        let user = UserId::new();

        assert_eq!(ledger.current_stock(product_id).unwrap(), 0);

        ledger
            .propose_movement(product_id, MovementKind::In, 10, "initial", user)
            .unwrap();
        assert_eq!(ledger.current_stock(product_id).unwrap(), 10);

        ledger
            .propose_movement(product_id, MovementKind::Out, 3, "sale", user)
            .unwrap();
        assert_eq!(ledger.current_stock(product_id).unwrap(), 7);

        let err = ledger
            .propose_movement(product_id, MovementKind::Out, 100, "oversell attempt", user)
            .unwrap_err();
        assert_eq!(
            err,
            LedgerError::InsufficientStock {
                requested: 100,
                available: 7
            }
        );

        // Nothing persisted for the rejected proposal.
        assert_eq!(ledger.current_stock(product_id).unwrap(), 7);
        let records = ledger
            .list_movements(product_id, MovementOrder::Ascending, Page::all())
            .unwrap();
        assert_eq!(records.len(), 2);
    }

    #[test]
    fn server_assigns_ids_and_increasing_timestamps() {
        let ledger = ledger();
        let product_id = registered(&ledger);
        let user = UserId::new();

        let first = ledger
            .propose_movement(product_id, MovementKind::In, 5, "restock", user)
            .unwrap();
        let second = ledger
            .propose_movement(product_id, MovementKind::In, 5, "restock", user)
            .unwrap();

        assert_eq!(first.sequence, 1);
        assert_eq!(second.sequence, 2);
        assert_ne!(first.id, second.id);
        assert!(second.recorded_at >= first.recorded_at);

        let records = ledger
            .list_movements(product_id, MovementOrder::Ascending, Page::all())
            .unwrap();
        assert_eq!(records[0].kind, MovementKind::In);
        assert_eq!(records[0].magnitude, 5);
    }

    #[test]
    fn zero_magnitude_is_invalid() {
        let ledger = ledger();
        let product_id = registered(&ledger);

        let err = ledger
            .propose_movement(product_id, MovementKind::In, 0, "noop", UserId::new())
            .unwrap_err();
        assert!(matches!(err, LedgerError::InvalidQuantity(_)));
    }

    #[test]
    fn adjust_subtracts_and_is_bounded_by_stock() {
        let ledger = ledger();
        let product_id = registered(&ledger);
        let user = UserId::new();

        ledger
            .propose_movement(product_id, MovementKind::In, 6, "initial", user)
            .unwrap();
        ledger
            .propose_movement(product_id, MovementKind::Adjust, 2, "breakage", user)
            .unwrap();
        assert_eq!(ledger.current_stock(product_id).unwrap(), 4);

        let err = ledger
            .propose_movement(product_id, MovementKind::Adjust, 5, "recount", user)
            .unwrap_err();
        assert!(matches!(err, LedgerError::InsufficientStock { .. }));
    }

    #[test]
    fn unknown_product_is_reported() {
        let ledger = ledger();
        let ghost = ProductId::new();

        let err = ledger
            .propose_movement(ghost, MovementKind::In, 1, "x", UserId::new())
            .unwrap_err();
        assert_eq!(err, LedgerError::ProductNotFound(ghost));
        assert_eq!(
            ledger.current_stock(ghost).unwrap_err(),
            LedgerError::ProductNotFound(ghost)
        );
    }

    #[test]
    fn identical_proposals_append_distinct_records() {
        let ledger = ledger();
        let product_id = registered(&ledger);
        let user = UserId::new();

        ledger
            .propose_movement(product_id, MovementKind::In, 10, "restock", user)
            .unwrap();
        // Two separate sales of the same quantity are two facts.
        let a = ledger
            .propose_movement(product_id, MovementKind::Out, 2, "sale", user)
            .unwrap();
        let b = ledger
            .propose_movement(product_id, MovementKind::Out, 2, "sale", user)
            .unwrap();
        assert_ne!(a.id, b.id);
        assert_eq!(ledger.current_stock(product_id).unwrap(), 6);
    }

    #[test]
    fn delete_movement_is_always_refused() {
        let ledger = ledger();
        let product_id = registered(&ledger);
        let user = UserId::new();
        let record = ledger
            .propose_movement(product_id, MovementKind::In, 5, "initial", user)
            .unwrap();

        let err = ledger.delete_movement(record.id).unwrap_err();
        assert!(matches!(err, LedgerError::ImmutabilityViolation(_)));

        // Ledger content and count unchanged afterwards.
        let records = ledger
            .list_movements(product_id, MovementOrder::Ascending, Page::all())
            .unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0], record);
        assert_eq!(ledger.current_stock(product_id).unwrap(), 5);
    }

    #[test]
    fn reconcile_is_idempotent_when_clean() {
        let ledger = ledger();
        let product_id = registered(&ledger);
        let user = UserId::new();
        ledger
            .propose_movement(product_id, MovementKind::In, 9, "initial", user)
            .unwrap();

        let first = ledger.reconcile(product_id).unwrap();
        let second = ledger.reconcile(product_id).unwrap();
        assert!(!first.corrected);
        assert!(!second.corrected);
        assert_eq!(first.after, 9);
        assert_eq!(first.after, second.after);
    }

    #[test]
    fn reconcile_repairs_injected_drift() {
        let ledger = ledger();
        let product_id = registered(&ledger);
        let user = UserId::new();
        ledger
            .propose_movement(product_id, MovementKind::In, 9, "initial", user)
            .unwrap();

        // Simulate an earlier bug by corrupting the cached field directly.
        let head = ledger.store().head(product_id).unwrap();
        ledger
            .store()
            .correct_stock(product_id, ExpectedVersion::Exact(head.version), 42)
            .unwrap();

        assert_eq!(
            ledger.verify(product_id).unwrap_err(),
            LedgerError::ReconciliationDrift {
                cached: 42,
                derived: 9
            }
        );

        let outcome = ledger.reconcile(product_id).unwrap();
        assert_eq!(
            outcome,
            Reconciliation {
                before: 42,
                after: 9,
                corrected: true
            }
        );
        assert_eq!(ledger.verify(product_id).unwrap(), 9);
    }

    #[test]
    fn concurrent_oversell_admits_exactly_one() {
        let ledger = Arc::new(StockLedger::new(InMemoryLedgerStore::new()));
        let product_id = ProductId::new();
        ledger.register_product(product_id).unwrap();
        ledger
            .propose_movement(product_id, MovementKind::In, 10, "initial", UserId::new())
            .unwrap();

        let barrier = Arc::new(Barrier::new(2));
        let handles: Vec<_> = (0..2)
            .map(|_| {
                let ledger = Arc::clone(&ledger);
                let barrier = Arc::clone(&barrier);
                std::thread::spawn(move || {
                    barrier.wait();
                    ledger.propose_movement(
                        product_id,
                        MovementKind::Out,
                        10,
                        "sale",
                        UserId::new(),
                    )
                })
            })
            .collect();

        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        let successes = results.iter().filter(|r| r.is_ok()).count();
        let insufficient = results
            .iter()
            .filter(|r| matches!(r, Err(LedgerError::InsufficientStock { .. })))
            .count();

        assert_eq!(successes, 1);
        assert_eq!(insufficient, 1);
        assert_eq!(ledger.current_stock(product_id).unwrap(), 0);
    }

    #[test]
    fn concurrent_sales_against_ample_stock_all_land() {
        let ledger = Arc::new(StockLedger::new(InMemoryLedgerStore::new()));
        let product_id = ProductId::new();
        ledger.register_product(product_id).unwrap();
        ledger
            .propose_movement(product_id, MovementKind::In, 100, "initial", UserId::new())
            .unwrap();

        let barrier = Arc::new(Barrier::new(8));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let ledger = Arc::clone(&ledger);
                let barrier = Arc::clone(&barrier);
                std::thread::spawn(move || {
                    barrier.wait();
                    ledger.propose_movement(product_id, MovementKind::Out, 5, "sale", UserId::new())
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap().unwrap();
        }

        assert_eq!(ledger.current_stock(product_id).unwrap(), 60);
        assert_eq!(ledger.reconcile(product_id).unwrap().after, 60);
    }
}

#[cfg(test)]
mod properties {
    use proptest::prelude::*;

    use super::*;
    use crate::in_memory::InMemoryLedgerStore;

    #[derive(Debug, Clone)]
    struct Proposal {
        kind: MovementKind,
        magnitude: u32,
    }

    fn proposal_strategy() -> impl Strategy<Value = Proposal> {
        (
            prop_oneof![
                Just(MovementKind::In),
                Just(MovementKind::Out),
                Just(MovementKind::Adjust),
            ],
            0u32..40,
        )
            .prop_map(|(kind, magnitude)| Proposal { kind, magnitude })
    }

    proptest! {
        /// Two invariants at once: the cached aggregate always equals the
        /// ledger-derived sum, and no accepted sequence of movements drives
        /// it negative.
        #[test]
        fn cache_matches_ledger_and_never_goes_negative(
            proposals in prop::collection::vec(proposal_strategy(), 1..64)
        ) {
            let ledger = StockLedger::new(InMemoryLedgerStore::new());
            let product_id = ProductId::new();
            ledger.register_product(product_id).unwrap();
            let user = UserId::new();

            let mut expected: u32 = 0;
            for p in proposals {
                let result = ledger.propose_movement(
                    product_id, p.kind, p.magnitude, "prop", user,
                );
                match result {
                    Ok(_) => {
                        expected = if p.kind.subtracts() {
                            expected - p.magnitude
                        } else {
                            expected + p.magnitude
                        };
                    }
                    Err(LedgerError::InsufficientStock { available, .. }) => {
                        prop_assert_eq!(available, expected);
                        prop_assert!(p.magnitude > expected);
                    }
                    Err(LedgerError::InvalidQuantity(_)) => {
                        prop_assert_eq!(p.magnitude, 0);
                    }
                    Err(e) => return Err(TestCaseError::fail(format!("unexpected error: {e}"))),
                }

                let stock = ledger.current_stock(product_id).unwrap();
                prop_assert_eq!(stock, expected);
            }

            // Cache always matches ledger truth, and a clean reconcile
            // changes nothing.
            let outcome = ledger.reconcile(product_id).unwrap();
            prop_assert!(!outcome.corrected);
            prop_assert_eq!(outcome.after, expected);
        }
    }
}
