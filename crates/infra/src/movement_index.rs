//! Bridges the movement ledger into the catalog's guard seam.

use std::sync::Arc;

use bodega_catalog::MovementIndex;
use bodega_core::{DomainError, DomainResult, LedgerError, ProductId};
use bodega_ledger::{LedgerStore, StockLedger};

/// [`MovementIndex`] over a shared [`StockLedger`].
///
/// The catalog service owns one of these while the rest of the application
/// keeps using the same ledger through the [`Arc`].
pub struct LedgerMovementIndex<S> {
    ledger: Arc<StockLedger<S>>,
}

impl<S> LedgerMovementIndex<S> {
    pub fn new(ledger: Arc<StockLedger<S>>) -> Self {
        Self { ledger }
    }
}

fn map_ledger_error(err: LedgerError) -> DomainError {
    match err {
        LedgerError::ProductNotFound(_) => DomainError::NotFound,
        other => DomainError::persistence(other.to_string()),
    }
}

impl<S: LedgerStore> MovementIndex for LedgerMovementIndex<S> {
    fn register_product(&self, product_id: ProductId) -> DomainResult<()> {
        self.ledger
            .register_product(product_id)
            .map_err(map_ledger_error)
    }

    fn has_movements(&self, product_id: ProductId) -> DomainResult<bool> {
        self.ledger
            .has_movements(product_id)
            .map_err(map_ledger_error)
    }
}
