//! Append-only ledger store boundary.
//!
//! This module defines the infrastructure-facing abstraction for storing and
//! reading per-product movement streams without making storage assumptions.
//! Mutation of persisted records is not part of the contract at all: the
//! trait has no update and no delete.

use thiserror::Error;

use bodega_core::{ExpectedVersion, ProductId};

use crate::movement::{MovementRecord, NewMovement};

/// Cached aggregate plus the CAS counter for one product's stream.
///
/// `version` counts committed writes to the stream head (appends and
/// reconcile corrections); `stock` is the cached on-hand quantity, updated
/// in the same critical section as the write that changed it.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct StreamHead {
    pub version: u64,
    pub stock: u32,
}

/// Read order for movement listings.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub enum MovementOrder {
    #[default]
    Ascending,
    Descending,
}

/// Page bounds for listings. `limit = None` means "to the end".
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub struct Page {
    pub offset: usize,
    pub limit: Option<usize>,
}

impl Page {
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

/// Ledger store operation error.
///
/// These are infrastructure-facing kinds; the consistency guard maps them to
/// the caller-facing [`bodega_core::LedgerError`] taxonomy. `Conflict` in
/// particular is an internal retry signal, never surfaced as-is.
#[derive(Debug, Error)]
pub enum LedgerStoreError {
    /// Optimistic concurrency check failed: another writer committed first.
    #[error("concurrent write detected: {0}")]
    Conflict(String),

    /// No stream is registered for the product.
    #[error("no ledger stream for product {0}")]
    UnknownProduct(ProductId),

    /// A stream already exists where none was expected.
    #[error("ledger stream already exists for product {0}")]
    AlreadyRegistered(ProductId),

    /// Storage-layer failure (IO, poisoned lock, connection loss).
    #[error("storage failure: {0}")]
    Storage(String),
}

/// Durable, append-only movement journal, one stream per product.
///
/// Implementations must guarantee:
/// - `append` checks the expected version, assigns id/sequence/timestamp,
///   appends the record, and installs `stock_after` as the cached quantity
///   **atomically** — a reader sees either none or all of those effects.
/// - Sequence numbers are per-product, monotonically increasing, gapless.
/// - Writers on different products never contend with each other.
/// - Reads do not block writers and never observe torn state.
/// - Nothing is persisted when an append fails for any reason.
pub trait LedgerStore: Send + Sync {
    /// Create an empty stream (version 0, stock 0) for a product.
    fn register(&self, product_id: ProductId) -> Result<(), LedgerStoreError>;

    /// O(1) read of the cached aggregate and stream version.
    fn head(&self, product_id: ProductId) -> Result<StreamHead, LedgerStoreError>;

    /// Append one movement and install the new cached stock, CAS-guarded.
    ///
    /// `stock_after` is computed by the consistency guard from the head it
    /// read; the CAS on `expected` is what makes that read-compute-write
    /// sequence safe against concurrent proposals.
    fn append(
        &self,
        movement: NewMovement,
        expected: ExpectedVersion,
        stock_after: u32,
    ) -> Result<MovementRecord, LedgerStoreError>;

    /// Replace the cached stock without appending a record.
    ///
    /// Reconcile's repair write; the only other writer of the cached field.
    fn correct_stock(
        &self,
        product_id: ProductId,
        expected: ExpectedVersion,
        stock: u32,
    ) -> Result<(), LedgerStoreError>;

    /// Time-ordered listing for one product. Finite and restartable: each
    /// call re-reads the stream, no cursor state is retained.
    fn list_for(
        &self,
        product_id: ProductId,
        order: MovementOrder,
        page: Page,
    ) -> Result<Vec<MovementRecord>, LedgerStoreError>;

    /// Cross-product listing for audit/reporting, ordered by commit time.
    fn list_all(
        &self,
        order: MovementOrder,
        page: Page,
    ) -> Result<Vec<MovementRecord>, LedgerStoreError>;

    /// Whether any movement references the product (guards hard deletion).
    fn has_movements(&self, product_id: ProductId) -> Result<bool, LedgerStoreError>;
}

impl<S> LedgerStore for std::sync::Arc<S>
where
    S: LedgerStore + ?Sized,
{
    fn register(&self, product_id: ProductId) -> Result<(), LedgerStoreError> {
        (**self).register(product_id)
    }

    fn head(&self, product_id: ProductId) -> Result<StreamHead, LedgerStoreError> {
        (**self).head(product_id)
    }

    fn append(
        &self,
        movement: NewMovement,
        expected: ExpectedVersion,
        stock_after: u32,
    ) -> Result<MovementRecord, LedgerStoreError> {
        (**self).append(movement, expected, stock_after)
    }

    fn correct_stock(
        &self,
        product_id: ProductId,
        expected: ExpectedVersion,
        stock: u32,
    ) -> Result<(), LedgerStoreError> {
        (**self).correct_stock(product_id, expected, stock)
    }

    fn list_for(
        &self,
        product_id: ProductId,
        order: MovementOrder,
        page: Page,
    ) -> Result<Vec<MovementRecord>, LedgerStoreError> {
        (**self).list_for(product_id, order, page)
    }

    fn list_all(
        &self,
        order: MovementOrder,
        page: Page,
    ) -> Result<Vec<MovementRecord>, LedgerStoreError> {
        (**self).list_all(order, page)
    }

    fn has_movements(&self, product_id: ProductId) -> Result<bool, LedgerStoreError> {
        (**self).has_movements(product_id)
    }
}

/// Apply page bounds to an already-ordered listing. Shared by store
/// implementations so every backend pages identically.
pub fn apply_page<T>(mut items: Vec<T>, page: Page) -> Vec<T> {
    if page.offset >= items.len() {
        return Vec::new();
    }
    let mut items = items.split_off(page.offset);
    if let Some(limit) = page.limit {
        items.truncate(limit);
    }
    items
}
