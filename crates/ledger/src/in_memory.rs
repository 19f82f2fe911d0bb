//! In-memory ledger store for tests/dev.

use std::collections::HashMap;
use std::sync::RwLock;

use chrono::Utc;

use bodega_core::{ExpectedVersion, MovementId, ProductId};

use crate::movement::{MovementRecord, NewMovement};
use crate::store::{apply_page, LedgerStore, LedgerStoreError, MovementOrder, Page, StreamHead};

#[derive(Debug, Default)]
struct Stream {
    version: u64,
    stock: u32,
    records: Vec<MovementRecord>,
}

/// In-memory append-only ledger store.
///
/// One entry per product; the CAS check, the append, and the cached stock
/// update all happen under a single write guard, so readers see either the
/// pre- or post-commit state of a write, never a torn one. Not optimized
/// for performance.
#[derive(Debug, Default)]
pub struct InMemoryLedgerStore {
    streams: RwLock<HashMap<ProductId, Stream>>,
}

impl InMemoryLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn poisoned() -> LedgerStoreError {
    LedgerStoreError::Storage("lock poisoned".to_string())
}

impl LedgerStore for InMemoryLedgerStore {
    fn register(&self, product_id: ProductId) -> Result<(), LedgerStoreError> {
        let mut streams = self.streams.write().map_err(|_| poisoned())?;
        if streams.contains_key(&product_id) {
            return Err(LedgerStoreError::AlreadyRegistered(product_id));
        }
        streams.insert(product_id, Stream::default());
        Ok(())
    }

    fn head(&self, product_id: ProductId) -> Result<StreamHead, LedgerStoreError> {
        let streams = self.streams.read().map_err(|_| poisoned())?;
        let stream = streams
            .get(&product_id)
            .ok_or(LedgerStoreError::UnknownProduct(product_id))?;
        Ok(StreamHead {
            version: stream.version,
            stock: stream.stock,
        })
    }

    fn append(
        &self,
        movement: NewMovement,
        expected: ExpectedVersion,
        stock_after: u32,
    ) -> Result<MovementRecord, LedgerStoreError> {
        let mut streams = self.streams.write().map_err(|_| poisoned())?;
        let stream = streams
            .get_mut(&movement.product_id)
            .ok_or(LedgerStoreError::UnknownProduct(movement.product_id))?;

        if !expected.matches(stream.version) {
            return Err(LedgerStoreError::Conflict(format!(
                "expected {expected:?}, found {}",
                stream.version
            )));
        }

        let record = MovementRecord {
            id: MovementId::new(),
            product_id: movement.product_id,
            sequence: stream.records.len() as u64 + 1,
            kind: movement.kind,
            magnitude: movement.magnitude,
            reason: movement.reason,
            acting_user: movement.acting_user,
            recorded_at: Utc::now(),
        };

        // Record and cached aggregate commit in the same critical section.
        stream.records.push(record.clone());
        stream.stock = stock_after;
        stream.version += 1;

        Ok(record)
    }

    fn correct_stock(
        &self,
        product_id: ProductId,
        expected: ExpectedVersion,
        stock: u32,
    ) -> Result<(), LedgerStoreError> {
        let mut streams = self.streams.write().map_err(|_| poisoned())?;
        let stream = streams
            .get_mut(&product_id)
            .ok_or(LedgerStoreError::UnknownProduct(product_id))?;

        if !expected.matches(stream.version) {
            return Err(LedgerStoreError::Conflict(format!(
                "expected {expected:?}, found {}",
                stream.version
            )));
        }

        stream.stock = stock;
        stream.version += 1;
        Ok(())
    }

    fn list_for(
        &self,
        product_id: ProductId,
        order: MovementOrder,
        page: Page,
    ) -> Result<Vec<MovementRecord>, LedgerStoreError> {
        let streams = self.streams.read().map_err(|_| poisoned())?;
        let stream = streams
            .get(&product_id)
            .ok_or(LedgerStoreError::UnknownProduct(product_id))?;

        let mut records = stream.records.clone();
        if order == MovementOrder::Descending {
            records.reverse();
        }
        Ok(apply_page(records, page))
    }

    fn list_all(
        &self,
        order: MovementOrder,
        page: Page,
    ) -> Result<Vec<MovementRecord>, LedgerStoreError> {
        let streams = self.streams.read().map_err(|_| poisoned())?;
        let mut records: Vec<MovementRecord> = streams
            .values()
            .flat_map(|s| s.records.iter().cloned())
            .collect();

        // UUIDv7 movement ids are time-ordered; use them as the tiebreaker
        // for records committed in the same instant.
        records.sort_by_key(|r| (r.recorded_at, r.id));
        if order == MovementOrder::Descending {
            records.reverse();
        }
        Ok(apply_page(records, page))
    }

    fn has_movements(&self, product_id: ProductId) -> Result<bool, LedgerStoreError> {
        let streams = self.streams.read().map_err(|_| poisoned())?;
        let stream = streams
            .get(&product_id)
            .ok_or(LedgerStoreError::UnknownProduct(product_id))?;
        Ok(!stream.records.is_empty())
    }
}
