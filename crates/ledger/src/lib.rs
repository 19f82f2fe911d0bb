//! Stock ledger domain: the append-only movement journal that is the sole
//! authority for a product's on-hand quantity.
//!
//! Storage lives behind the [`store::LedgerStore`] trait; business rules
//! (no negative stock, immutable history, cache-equals-ledger) live in
//! [`service::StockLedger`], the one write path for stock.

pub mod in_memory;
pub mod movement;
pub mod service;
pub mod store;

pub use in_memory::InMemoryLedgerStore;
pub use movement::{derive_stock, MovementKind, MovementRecord, NewMovement};
pub use service::{Reconciliation, StockLedger};
pub use store::{LedgerStore, LedgerStoreError, MovementOrder, Page, StreamHead};
