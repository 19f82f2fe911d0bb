//! Infrastructure layer: Postgres persistence and cross-crate wiring.

pub mod movement_index;
pub mod postgres_ledger;


pub use movement_index::LedgerMovementIndex;
pub use postgres_ledger::PostgresLedgerStore;
