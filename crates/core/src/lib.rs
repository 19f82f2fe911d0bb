//! `bodega-core` — domain foundation building blocks.
//!
//! This crate contains **pure domain** primitives (no infrastructure concerns).

pub mod error;
pub mod id;
pub mod version;

pub use error::{DomainError, DomainResult, LedgerError};
pub use id::{BrandId, CategoryId, MovementId, ProductId, ProviderId, SnapshotId, UserId};
pub use version::ExpectedVersion;
