//! Error taxonomy for the stock ledger and the catalog around it.

use thiserror::Error;

use crate::id::{MovementId, ProductId};

/// Result type used across the catalog domain layer.
pub type DomainResult<T> = Result<T, DomainError>;

/// Catalog-level error.
///
/// Keep this focused on deterministic, business/domain failures (validation,
/// invariants, conflicts). Infrastructure concerns belong elsewhere.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// A value failed validation (e.g. malformed input).
    #[error("validation failed: {0}")]
    Validation(String),

    /// An identifier was invalid (e.g. parse failure).
    #[error("invalid identifier: {0}")]
    InvalidId(String),

    /// A requested resource was not found (domain-level).
    #[error("not found")]
    NotFound,

    /// A conflict occurred (e.g. stale version, duplicate SKU/EAN/name).
    #[error("conflict: {0}")]
    Conflict(String),

    /// A product cannot be hard-deleted while movements reference it.
    #[error("product {0} has recorded movements and cannot be deleted")]
    MovementsExist(ProductId),

    /// The backing store failed; the mutation was rejected.
    #[error("persistence failure: {0}")]
    Persistence(String),
}

impl DomainError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn not_found() -> Self {
        Self::NotFound
    }

    pub fn persistence(msg: impl Into<String>) -> Self {
        Self::Persistence(msg.into())
    }
}

/// Ledger operation error, surfaced to callers of the consistency guard.
///
/// The guard and the ledger store never swallow errors; each failure carries
/// its precise kind so a transport layer can map it to its own status
/// vocabulary (`InsufficientStock` → client error, `Persistence` → server
/// error, and so on).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LedgerError {
    /// Magnitude was zero or would overflow the aggregate. Caller error,
    /// not retryable without fixing the input.
    #[error("invalid quantity: {0}")]
    InvalidQuantity(String),

    /// Business-rule rejection: the movement would drive stock negative.
    #[error("insufficient stock: requested {requested}, available {available}")]
    InsufficientStock { requested: u32, available: u32 },

    /// Attempted mutation or deletion of a historical record. Always a bug
    /// in the caller.
    #[error("movement records are immutable: {0}")]
    ImmutabilityViolation(String),

    /// The referenced product has no ledger stream.
    #[error("product not found: {0}")]
    ProductNotFound(ProductId),

    /// Infrastructure failure. Transient; retryable with backoff.
    #[error("persistence failure: {0}")]
    Persistence(String),

    /// The cached aggregate and the re-derived ledger sum disagree.
    /// Reported by the check-only verify path; `reconcile` repairs it.
    #[error("reconciliation drift: cached {cached}, derived {derived}")]
    ReconciliationDrift { cached: u32, derived: u32 },
}

impl LedgerError {
    pub fn invalid_quantity(msg: impl Into<String>) -> Self {
        Self::InvalidQuantity(msg.into())
    }

    pub fn immutability(msg: impl Into<String>) -> Self {
        Self::ImmutabilityViolation(msg.into())
    }

    pub fn persistence(msg: impl Into<String>) -> Self {
        Self::Persistence(msg.into())
    }

    /// Canonical refusal for any attempt to alter a persisted movement.
    pub fn immutable_movement(id: MovementId) -> Self {
        Self::ImmutabilityViolation(format!(
            "movement {id} is append-only history; record a compensating movement instead"
        ))
    }
}
