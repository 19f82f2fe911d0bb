//! Catalog storage boundary.

use thiserror::Error;

use bodega_core::{BrandId, CategoryId, ExpectedVersion, ProductId, ProviderId};

use crate::product::Product;
use crate::taxonomy::{Brand, Category, ParentRef, Provider};

/// Catalog store operation error.
#[derive(Debug, Error)]
pub enum CatalogStoreError {
    #[error("not found")]
    NotFound,

    /// Optimistic concurrency check failed.
    #[error("concurrent write detected: {0}")]
    Conflict(String),

    /// Uniqueness violation (SKU, EAN, or name).
    #[error("duplicate: {0}")]
    Duplicate(String),

    #[error("storage failure: {0}")]
    Storage(String),
}

/// Durable catalog state behind CAS-guarded writes.
///
/// `update_*` methods check `expected` against the stored version, then
/// commit the given state with the version bumped by one (and, for
/// products, `updated_at` refreshed); the committed entity is returned.
/// Uniqueness (product SKU/EAN, parent names) is enforced on both insert
/// and update.
pub trait CatalogStore: Send + Sync {
    fn insert_product(&self, product: Product) -> Result<Product, CatalogStoreError>;
    fn product(&self, id: ProductId) -> Result<Product, CatalogStoreError>;
    fn update_product(
        &self,
        product: Product,
        expected: ExpectedVersion,
    ) -> Result<Product, CatalogStoreError>;
    /// Hard delete. Only reachable through the movement guard in the
    /// service layer; returns the removed state for compensating writes.
    fn remove_product(&self, id: ProductId) -> Result<Product, CatalogStoreError>;
    fn list_products(&self) -> Result<Vec<Product>, CatalogStoreError>;
    /// Products referencing a parent, for cascade passes.
    fn products_of(&self, parent: ParentRef) -> Result<Vec<Product>, CatalogStoreError>;

    fn insert_brand(&self, brand: Brand) -> Result<Brand, CatalogStoreError>;
    fn brand(&self, id: BrandId) -> Result<Brand, CatalogStoreError>;
    fn update_brand(
        &self,
        brand: Brand,
        expected: ExpectedVersion,
    ) -> Result<Brand, CatalogStoreError>;
    /// Compensation path for a failed audited insert; not a domain
    /// operation (parents are deactivated, never deleted).
    fn remove_brand(&self, id: BrandId) -> Result<Brand, CatalogStoreError>;

    fn insert_category(&self, category: Category) -> Result<Category, CatalogStoreError>;
    fn category(&self, id: CategoryId) -> Result<Category, CatalogStoreError>;
    fn update_category(
        &self,
        category: Category,
        expected: ExpectedVersion,
    ) -> Result<Category, CatalogStoreError>;
    fn remove_category(&self, id: CategoryId) -> Result<Category, CatalogStoreError>;

    fn insert_provider(&self, provider: Provider) -> Result<Provider, CatalogStoreError>;
    fn provider(&self, id: ProviderId) -> Result<Provider, CatalogStoreError>;
    fn update_provider(
        &self,
        provider: Provider,
        expected: ExpectedVersion,
    ) -> Result<Provider, CatalogStoreError>;
    fn remove_provider(&self, id: ProviderId) -> Result<Provider, CatalogStoreError>;
}
