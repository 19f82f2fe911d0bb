//! Catalog domain: products and their named parents, with every mutation
//! audited and hard deletion fenced off by the movement ledger.

pub mod in_memory;
pub mod product;
pub mod projection;
pub mod service;
pub mod store;
pub mod taxonomy;

pub use in_memory::InMemoryCatalogStore;
pub use product::{MAX_RATING_TENTHS, Product, ProductDraft, ProductPatch};
pub use projection::{
    FullProductView, ProductView, ProjectionContext, RestrictedProductView, Role, project,
};
pub use service::{CascadeReport, CatalogService, MovementIndex};
pub use store::{CatalogStore, CatalogStoreError};
pub use taxonomy::{Brand, Category, ParentRef, Provider};
