//! Role-scoped read models over the catalog.
//!
//! Stock is not a product field, so views take it (and the parent names)
//! from the caller at read time. The restricted shape is a separate struct
//! rather than a full view with fields blanked: what a role must not see
//! never exists in the value, so it cannot leak through serialization.

use serde::{Deserialize, Serialize};

use bodega_core::ProductId;

use crate::product::Product;

/// Caller role driving view selection.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Full access, including acquisition costs and sourcing.
    Admin,
    /// Sales floor: everything needed to sell, nothing about margins.
    Seller,
}

impl Role {
    pub fn sees_costs(self) -> bool {
        matches!(self, Role::Admin)
    }
}

/// Read-time inputs the product row itself does not carry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectionContext {
    pub brand_name: String,
    pub category_name: String,
    pub provider_name: String,
    /// Cached on-hand quantity from the ledger's stream head.
    pub stock: u32,
}

/// Privileged product view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FullProductView {
    pub id: ProductId,
    pub sku: String,
    pub ean: String,
    pub name: String,
    pub brand: String,
    pub category: String,
    pub provider: String,
    pub unit_cost: u64,
    pub sale_price: u64,
    pub weight_grams: u32,
    pub dimensions: String,
    pub description: String,
    pub warehouse_location: String,
    pub usage_age: Option<String>,
    pub rating_tenths: u8,
    pub active: bool,
    pub stock: u32,
}

/// Sales-floor product view. Omits acquisition cost and provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestrictedProductView {
    pub id: ProductId,
    pub sku: String,
    pub ean: String,
    pub name: String,
    pub brand: String,
    pub category: String,
    pub sale_price: u64,
    pub weight_grams: u32,
    pub dimensions: String,
    pub description: String,
    pub warehouse_location: String,
    pub usage_age: Option<String>,
    pub rating_tenths: u8,
    pub active: bool,
    pub stock: u32,
}

/// A product as one role is allowed to see it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ProductView {
    Full(FullProductView),
    Restricted(RestrictedProductView),
}

/// Project a product for `role`.
pub fn project(product: &Product, ctx: ProjectionContext, role: Role) -> ProductView {
    match role {
        Role::Admin => ProductView::Full(FullProductView {
            id: product.id,
            sku: product.sku.clone(),
            ean: product.ean.clone(),
            name: product.name.clone(),
            brand: ctx.brand_name,
            category: ctx.category_name,
            provider: ctx.provider_name,
            unit_cost: product.unit_cost,
            sale_price: product.sale_price,
            weight_grams: product.weight_grams,
            dimensions: product.dimensions.clone(),
            description: product.description.clone(),
            warehouse_location: product.warehouse_location.clone(),
            usage_age: product.usage_age.clone(),
            rating_tenths: product.rating_tenths,
            active: product.active,
            stock: ctx.stock,
        }),
        Role::Seller => ProductView::Restricted(RestrictedProductView {
            id: product.id,
            sku: product.sku.clone(),
            ean: product.ean.clone(),
            name: product.name.clone(),
            brand: ctx.brand_name,
            category: ctx.category_name,
            sale_price: product.sale_price,
            weight_grams: product.weight_grams,
            dimensions: product.dimensions.clone(),
            description: product.description.clone(),
            warehouse_location: product.warehouse_location.clone(),
            usage_age: product.usage_age.clone(),
            rating_tenths: product.rating_tenths,
            active: product.active,
            stock: ctx.stock,
        }),
    }
}
