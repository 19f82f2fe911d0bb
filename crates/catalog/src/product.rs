use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use bodega_core::{BrandId, CategoryId, DomainError, ProductId, ProviderId, UserId};

/// Catalog product.
///
/// The on-hand quantity is deliberately **not** a field here: it lives in
/// the ledger's stream head, where exactly one code path writes it. Views
/// that need stock compose it at read time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    /// Unique stock-keeping unit.
    pub sku: String,
    /// Unique EAN-13 barcode.
    pub ean: String,
    pub name: String,
    pub brand_id: BrandId,
    pub category_id: CategoryId,
    pub provider_id: ProviderId,
    /// Acquisition cost in minor currency units. Privileged-view only.
    pub unit_cost: u64,
    /// Sale price in minor currency units.
    pub sale_price: u64,
    pub weight_grams: u32,
    /// Free-form "H x L x W cm".
    pub dimensions: String,
    pub description: String,
    pub warehouse_location: String,
    /// E.g. "12+ years".
    pub usage_age: Option<String>,
    /// Star rating in tenths, 0..=50.
    pub rating_tenths: u8,
    pub active: bool,
    pub created_by: UserId,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// CAS counter for catalog writes.
    pub version: u64,
}

/// Creation input for a product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductDraft {
    pub sku: String,
    pub ean: String,
    pub name: String,
    pub brand_id: BrandId,
    pub category_id: CategoryId,
    pub provider_id: ProviderId,
    pub unit_cost: u64,
    pub sale_price: u64,
    pub weight_grams: u32,
    pub dimensions: String,
    pub description: String,
    pub warehouse_location: String,
    pub usage_age: Option<String>,
    pub rating_tenths: u8,
}

/// Partial update; `None` fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductPatch {
    pub sku: Option<String>,
    pub ean: Option<String>,
    pub name: Option<String>,
    pub brand_id: Option<BrandId>,
    pub category_id: Option<CategoryId>,
    pub provider_id: Option<ProviderId>,
    pub unit_cost: Option<u64>,
    pub sale_price: Option<u64>,
    pub weight_grams: Option<u32>,
    pub dimensions: Option<String>,
    pub description: Option<String>,
    pub warehouse_location: Option<String>,
    pub usage_age: Option<Option<String>>,
    pub rating_tenths: Option<u8>,
}

pub const MAX_RATING_TENTHS: u8 = 50;

fn validate_identity(sku: &str, ean: &str, name: &str) -> Result<(), DomainError> {
    if name.trim().is_empty() {
        return Err(DomainError::validation("name cannot be empty"));
    }
    if sku.trim().is_empty() {
        return Err(DomainError::validation("SKU cannot be empty"));
    }
    if ean.len() != 13 || !ean.bytes().all(|b| b.is_ascii_digit()) {
        return Err(DomainError::validation("EAN must be exactly 13 digits"));
    }
    Ok(())
}

fn validate_rating(rating_tenths: u8) -> Result<(), DomainError> {
    if rating_tenths > MAX_RATING_TENTHS {
        return Err(DomainError::validation(format!(
            "rating must be between 0 and {MAX_RATING_TENTHS} tenths"
        )));
    }
    Ok(())
}

impl Product {
    /// Build a validated product from a creation draft.
    pub fn from_draft(
        id: ProductId,
        draft: ProductDraft,
        created_by: UserId,
        now: DateTime<Utc>,
    ) -> Result<Self, DomainError> {
        validate_identity(&draft.sku, &draft.ean, &draft.name)?;
        validate_rating(draft.rating_tenths)?;

        Ok(Self {
            id,
            sku: draft.sku,
            ean: draft.ean,
            name: draft.name,
            brand_id: draft.brand_id,
            category_id: draft.category_id,
            provider_id: draft.provider_id,
            unit_cost: draft.unit_cost,
            sale_price: draft.sale_price,
            weight_grams: draft.weight_grams,
            dimensions: draft.dimensions,
            description: draft.description,
            warehouse_location: draft.warehouse_location,
            usage_age: draft.usage_age,
            rating_tenths: draft.rating_tenths,
            active: true,
            created_by,
            created_at: now,
            updated_at: now,
            version: 0,
        })
    }

    /// Apply a patch, revalidating the result. Does not touch `version` or
    /// `updated_at`; the store owns those on commit.
    pub fn with_patch(&self, patch: ProductPatch) -> Result<Self, DomainError> {
        let mut next = self.clone();
        if let Some(sku) = patch.sku {
            next.sku = sku;
        }
        if let Some(ean) = patch.ean {
            next.ean = ean;
        }
        if let Some(name) = patch.name {
            next.name = name;
        }
        if let Some(brand_id) = patch.brand_id {
            next.brand_id = brand_id;
        }
        if let Some(category_id) = patch.category_id {
            next.category_id = category_id;
        }
        if let Some(provider_id) = patch.provider_id {
            next.provider_id = provider_id;
        }
        if let Some(unit_cost) = patch.unit_cost {
            next.unit_cost = unit_cost;
        }
        if let Some(sale_price) = patch.sale_price {
            next.sale_price = sale_price;
        }
        if let Some(weight_grams) = patch.weight_grams {
            next.weight_grams = weight_grams;
        }
        if let Some(dimensions) = patch.dimensions {
            next.dimensions = dimensions;
        }
        if let Some(description) = patch.description {
            next.description = description;
        }
        if let Some(warehouse_location) = patch.warehouse_location {
            next.warehouse_location = warehouse_location;
        }
        if let Some(usage_age) = patch.usage_age {
            next.usage_age = usage_age;
        }
        if let Some(rating_tenths) = patch.rating_tenths {
            next.rating_tenths = rating_tenths;
        }

        validate_identity(&next.sku, &next.ean, &next.name)?;
        validate_rating(next.rating_tenths)?;
        Ok(next)
    }

    /// Logically retired copy. Retirement is the supported lifecycle end;
    /// hard deletion is rejected while movements reference the product.
    pub fn retired(&self) -> Self {
        let mut next = self.clone();
        next.active = false;
        next
    }

    /// Field values as recorded in audit snapshots: the business fields,
    /// without store bookkeeping (`version`, timestamps), so a no-op save
    /// diffs as unchanged.
    pub fn audit_fields(&self) -> serde_json::Value {
        serde_json::json!({
            "sku": self.sku,
            "ean": self.ean,
            "name": self.name,
            "brand_id": self.brand_id,
            "category_id": self.category_id,
            "provider_id": self.provider_id,
            "unit_cost": self.unit_cost,
            "sale_price": self.sale_price,
            "weight_grams": self.weight_grams,
            "dimensions": self.dimensions,
            "description": self.description,
            "warehouse_location": self.warehouse_location,
            "usage_age": self.usage_age,
            "rating_tenths": self.rating_tenths,
            "active": self.active,
        })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn draft() -> ProductDraft {
        ProductDraft {
            sku: "SKU-001".to_string(),
            ean: "7801234567897".to_string(),
            name: "Wooden Train Set".to_string(),
            brand_id: BrandId::new(),
            category_id: CategoryId::new(),
            provider_id: ProviderId::new(),
            unit_cost: 12_990,
            sale_price: 24_990,
            weight_grams: 850,
            dimensions: "20 x 35 x 10".to_string(),
            description: "48-piece wooden train set".to_string(),
            warehouse_location: "B-12".to_string(),
            usage_age: Some("3+ years".to_string()),
            rating_tenths: 45,
        }
    }

    #[test]
    fn draft_builds_active_product_at_version_zero() {
        let product =
            Product::from_draft(ProductId::new(), draft(), UserId::new(), Utc::now()).unwrap();
        assert!(product.active);
        assert_eq!(product.version, 0);
        assert_eq!(product.sku, "SKU-001");
    }

    #[test]
    fn identity_fields_are_validated() {
        let mut bad = draft();
        bad.name = "   ".to_string();
        assert!(matches!(
            Product::from_draft(ProductId::new(), bad, UserId::new(), Utc::now()),
            Err(DomainError::Validation(_))
        ));

        let mut bad = draft();
        bad.ean = "123".to_string();
        assert!(matches!(
            Product::from_draft(ProductId::new(), bad, UserId::new(), Utc::now()),
            Err(DomainError::Validation(_))
        ));

        let mut bad = draft();
        bad.ean = "78012345678AB".to_string();
        assert!(matches!(
            Product::from_draft(ProductId::new(), bad, UserId::new(), Utc::now()),
            Err(DomainError::Validation(_))
        ));
    }

    #[test]
    fn rating_is_bounded() {
        let mut bad = draft();
        bad.rating_tenths = 51;
        assert!(matches!(
            Product::from_draft(ProductId::new(), bad, UserId::new(), Utc::now()),
            Err(DomainError::Validation(_))
        ));
    }

    #[test]
    fn patch_applies_and_revalidates() {
        let product =
            Product::from_draft(ProductId::new(), draft(), UserId::new(), Utc::now()).unwrap();

        let updated = product
            .with_patch(ProductPatch {
                sale_price: Some(19_990),
                usage_age: Some(None),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(updated.sale_price, 19_990);
        assert_eq!(updated.usage_age, None);
        assert_eq!(updated.sku, product.sku);

        let err = product
            .with_patch(ProductPatch {
                ean: Some("oops".to_string()),
                ..Default::default()
            })
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn audit_fields_ignore_store_bookkeeping() {
        let product =
            Product::from_draft(ProductId::new(), draft(), UserId::new(), Utc::now()).unwrap();
        let mut later = product.clone();
        later.version = 7;
        later.updated_at = Utc::now();
        assert_eq!(product.audit_fields(), later.audit_fields());
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn any_13_digit_ean_is_accepted(ean in "[0-9]{13}") {
                let mut valid = draft();
                valid.ean = ean;
                prop_assert!(
                    Product::from_draft(ProductId::new(), valid, UserId::new(), Utc::now())
                        .is_ok()
                );
            }

            #[test]
            fn wrong_length_eans_are_rejected(ean in "[0-9]{1,12}|[0-9]{14,18}") {
                let mut invalid = draft();
                invalid.ean = ean;
                prop_assert!(
                    Product::from_draft(ProductId::new(), invalid, UserId::new(), Utc::now())
                        .is_err()
                );
            }
        }
    }
}
