//! Brands, categories and providers: the named parents a product references.

use serde::{Deserialize, Serialize};

use bodega_core::{BrandId, CategoryId, DomainError, ProviderId};

macro_rules! named_entity {
    ($t:ident, $id:ty, $label:literal) => {
        #[doc = concat!("Catalog ", $label, ". Name is unique among its kind.")]
        #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
        pub struct $t {
            pub id: $id,
            pub name: String,
            pub active: bool,
            /// CAS counter for catalog writes.
            pub version: u64,
        }

        impl $t {
            pub fn new(id: $id, name: impl Into<String>) -> Result<Self, DomainError> {
                let name = name.into();
                if name.trim().is_empty() {
                    return Err(DomainError::validation(concat!(
                        $label,
                        " name cannot be empty"
                    )));
                }
                Ok(Self {
                    id,
                    name,
                    active: true,
                    version: 0,
                })
            }

            pub fn renamed(&self, name: impl Into<String>) -> Result<Self, DomainError> {
                let name = name.into();
                if name.trim().is_empty() {
                    return Err(DomainError::validation(concat!(
                        $label,
                        " name cannot be empty"
                    )));
                }
                let mut next = self.clone();
                next.name = name;
                Ok(next)
            }

            pub fn deactivated(&self) -> Self {
                let mut next = self.clone();
                next.active = false;
                next
            }

            /// Field values as recorded in audit snapshots.
            pub fn audit_fields(&self) -> serde_json::Value {
                serde_json::json!({
                    "name": self.name,
                    "active": self.active,
                })
            }
        }
    };
}

named_entity!(Brand, BrandId, "brand");
named_entity!(Category, CategoryId, "category");
named_entity!(Provider, ProviderId, "provider");

/// Reference to a product's parent entity, for cascade passes.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ParentRef {
    Brand(BrandId),
    Category(CategoryId),
    Provider(ProviderId),
}

impl core::fmt::Display for ParentRef {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            ParentRef::Brand(id) => write!(f, "brand/{id}"),
            ParentRef::Category(id) => write!(f, "category/{id}"),
            ParentRef::Provider(id) => write!(f, "provider/{id}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_must_be_non_empty() {
        assert!(Brand::new(BrandId::new(), "  ").is_err());
        let brand = Brand::new(BrandId::new(), "Fisher-Price").unwrap();
        assert!(brand.active);
        assert!(brand.renamed("").is_err());
        assert_eq!(brand.renamed("Mattel").unwrap().name, "Mattel");
    }

    #[test]
    fn deactivation_preserves_identity() {
        let provider = Provider::new(ProviderId::new(), "Importadora Sur").unwrap();
        let inactive = provider.deactivated();
        assert_eq!(inactive.id, provider.id);
        assert!(!inactive.active);
    }
}
