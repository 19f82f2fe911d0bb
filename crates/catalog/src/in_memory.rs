//! In-memory catalog store for tests and local runs.

use std::collections::HashMap;
use std::sync::RwLock;

use chrono::Utc;

use bodega_core::{BrandId, CategoryId, ExpectedVersion, ProductId, ProviderId};

use crate::product::Product;
use crate::store::{CatalogStore, CatalogStoreError};
use crate::taxonomy::{Brand, Category, ParentRef, Provider};

#[derive(Default)]
struct State {
    products: HashMap<ProductId, Product>,
    brands: HashMap<BrandId, Brand>,
    categories: HashMap<CategoryId, Category>,
    providers: HashMap<ProviderId, Provider>,
}

/// `RwLock<HashMap>`-backed catalog store.
#[derive(Default)]
pub struct InMemoryCatalogStore {
    state: RwLock<State>,
}

impl InMemoryCatalogStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn poisoned() -> CatalogStoreError {
    CatalogStoreError::Storage("lock poisoned".to_string())
}

impl State {
    fn check_product_identity(
        &self,
        candidate: &Product,
        skip: Option<ProductId>,
    ) -> Result<(), CatalogStoreError> {
        for other in self.products.values() {
            if Some(other.id) == skip || other.id == candidate.id {
                continue;
            }
            if other.sku == candidate.sku {
                return Err(CatalogStoreError::Duplicate(format!(
                    "sku {} already registered",
                    candidate.sku
                )));
            }
            if other.ean == candidate.ean {
                return Err(CatalogStoreError::Duplicate(format!(
                    "ean {} already registered",
                    candidate.ean
                )));
            }
        }
        Ok(())
    }
}

macro_rules! parent_store_ops {
    ($insert:ident, $get:ident, $update:ident, $remove:ident, $map:ident, $id_ty:ty, $entity:ty) => {
        fn $insert(&self, entity: $entity) -> Result<$entity, CatalogStoreError> {
            let mut state = self.state.write().map_err(|_| poisoned())?;
            if state
                .$map
                .values()
                .any(|other| other.id != entity.id && other.name == entity.name)
            {
                return Err(CatalogStoreError::Duplicate(format!(
                    "name {} already registered",
                    entity.name
                )));
            }
            state.$map.insert(entity.id, entity.clone());
            Ok(entity)
        }

        fn $get(&self, id: $id_ty) -> Result<$entity, CatalogStoreError> {
            let state = self.state.read().map_err(|_| poisoned())?;
            state.$map.get(&id).cloned().ok_or(CatalogStoreError::NotFound)
        }

        fn $update(
            &self,
            mut entity: $entity,
            expected: ExpectedVersion,
        ) -> Result<$entity, CatalogStoreError> {
            let mut state = self.state.write().map_err(|_| poisoned())?;
            let current = state.$map.get(&entity.id).ok_or(CatalogStoreError::NotFound)?;
            if !expected.matches(current.version) {
                return Err(CatalogStoreError::Conflict(format!(
                    "expected {expected:?}, stored version is {}",
                    current.version
                )));
            }
            if state
                .$map
                .values()
                .any(|other| other.id != entity.id && other.name == entity.name)
            {
                return Err(CatalogStoreError::Duplicate(format!(
                    "name {} already registered",
                    entity.name
                )));
            }
            entity.version = state.$map[&entity.id].version + 1;
            state.$map.insert(entity.id, entity.clone());
            Ok(entity)
        }

        fn $remove(&self, id: $id_ty) -> Result<$entity, CatalogStoreError> {
            let mut state = self.state.write().map_err(|_| poisoned())?;
            state.$map.remove(&id).ok_or(CatalogStoreError::NotFound)
        }
    };
}

impl CatalogStore for InMemoryCatalogStore {
    fn insert_product(&self, product: Product) -> Result<Product, CatalogStoreError> {
        let mut state = self.state.write().map_err(|_| poisoned())?;
        if state.products.contains_key(&product.id) {
            return Err(CatalogStoreError::Duplicate(format!(
                "product {} already registered",
                product.id
            )));
        }
        state.check_product_identity(&product, None)?;
        state.products.insert(product.id, product.clone());
        Ok(product)
    }

    fn product(&self, id: ProductId) -> Result<Product, CatalogStoreError> {
        let state = self.state.read().map_err(|_| poisoned())?;
        state
            .products
            .get(&id)
            .cloned()
            .ok_or(CatalogStoreError::NotFound)
    }

    fn update_product(
        &self,
        mut product: Product,
        expected: ExpectedVersion,
    ) -> Result<Product, CatalogStoreError> {
        let mut state = self.state.write().map_err(|_| poisoned())?;
        let current = state
            .products
            .get(&product.id)
            .ok_or(CatalogStoreError::NotFound)?;
        if !expected.matches(current.version) {
            return Err(CatalogStoreError::Conflict(format!(
                "expected {expected:?}, stored version is {}",
                current.version
            )));
        }
        let next_version = current.version + 1;
        state.check_product_identity(&product, Some(product.id))?;
        product.version = next_version;
        product.updated_at = Utc::now();
        state.products.insert(product.id, product.clone());
        Ok(product)
    }

    fn remove_product(&self, id: ProductId) -> Result<Product, CatalogStoreError> {
        let mut state = self.state.write().map_err(|_| poisoned())?;
        state.products.remove(&id).ok_or(CatalogStoreError::NotFound)
    }

    fn list_products(&self) -> Result<Vec<Product>, CatalogStoreError> {
        let state = self.state.read().map_err(|_| poisoned())?;
        let mut products: Vec<Product> = state.products.values().cloned().collect();
        products.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(products)
    }

    fn products_of(&self, parent: ParentRef) -> Result<Vec<Product>, CatalogStoreError> {
        let state = self.state.read().map_err(|_| poisoned())?;
        let mut products: Vec<Product> = state
            .products
            .values()
            .filter(|product| match parent {
                ParentRef::Brand(id) => product.brand_id == id,
                ParentRef::Category(id) => product.category_id == id,
                ParentRef::Provider(id) => product.provider_id == id,
            })
            .cloned()
            .collect();
        products.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(products)
    }

    parent_store_ops!(insert_brand, brand, update_brand, remove_brand, brands, BrandId, Brand);
    parent_store_ops!(
        insert_category,
        category,
        update_category,
        remove_category,
        categories,
        CategoryId,
        Category
    );
    parent_store_ops!(
        insert_provider,
        provider,
        update_provider,
        remove_provider,
        providers,
        ProviderId,
        Provider
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::product::tests::draft;
    use crate::product::ProductDraft;
    use bodega_core::UserId;

    fn sample(draft: ProductDraft) -> Product {
        Product::from_draft(ProductId::new(), draft, UserId::new(), Utc::now()).unwrap()
    }

    #[test]
    fn rejects_duplicate_sku() {
        let store = InMemoryCatalogStore::new();
        let mut second_draft = draft();
        second_draft.ean = "7790000000002".to_string();

        store.insert_product(sample(draft())).unwrap();
        let err = store.insert_product(sample(second_draft)).unwrap_err();
        assert!(matches!(err, CatalogStoreError::Duplicate(_)));
    }

    #[test]
    fn update_checks_expected_version() {
        let store = InMemoryCatalogStore::new();
        let product = store.insert_product(sample(draft())).unwrap();

        let mut renamed = product.clone();
        renamed.name = "Renamed".to_string();
        let stored = store
            .update_product(renamed, ExpectedVersion::Exact(product.version))
            .unwrap();
        assert_eq!(stored.version, product.version + 1);

        let mut stale = product.clone();
        stale.name = "Stale".to_string();
        let err = store
            .update_product(stale, ExpectedVersion::Exact(product.version))
            .unwrap_err();
        assert!(matches!(err, CatalogStoreError::Conflict(_)));
    }

    #[test]
    fn parent_names_are_unique() {
        let store = InMemoryCatalogStore::new();
        store
            .insert_brand(Brand::new(BrandId::new(), "Acme").unwrap())
            .unwrap();
        let err = store
            .insert_brand(Brand::new(BrandId::new(), "Acme").unwrap())
            .unwrap_err();
        assert!(matches!(err, CatalogStoreError::Duplicate(_)));
    }

    #[test]
    fn products_of_filters_by_parent() {
        let store = InMemoryCatalogStore::new();
        let a = store.insert_product(sample(draft())).unwrap();
        let mut other = draft();
        other.sku = "SKU-2".to_string();
        other.ean = "7790000000002".to_string();
        other.brand_id = BrandId::new();
        store.insert_product(sample(other)).unwrap();

        let matches = store.products_of(ParentRef::Brand(a.brand_id)).unwrap();
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].id, a.id);
    }
}
