//! Catalog mutations: audited writes over the store, guarded by the ledger.
//!
//! Every mutation follows the same shape: validate, commit to the catalog
//! store under a CAS check, then record the audit snapshot. If the snapshot
//! cannot be recorded the store write is compensated, so a mutation and its
//! snapshot land together or not at all.

use chrono::Utc;
use tracing::{debug, error, info, warn};

use bodega_audit::{AuditError, AuditSnapshot, AuditTrail, ChangeKind, EntityRef, SnapshotPage};
use bodega_core::{
    BrandId, CategoryId, DomainError, DomainResult, ExpectedVersion, ProductId, ProviderId, UserId,
};

use crate::product::{Product, ProductDraft, ProductPatch};
use crate::store::{CatalogStore, CatalogStoreError};
use crate::taxonomy::{Brand, Category, ParentRef, Provider};

/// Read side of the movement ledger, as the catalog needs it: a stream is
/// opened for every new product, and hard deletion is refused while the
/// stream holds history.
pub trait MovementIndex: Send + Sync {
    fn register_product(&self, product_id: ProductId) -> DomainResult<()>;
    fn has_movements(&self, product_id: ProductId) -> DomainResult<bool>;
}

impl<M> MovementIndex for std::sync::Arc<M>
where
    M: MovementIndex + ?Sized,
{
    fn register_product(&self, product_id: ProductId) -> DomainResult<()> {
        (**self).register_product(product_id)
    }

    fn has_movements(&self, product_id: ProductId) -> DomainResult<bool> {
        (**self).has_movements(product_id)
    }
}

/// Outcome of one cascade deactivation pass.
///
/// `examined` counts every product referencing the parent, `deactivated`
/// only those this pass flipped. A pass interrupted by an error can simply
/// be re-run: already-inactive products are skipped, so the counts pick up
/// where the failed pass stopped.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub struct CascadeReport {
    pub examined: usize,
    pub deactivated: usize,
}

fn map_store_error(err: CatalogStoreError) -> DomainError {
    match err {
        CatalogStoreError::NotFound => DomainError::NotFound,
        CatalogStoreError::Conflict(msg) => DomainError::conflict(msg),
        CatalogStoreError::Duplicate(msg) => DomainError::conflict(msg),
        CatalogStoreError::Storage(msg) => DomainError::persistence(msg),
    }
}

fn map_audit_error(err: AuditError) -> DomainError {
    match err {
        AuditError::Storage(msg) => DomainError::persistence(msg),
    }
}

/// Catalog application service.
pub struct CatalogService<S, T, M> {
    store: S,
    trail: T,
    movements: M,
}

macro_rules! parent_ops {
    ($entity:ty, $id_ty:ty, $label:literal,
     $create:ident, $rename:ident, $deactivate:ident, $get:ident,
     $insert_m:ident, $get_m:ident, $update_m:ident, $remove_m:ident,
     $entity_ref:path) => {
        pub fn $create(
            &self,
            name: impl Into<String>,
            acting_user: UserId,
        ) -> DomainResult<$entity> {
            let entity = <$entity>::new(<$id_ty>::new(), name)?;
            let stored = self.store.$insert_m(entity).map_err(map_store_error)?;
            if let Err(err) = self.trail.record(
                $entity_ref(stored.id),
                ChangeKind::Created,
                acting_user,
                stored.audit_fields(),
            ) {
                if let Err(rollback) = self.store.$remove_m(stored.id) {
                    error!(
                        id = %stored.id,
                        error = %rollback,
                        concat!($label, " left committed without its snapshot")
                    );
                }
                return Err(map_audit_error(err));
            }
            debug!(id = %stored.id, name = %stored.name, concat!($label, " created"));
            Ok(stored)
        }

        pub fn $rename(
            &self,
            id: $id_ty,
            name: impl Into<String>,
            acting_user: UserId,
        ) -> DomainResult<$entity> {
            let current = self.store.$get_m(id).map_err(map_store_error)?;
            let renamed = current.renamed(name)?;
            if renamed.audit_fields() == current.audit_fields() {
                return Ok(current);
            }
            let stored = self
                .store
                .$update_m(renamed, ExpectedVersion::Exact(current.version))
                .map_err(map_store_error)?;
            if let Err(err) = self.trail.record(
                $entity_ref(id),
                ChangeKind::Updated,
                acting_user,
                stored.audit_fields(),
            ) {
                if let Err(rollback) = self
                    .store
                    .$update_m(current, ExpectedVersion::Exact(stored.version))
                {
                    error!(
                        id = %id,
                        error = %rollback,
                        concat!($label, " rename left committed without its snapshot")
                    );
                }
                return Err(map_audit_error(err));
            }
            Ok(stored)
        }

        /// Logical deletion. Idempotent; products referencing the entity
        /// are left to a follow-up [`CatalogService::cascade_deactivate`]
        /// pass.
        pub fn $deactivate(&self, id: $id_ty, acting_user: UserId) -> DomainResult<$entity> {
            let current = self.store.$get_m(id).map_err(map_store_error)?;
            if !current.active {
                return Ok(current);
            }
            let stored = self
                .store
                .$update_m(current.deactivated(), ExpectedVersion::Exact(current.version))
                .map_err(map_store_error)?;
            if let Err(err) = self.trail.record(
                $entity_ref(id),
                ChangeKind::Deleted,
                acting_user,
                stored.audit_fields(),
            ) {
                if let Err(rollback) = self
                    .store
                    .$update_m(current, ExpectedVersion::Exact(stored.version))
                {
                    error!(
                        id = %id,
                        error = %rollback,
                        concat!($label, " deactivation left committed without its snapshot")
                    );
                }
                return Err(map_audit_error(err));
            }
            info!(id = %stored.id, name = %stored.name, concat!($label, " deactivated"));
            Ok(stored)
        }

        pub fn $get(&self, id: $id_ty) -> DomainResult<$entity> {
            self.store.$get_m(id).map_err(map_store_error)
        }
    };
}

impl<S, T, M> CatalogService<S, T, M>
where
    S: CatalogStore,
    T: AuditTrail,
    M: MovementIndex,
{
    pub fn new(store: S, trail: T, movements: M) -> Self {
        Self {
            store,
            trail,
            movements,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn trail(&self) -> &T {
        &self.trail
    }

    pub fn movements(&self) -> &M {
        &self.movements
    }

    // ---- products ----------------------------------------------------

    pub fn create_product(
        &self,
        draft: ProductDraft,
        acting_user: UserId,
    ) -> DomainResult<Product> {
        self.require_active_brand(draft.brand_id)?;
        self.require_active_category(draft.category_id)?;
        self.require_active_provider(draft.provider_id)?;

        let product = Product::from_draft(ProductId::new(), draft, acting_user, Utc::now())?;
        let stored = self.store.insert_product(product).map_err(map_store_error)?;

        if let Err(err) = self.trail.record(
            EntityRef::product(stored.id),
            ChangeKind::Created,
            acting_user,
            stored.audit_fields(),
        ) {
            if let Err(rollback) = self.store.remove_product(stored.id) {
                error!(
                    product = %stored.id,
                    error = %rollback,
                    "product left committed without its snapshot"
                );
            }
            return Err(map_audit_error(err));
        }

        // Every product gets a ledger stream at birth; without one the
        // consistency guard has nothing to CAS against. Registered last: a
        // failure here unwinds the row and the snapshot, leaving no orphan
        // stream behind.
        if let Err(err) = self.movements.register_product(stored.id) {
            if let Err(rollback) = self.store.remove_product(stored.id) {
                error!(
                    product = %stored.id,
                    error = %rollback,
                    "product left committed after stream registration failure"
                );
            }
            if let Err(rollback) = self.trail.purge(EntityRef::product(stored.id)) {
                error!(
                    product = %stored.id,
                    error = %rollback,
                    "snapshot left behind after stream registration failure"
                );
            }
            return Err(err);
        }
        info!(product = %stored.id, sku = %stored.sku, "product created");
        Ok(stored)
    }

    /// Apply a partial update. A save that changes no audited field is a
    /// no-op: the store is not written and no snapshot is recorded.
    pub fn update_product(
        &self,
        id: ProductId,
        patch: ProductPatch,
        acting_user: UserId,
    ) -> DomainResult<Product> {
        if let Some(brand_id) = patch.brand_id {
            self.require_active_brand(brand_id)?;
        }
        if let Some(category_id) = patch.category_id {
            self.require_active_category(category_id)?;
        }
        if let Some(provider_id) = patch.provider_id {
            self.require_active_provider(provider_id)?;
        }

        let current = self.store.product(id).map_err(map_store_error)?;
        let next = current.with_patch(patch)?;
        if next.audit_fields() == current.audit_fields() {
            debug!(product = %id, "save changed nothing, skipping");
            return Ok(current);
        }
        let stored = self
            .store
            .update_product(next, ExpectedVersion::Exact(current.version))
            .map_err(map_store_error)?;
        if let Err(err) = self.trail.record(
            EntityRef::product(id),
            ChangeKind::Updated,
            acting_user,
            stored.audit_fields(),
        ) {
            if let Err(rollback) = self
                .store
                .update_product(current, ExpectedVersion::Exact(stored.version))
            {
                error!(
                    product = %id,
                    error = %rollback,
                    "update left committed without its snapshot"
                );
            }
            return Err(map_audit_error(err));
        }
        Ok(stored)
    }

    /// Logical deletion: flip `active` off, keep the row and its history.
    /// Idempotent.
    pub fn retire_product(&self, id: ProductId, acting_user: UserId) -> DomainResult<Product> {
        let current = self.store.product(id).map_err(map_store_error)?;
        if !current.active {
            return Ok(current);
        }
        let stored = self
            .store
            .update_product(current.retired(), ExpectedVersion::Exact(current.version))
            .map_err(map_store_error)?;
        if let Err(err) = self.trail.record(
            EntityRef::product(id),
            ChangeKind::Deleted,
            acting_user,
            stored.audit_fields(),
        ) {
            if let Err(rollback) = self
                .store
                .update_product(current, ExpectedVersion::Exact(stored.version))
            {
                error!(
                    product = %id,
                    error = %rollback,
                    "retirement left committed without its snapshot"
                );
            }
            return Err(map_audit_error(err));
        }
        info!(product = %id, "product retired");
        Ok(stored)
    }

    /// Hard deletion, only for products whose ledger stream is still empty.
    /// Anything with recorded movements must be retired instead, so history
    /// keeps its referent.
    pub fn delete_product(&self, id: ProductId, acting_user: UserId) -> DomainResult<()> {
        if self.movements.has_movements(id)? {
            return Err(DomainError::MovementsExist(id));
        }
        let removed = self.store.remove_product(id).map_err(map_store_error)?;
        if let Err(err) = self.trail.record(
            EntityRef::product(id),
            ChangeKind::Deleted,
            acting_user,
            removed.audit_fields(),
        ) {
            if let Err(rollback) = self.store.insert_product(removed) {
                error!(
                    product = %id,
                    error = %rollback,
                    "hard delete left committed without its snapshot"
                );
            }
            return Err(map_audit_error(err));
        }
        info!(product = %id, "movement-free product hard-deleted");
        Ok(())
    }

    pub fn product(&self, id: ProductId) -> DomainResult<Product> {
        self.store.product(id).map_err(map_store_error)
    }

    pub fn list_products(&self) -> DomainResult<Vec<Product>> {
        self.store.list_products().map_err(map_store_error)
    }

    /// Audit history of one entity, newest snapshot first.
    pub fn history(
        &self,
        entity: EntityRef,
        page: SnapshotPage,
    ) -> DomainResult<Vec<AuditSnapshot>> {
        self.trail.list(entity, page).map_err(map_audit_error)
    }

    // ---- parents -----------------------------------------------------

    parent_ops!(
        Brand, BrandId, "brand",
        create_brand, rename_brand, deactivate_brand, brand,
        insert_brand, brand, update_brand, remove_brand,
        EntityRef::brand
    );
    parent_ops!(
        Category, CategoryId, "category",
        create_category, rename_category, deactivate_category, category,
        insert_category, category, update_category, remove_category,
        EntityRef::category
    );
    parent_ops!(
        Provider, ProviderId, "provider",
        create_provider, rename_provider, deactivate_provider, provider,
        insert_provider, provider, update_provider, remove_provider,
        EntityRef::provider
    );

    /// Retire every still-active product referencing `parent`. Run after
    /// deactivating the parent itself; each retirement is individually
    /// audited, and a pass cut short by an error is safe to re-run.
    pub fn cascade_deactivate(
        &self,
        parent: ParentRef,
        acting_user: UserId,
    ) -> DomainResult<CascadeReport> {
        let products = self.store.products_of(parent).map_err(map_store_error)?;
        let mut report = CascadeReport {
            examined: products.len(),
            deactivated: 0,
        };
        for product in products {
            if !product.active {
                continue;
            }
            if let Err(err) = self.retire_product(product.id, acting_user) {
                warn!(
                    %parent,
                    product = %product.id,
                    deactivated = report.deactivated,
                    "cascade pass interrupted, re-run to resume"
                );
                return Err(err);
            }
            report.deactivated += 1;
        }
        info!(
            %parent,
            examined = report.examined,
            deactivated = report.deactivated,
            "cascade deactivation pass complete"
        );
        Ok(report)
    }

    fn require_active_brand(&self, id: BrandId) -> DomainResult<()> {
        match self.store.brand(id) {
            Ok(brand) if brand.active => Ok(()),
            Ok(_) => Err(DomainError::validation(format!("brand {id} is inactive"))),
            Err(CatalogStoreError::NotFound) => {
                Err(DomainError::validation(format!("unknown brand {id}")))
            }
            Err(err) => Err(map_store_error(err)),
        }
    }

    fn require_active_category(&self, id: CategoryId) -> DomainResult<()> {
        match self.store.category(id) {
            Ok(category) if category.active => Ok(()),
            Ok(_) => Err(DomainError::validation(format!("category {id} is inactive"))),
            Err(CatalogStoreError::NotFound) => {
                Err(DomainError::validation(format!("unknown category {id}")))
            }
            Err(err) => Err(map_store_error(err)),
        }
    }

    fn require_active_provider(&self, id: ProviderId) -> DomainResult<()> {
        match self.store.provider(id) {
            Ok(provider) if provider.active => Ok(()),
            Ok(_) => Err(DomainError::validation(format!("provider {id} is inactive"))),
            Err(CatalogStoreError::NotFound) => {
                Err(DomainError::validation(format!("unknown provider {id}")))
            }
            Err(err) => Err(map_store_error(err)),
        }
    }
}
