use crate::domain::inventory::{
    Batch, BatchChanges, BatchWithProduct, NewBatch, NewProduct, Product, ProductChanges,
    ProductSummary, ProductWithBatches,
};
use crate::domain::scope::TenantScope;
use crate::domain::tenant::{SubscriptionRecord, SubscriptionStatus, Tenant, TenantOverview};
use crate::domain::user::User;
use crate::{Conflict, CoreError, InventoryRepository, TenantRepository};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use uuid::Uuid;

/// In-memory implementation of both repository ports for tests and
/// single-process mode. Reads go straight to the maps; writes that touch
/// more than one map hold `write_lock` so they land together.
#[derive(Debug, Clone, Default)]
pub struct InMemoryStore {
    tenants: Arc<DashMap<Uuid, Tenant>>,
    // Keyed by lowercase email.
    users: Arc<DashMap<String, User>>,
    products: Arc<DashMap<Uuid, Product>>,
    batches: Arc<DashMap<Uuid, Batch>>,
    subscriptions: Arc<DashMap<String, SubscriptionRecord>>,
    write_lock: Arc<Mutex<()>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, ()>, CoreError> {
        self.write_lock
            .lock()
            .map_err(|_| CoreError::Internal("In-memory store lock poisoned".into()))
    }

    fn scoped_product(&self, scope: &TenantScope, product_id: Uuid) -> Option<Product> {
        self.products
            .get(&product_id)
            .filter(|p| scope.owns(p.tenant_id))
            .map(|p| p.clone())
    }

    /// A batch is visible only if both it and its product belong to the scope.
    fn scoped_batch(&self, scope: &TenantScope, batch_id: Uuid) -> Option<Batch> {
        let batch = self
            .batches
            .get(&batch_id)
            .filter(|b| scope.owns(b.tenant_id))
            .map(|b| b.clone())?;
        self.scoped_product(scope, batch.product_id)?;
        Some(batch)
    }

    fn batches_of(&self, product_id: Uuid) -> Vec<Batch> {
        let mut batches: Vec<Batch> = self
            .batches
            .iter()
            .filter(|b| b.product_id == product_id)
            .map(|b| b.clone())
            .collect();
        batches.sort_by_key(|b| b.expiration_date);
        batches
    }
}

#[async_trait]
impl TenantRepository for InMemoryStore {
    async fn slug_exists(&self, slug: &str) -> Result<bool, CoreError> {
        Ok(self.tenants.iter().any(|t| t.slug == slug))
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, CoreError> {
        Ok(self
            .users
            .get(&email.trim().to_lowercase())
            .map(|u| u.clone()))
    }

    async fn find_user(&self, user_id: Uuid) -> Result<Option<User>, CoreError> {
        Ok(self
            .users
            .iter()
            .find(|u| u.id() == user_id)
            .map(|u| u.value().clone()))
    }

    async fn create_tenant_with_owner(&self, tenant: &Tenant, owner: &User) -> Result<(), CoreError> {
        let _guard = self.lock()?;

        if self.tenants.iter().any(|t| t.slug == tenant.slug) {
            return Err(CoreError::AlreadyExists(Conflict::Slug));
        }
        if self.users.contains_key(owner.email()) {
            return Err(CoreError::AlreadyExists(Conflict::Email));
        }

        self.tenants.insert(tenant.id, tenant.clone());
        self.users.insert(owner.email().to_string(), owner.clone());
        Ok(())
    }

    async fn create_user(&self, user: &User) -> Result<(), CoreError> {
        let _guard = self.lock()?;
        if self.users.contains_key(user.email()) {
            return Err(CoreError::AlreadyExists(Conflict::Email));
        }
        if let Some(tenant_id) = user.tenant_id() {
            if !self.tenants.contains_key(&tenant_id) {
                return Err(CoreError::NotFound("Tenant".into()));
            }
        }
        self.users.insert(user.email().to_string(), user.clone());
        Ok(())
    }

    async fn find_tenant(&self, tenant_id: Uuid) -> Result<Option<Tenant>, CoreError> {
        Ok(self.tenants.get(&tenant_id).map(|t| t.clone()))
    }

    async fn list_tenants(&self) -> Result<Vec<TenantOverview>, CoreError> {
        let mut overviews: Vec<TenantOverview> = self
            .tenants
            .iter()
            .map(|t| {
                let owner = self
                    .users
                    .iter()
                    .filter(|u| u.tenant_id() == Some(t.id))
                    .min_by_key(|u| u.created_at())
                    .map(|u| u.clone());
                let product_count = self
                    .products
                    .iter()
                    .filter(|p| p.tenant_id == t.id)
                    .count() as i64;
                TenantOverview {
                    tenant: t.clone(),
                    owner_name: owner.as_ref().and_then(|u| u.name().map(str::to_string)),
                    owner_email: owner.as_ref().map(|u| u.email().to_string()),
                    product_count,
                }
            })
            .collect();
        overviews.sort_by(|a, b| b.tenant.created_at.cmp(&a.tenant.created_at));
        Ok(overviews)
    }

    async fn set_subscription_status(
        &self,
        tenant_id: Uuid,
        status: SubscriptionStatus,
        payment_customer_id: Option<&str>,
    ) -> Result<Tenant, CoreError> {
        let mut tenant = self
            .tenants
            .get_mut(&tenant_id)
            .ok_or_else(|| CoreError::NotFound("Tenant".into()))?;
        tenant.subscription_status = status;
        if let Some(customer_id) = payment_customer_id {
            tenant.payment_customer_id = Some(customer_id.to_string());
        }
        tenant.updated_at = Utc::now();
        Ok(tenant.clone())
    }

    async fn record_subscription(&self, record: &SubscriptionRecord) -> Result<bool, CoreError> {
        if !self.tenants.contains_key(&record.tenant_id) {
            return Err(CoreError::NotFound("Tenant".into()));
        }
        match self.subscriptions.entry(record.external_payment_id.clone()) {
            dashmap::mapref::entry::Entry::Occupied(_) => Ok(false),
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(record.clone());
                Ok(true)
            }
        }
    }

    async fn list_subscriptions(&self, tenant_id: Uuid) -> Result<Vec<SubscriptionRecord>, CoreError> {
        let mut records: Vec<SubscriptionRecord> = self
            .subscriptions
            .iter()
            .filter(|r| r.tenant_id == tenant_id)
            .map(|r| r.clone())
            .collect();
        records.sort_by_key(|r| r.created_at);
        Ok(records)
    }

    async fn expire_trials(&self, now: DateTime<Utc>) -> Result<Vec<Uuid>, CoreError> {
        let mut expired = Vec::new();
        for mut tenant in self.tenants.iter_mut() {
            let ended = tenant.trial_ends_at.is_some_and(|ends_at| ends_at <= now);
            if tenant.subscription_status == SubscriptionStatus::Trial && ended {
                tenant.subscription_status = SubscriptionStatus::Suspended;
                tenant.updated_at = now;
                expired.push(tenant.id);
            }
        }
        Ok(expired)
    }
}

#[async_trait]
impl InventoryRepository for InMemoryStore {
    async fn list_products(&self, scope: &TenantScope) -> Result<Vec<ProductWithBatches>, CoreError> {
        let mut products: Vec<Product> = self
            .products
            .iter()
            .filter(|p| scope.owns(p.tenant_id))
            .map(|p| p.clone())
            .collect();
        products.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        Ok(products
            .into_iter()
            .map(|product| {
                let batches = self.batches_of(product.id);
                ProductWithBatches { product, batches }
            })
            .collect())
    }

    async fn find_product(
        &self,
        scope: &TenantScope,
        product_id: Uuid,
    ) -> Result<Option<ProductWithBatches>, CoreError> {
        Ok(self.scoped_product(scope, product_id).map(|product| {
            let batches = self.batches_of(product.id);
            ProductWithBatches { product, batches }
        }))
    }

    async fn create_product(
        &self,
        scope: &TenantScope,
        product: NewProduct,
        initial_batch: Option<NewBatch>,
    ) -> Result<ProductWithBatches, CoreError> {
        let now = Utc::now();
        let product = product.into_product(scope.tenant_id(), now)?;
        let batches = match initial_batch {
            Some(batch) => vec![batch.into_batch(scope.tenant_id(), product.id, now)?],
            None => Vec::new(),
        };

        let _guard = self.lock()?;
        self.products.insert(product.id, product.clone());
        for batch in &batches {
            self.batches.insert(batch.id, batch.clone());
        }
        Ok(ProductWithBatches { product, batches })
    }

    async fn update_product(
        &self,
        scope: &TenantScope,
        product_id: Uuid,
        changes: ProductChanges,
    ) -> Result<Product, CoreError> {
        let mut product = self
            .products
            .get_mut(&product_id)
            .filter(|p| scope.owns(p.tenant_id))
            .ok_or_else(|| CoreError::NotFound("Product".into()))?;
        let mut updated = product.clone();
        changes.apply_to(&mut updated, Utc::now())?;
        *product = updated.clone();
        Ok(updated)
    }

    async fn delete_product(&self, scope: &TenantScope, product_id: Uuid) -> Result<(), CoreError> {
        let _guard = self.lock()?;
        if self.scoped_product(scope, product_id).is_none() {
            return Err(CoreError::NotFound("Product".into()));
        }
        self.batches.retain(|_, b| b.product_id != product_id);
        self.products.remove(&product_id);
        Ok(())
    }

    async fn list_batches(&self, scope: &TenantScope) -> Result<Vec<BatchWithProduct>, CoreError> {
        let mut batches: Vec<BatchWithProduct> = self
            .batches
            .iter()
            .filter(|b| scope.owns(b.tenant_id))
            .filter_map(|b| {
                let product = self.scoped_product(scope, b.product_id)?;
                Some(BatchWithProduct {
                    batch: b.clone(),
                    product: ProductSummary::from(&product),
                })
            })
            .collect();
        batches.sort_by_key(|b| b.batch.expiration_date);
        Ok(batches)
    }

    async fn create_batch(
        &self,
        scope: &TenantScope,
        product_id: Uuid,
        batch: NewBatch,
    ) -> Result<Batch, CoreError> {
        let _guard = self.lock()?;
        let product = self
            .scoped_product(scope, product_id)
            .ok_or_else(|| CoreError::NotFound("Product".into()))?;
        let batch = batch.into_batch(scope.tenant_id(), product.id, Utc::now())?;
        self.batches.insert(batch.id, batch.clone());
        Ok(batch)
    }

    async fn update_batch(
        &self,
        scope: &TenantScope,
        batch_id: Uuid,
        changes: BatchChanges,
    ) -> Result<Batch, CoreError> {
        let _guard = self.lock()?;
        let mut batch = self
            .scoped_batch(scope, batch_id)
            .ok_or_else(|| CoreError::NotFound("Batch".into()))?;
        changes.apply_to(&mut batch)?;
        self.batches.insert(batch.id, batch.clone());
        Ok(batch)
    }

    async fn delete_batch(&self, scope: &TenantScope, batch_id: Uuid) -> Result<(), CoreError> {
        let _guard = self.lock()?;
        if self.scoped_batch(scope, batch_id).is_none() {
            return Err(CoreError::NotFound("Batch".into()));
        }
        self.batches.remove(&batch_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::tenant::generate_slug;
    use chrono::Duration;
    use rust_decimal::Decimal;

    async fn signup(store: &InMemoryStore, clinic: &str, email: &str) -> (Tenant, User) {
        let now = Utc::now();
        let tenant = Tenant::signup(clinic, generate_slug(clinic), 0, now).unwrap();
        let owner = User::clinic_admin("Owner", email, "hash".into(), tenant.id, now).unwrap();
        store.create_tenant_with_owner(&tenant, &owner).await.unwrap();
        (tenant, owner)
    }

    fn new_product(name: &str) -> NewProduct {
        NewProduct {
            name: name.into(),
            price: Decimal::from(10),
            ..Default::default()
        }
    }

    fn new_batch(quantity: i32, days: i64) -> NewBatch {
        NewBatch {
            quantity,
            expiration_date: Utc::now() + Duration::days(days),
            lot_code: Some("L-1".into()),
            unit_cost: None,
        }
    }

    #[tokio::test]
    async fn test_signup_is_atomic_on_duplicate_email() {
        let store = InMemoryStore::new();
        signup(&store, "Clínica A", "owner@a.com").await;

        let now = Utc::now();
        let tenant = Tenant::signup("Clínica B", "clinica-b".into(), 0, now).unwrap();
        let owner = User::clinic_admin("Other", "OWNER@a.com", "h".into(), tenant.id, now).unwrap();
        let result = store.create_tenant_with_owner(&tenant, &owner).await;

        assert!(matches!(result, Err(CoreError::AlreadyExists(Conflict::Email))));
        assert!(store.find_tenant(tenant.id).await.unwrap().is_none());
        assert!(!store.slug_exists("clinica-b").await.unwrap());
    }

    #[tokio::test]
    async fn test_find_user_by_email_is_case_insensitive() {
        let store = InMemoryStore::new();
        let (_, owner) = signup(&store, "Clínica A", "owner@a.com").await;
        let found = store.find_user_by_email("Owner@A.com").await.unwrap().unwrap();
        assert_eq!(found.id(), owner.id());

        let by_id = store.find_user(owner.id()).await.unwrap().unwrap();
        assert_eq!(by_id.email(), "owner@a.com");
        assert!(store.find_user(Uuid::new_v4()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_tenants_cannot_see_each_other() {
        let store = InMemoryStore::new();
        let (a, _) = signup(&store, "Clínica A", "a@a.com").await;
        let (b, _) = signup(&store, "Clínica B", "b@b.com").await;
        let scope_a = TenantScope::from_session(a.id);
        let scope_b = TenantScope::from_session(b.id);

        let created = store
            .create_product(&scope_b, new_product("Botox"), Some(new_batch(3, 90)))
            .await
            .unwrap();
        let product_id = created.product.id;
        let batch_id = created.batches[0].id;

        assert!(store.list_products(&scope_a).await.unwrap().is_empty());
        assert!(store.list_batches(&scope_a).await.unwrap().is_empty());
        assert!(store.find_product(&scope_a, product_id).await.unwrap().is_none());
        assert!(matches!(
            store.update_product(&scope_a, product_id, ProductChanges::default()).await,
            Err(CoreError::NotFound(_))
        ));
        assert!(matches!(
            store.delete_product(&scope_a, product_id).await,
            Err(CoreError::NotFound(_))
        ));
        assert!(matches!(
            store.create_batch(&scope_a, product_id, new_batch(1, 10)).await,
            Err(CoreError::NotFound(_))
        ));
        assert!(matches!(
            store.update_batch(&scope_a, batch_id, BatchChanges::default()).await,
            Err(CoreError::NotFound(_))
        ));
        assert!(matches!(
            store.delete_batch(&scope_a, batch_id).await,
            Err(CoreError::NotFound(_))
        ));

        // Tenant B's data is untouched.
        let still_there = store.find_product(&scope_b, product_id).await.unwrap().unwrap();
        assert_eq!(still_there.batches.len(), 1);
    }

    #[tokio::test]
    async fn test_delete_product_removes_batches() {
        let store = InMemoryStore::new();
        let (a, _) = signup(&store, "Clínica A", "a@a.com").await;
        let scope = TenantScope::from_session(a.id);

        let created = store
            .create_product(&scope, new_product("Fios"), Some(new_batch(2, 40)))
            .await
            .unwrap();
        store
            .create_batch(&scope, created.product.id, new_batch(5, 10))
            .await
            .unwrap();

        store.delete_product(&scope, created.product.id).await.unwrap();
        assert!(store.list_batches(&scope).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_batches_sorted_by_expiration() {
        let store = InMemoryStore::new();
        let (a, _) = signup(&store, "Clínica A", "a@a.com").await;
        let scope = TenantScope::from_session(a.id);

        let p = store.create_product(&scope, new_product("Luvas"), None).await.unwrap();
        store.create_batch(&scope, p.product.id, new_batch(1, 90)).await.unwrap();
        store.create_batch(&scope, p.product.id, new_batch(1, 5)).await.unwrap();
        store.create_batch(&scope, p.product.id, new_batch(1, 30)).await.unwrap();

        let batches = store.list_batches(&scope).await.unwrap();
        let dates: Vec<_> = batches.iter().map(|b| b.batch.expiration_date).collect();
        let mut sorted = dates.clone();
        sorted.sort();
        assert_eq!(dates, sorted);
        assert_eq!(batches[0].product.name, "Luvas");
    }

    #[tokio::test]
    async fn test_record_subscription_is_unique_per_payment() {
        let store = InMemoryStore::new();
        let (a, _) = signup(&store, "Clínica A", "a@a.com").await;
        let record = SubscriptionRecord::approved_payment(a.id, "pay-1", Decimal::new(4990, 2), Utc::now());

        assert!(store.record_subscription(&record).await.unwrap());
        let replay = SubscriptionRecord::approved_payment(a.id, "pay-1", Decimal::new(4990, 2), Utc::now());
        assert!(!store.record_subscription(&replay).await.unwrap());
        assert_eq!(store.list_subscriptions(a.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_expire_trials() {
        let store = InMemoryStore::new();
        let now = Utc::now();

        let mut expired = Tenant::signup("Velha", "velha".into(), 7, now - Duration::days(10)).unwrap();
        expired.trial_ends_at = Some(now - Duration::days(3));
        let live = Tenant::signup("Nova", "nova".into(), 7, now).unwrap();
        for (tenant, email) in [(&expired, "v@v.com"), (&live, "n@n.com")] {
            let owner = User::clinic_admin("O", email, "h".into(), tenant.id, now).unwrap();
            store.create_tenant_with_owner(tenant, &owner).await.unwrap();
        }

        let ids = store.expire_trials(now).await.unwrap();
        assert_eq!(ids, vec![expired.id]);
        assert_eq!(
            store.find_tenant(expired.id).await.unwrap().unwrap().subscription_status,
            SubscriptionStatus::Suspended
        );
        assert_eq!(
            store.find_tenant(live.id).await.unwrap().unwrap().subscription_status,
            SubscriptionStatus::Trial
        );
    }

    #[tokio::test]
    async fn test_list_tenants_with_owner_and_counts() {
        let store = InMemoryStore::new();
        let (a, _) = signup(&store, "Clínica A", "a@a.com").await;
        let scope = TenantScope::from_session(a.id);
        store.create_product(&scope, new_product("X"), None).await.unwrap();
        store.create_product(&scope, new_product("Y"), None).await.unwrap();

        let tenants = store.list_tenants().await.unwrap();
        assert_eq!(tenants.len(), 1);
        assert_eq!(tenants[0].owner_email.as_deref(), Some("a@a.com"));
        assert_eq!(tenants[0].owner_name.as_deref(), Some("Owner"));
        assert_eq!(tenants[0].product_count, 2);
    }

    #[tokio::test]
    async fn test_set_subscription_status_unknown_tenant() {
        let store = InMemoryStore::new();
        let result = store
            .set_subscription_status(Uuid::new_v4(), SubscriptionStatus::Active, None)
            .await;
        assert!(matches!(result, Err(CoreError::NotFound(_))));
    }
}
