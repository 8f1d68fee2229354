use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::{error::Error as StdError, fmt, future::Future};
use uuid::Uuid;

// Declare modules
pub mod adapters;
pub mod domain;

use domain::billing::{CheckoutRequest, CheckoutSession, NotificationKind, ProviderEvent};
use domain::inventory::{
    Batch, BatchChanges, BatchWithProduct, NewBatch, NewProduct, Product, ProductChanges,
    ProductWithBatches,
};
use domain::scope::TenantScope;
use domain::tenant::{SubscriptionRecord, SubscriptionStatus, Tenant, TenantOverview};
use domain::user::User;

/// Which uniqueness rule a write ran into.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Conflict {
    Slug,
    Email,
    Record(String),
}

impl fmt::Display for Conflict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Conflict::Slug => write!(f, "slug"),
            Conflict::Email => write!(f, "email"),
            Conflict::Record(what) => write!(f, "{}", what),
        }
    }
}

// Define a common error type for the core library
#[derive(thiserror::Error, Debug)]
pub enum CoreError {
    #[error("{0} not found")]
    NotFound(String),
    #[error("{0}")]
    Validation(String),
    #[error("Already exists: {0}")]
    AlreadyExists(Conflict),
    #[error("Unauthorized: {0}")]
    Unauthorized(String),
    #[error("Forbidden: {0}")]
    Forbidden(String),
    #[error("Upstream service error: {0}")]
    Upstream(String),
    #[error("Infrastructure error: {0}")]
    Infrastructure(#[from] Box<dyn StdError + Send + Sync>),
    #[error("Configuration error: {0}")]
    Configuration(String),
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<domain::tenant::TenantError> for CoreError {
    fn from(err: domain::tenant::TenantError) -> Self {
        match err {
            domain::tenant::TenantError::Core(ce) => ce,
            domain::tenant::TenantError::InvalidInput(msg) => CoreError::Validation(msg),
            domain::tenant::TenantError::UnknownStatus(s) => {
                CoreError::Internal(format!("Unknown subscription status: {}", s))
            }
        }
    }
}

impl From<domain::user::UserError> for CoreError {
    fn from(err: domain::user::UserError) -> Self {
        match err {
            domain::user::UserError::Core(ce) => ce,
            domain::user::UserError::InvalidInput(msg) => CoreError::Validation(msg),
            domain::user::UserError::UnknownRole(r) => {
                CoreError::Internal(format!("Unknown role: {}", r))
            }
            // Keep generic for security
            domain::user::UserError::InvalidPassword => {
                CoreError::Unauthorized("Invalid credentials".into())
            }
            domain::user::UserError::Hashing(msg) => CoreError::Internal(msg),
        }
    }
}

impl From<domain::inventory::InventoryError> for CoreError {
    fn from(err: domain::inventory::InventoryError) -> Self {
        match err {
            domain::inventory::InventoryError::InvalidInput(msg) => CoreError::Validation(msg),
        }
    }
}

// Marker trait for commands
pub trait Command: Send + Sync + 'static {}

// Port for handling commands
pub trait CommandHandler<C: Command>: Send + Sync {
    type Output: Send;

    fn handle(&self, command: C) -> impl Future<Output = Result<Self::Output, CoreError>> + Send;
}

/// Port for tenants, their users and the billing audit log.
#[async_trait]
pub trait TenantRepository: Send + Sync {
    async fn slug_exists(&self, slug: &str) -> Result<bool, CoreError>;

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, CoreError>;

    async fn find_user(&self, user_id: Uuid) -> Result<Option<User>, CoreError>;

    /// Persist a freshly signed-up tenant together with its first user.
    /// Either both rows are stored or neither is.
    async fn create_tenant_with_owner(&self, tenant: &Tenant, owner: &User)
        -> Result<(), CoreError>;

    /// Store a user that does not belong to a new tenant (platform admins).
    async fn create_user(&self, user: &User) -> Result<(), CoreError>;

    async fn find_tenant(&self, tenant_id: Uuid) -> Result<Option<Tenant>, CoreError>;

    /// All tenants, newest first, with owner and product count.
    async fn list_tenants(&self) -> Result<Vec<TenantOverview>, CoreError>;

    /// Overwrite the subscription status. `payment_customer_id` is only
    /// written when `Some`. Returns the updated tenant.
    async fn set_subscription_status(
        &self,
        tenant_id: Uuid,
        status: SubscriptionStatus,
        payment_customer_id: Option<&str>,
    ) -> Result<Tenant, CoreError>;

    /// Append a billing record. Returns `false` when a record with the same
    /// external payment id already exists.
    async fn record_subscription(&self, record: &SubscriptionRecord) -> Result<bool, CoreError>;

    async fn list_subscriptions(&self, tenant_id: Uuid)
        -> Result<Vec<SubscriptionRecord>, CoreError>;

    /// Suspend every TRIAL tenant whose trial ended before `now`.
    /// Returns the ids of the tenants that were suspended.
    async fn expire_trials(&self, now: DateTime<Utc>) -> Result<Vec<Uuid>, CoreError>;
}

/// Port for tenant-owned products and batches. Every method is scoped: rows
/// belonging to another tenant behave exactly like missing rows.
#[async_trait]
pub trait InventoryRepository: Send + Sync {
    async fn list_products(&self, scope: &TenantScope)
        -> Result<Vec<ProductWithBatches>, CoreError>;

    async fn find_product(
        &self,
        scope: &TenantScope,
        product_id: Uuid,
    ) -> Result<Option<ProductWithBatches>, CoreError>;

    /// Create a product, optionally with its first batch, in one transaction.
    async fn create_product(
        &self,
        scope: &TenantScope,
        product: NewProduct,
        initial_batch: Option<NewBatch>,
    ) -> Result<ProductWithBatches, CoreError>;

    async fn update_product(
        &self,
        scope: &TenantScope,
        product_id: Uuid,
        changes: ProductChanges,
    ) -> Result<Product, CoreError>;

    /// Delete a product and all of its batches.
    async fn delete_product(&self, scope: &TenantScope, product_id: Uuid)
        -> Result<(), CoreError>;

    /// All batches of the tenant, soonest expiration first.
    async fn list_batches(&self, scope: &TenantScope) -> Result<Vec<BatchWithProduct>, CoreError>;

    async fn create_batch(
        &self,
        scope: &TenantScope,
        product_id: Uuid,
        batch: NewBatch,
    ) -> Result<Batch, CoreError>;

    async fn update_batch(
        &self,
        scope: &TenantScope,
        batch_id: Uuid,
        changes: BatchChanges,
    ) -> Result<Batch, CoreError>;

    async fn delete_batch(&self, scope: &TenantScope, batch_id: Uuid) -> Result<(), CoreError>;
}

// Port for caching data
#[async_trait]
pub trait Cache: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CoreError>;
    async fn set(&self, key: &str, value: &[u8], ttl_seconds: Option<u64>)
        -> Result<(), CoreError>;
    async fn delete(&self, key: &str) -> Result<(), CoreError>;

    /// Store `value` only when `key` is absent. Returns `true` if this call
    /// stored it.
    async fn set_if_absent(
        &self,
        key: &str,
        value: &[u8],
        ttl_seconds: Option<u64>,
    ) -> Result<bool, CoreError>;
}

/// Port for the hosted-checkout payment provider.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn create_checkout(&self, request: &CheckoutRequest)
        -> Result<CheckoutSession, CoreError>;

    /// Fetch the current state of the resource a notification points at.
    async fn fetch_event(
        &self,
        kind: NotificationKind,
        resource_id: &str,
    ) -> Result<ProviderEvent, CoreError>;
}
