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
use rust_decimal::Decimal;
use sqlx::{PgPool, Postgres, Transaction};
use std::collections::HashMap;
use uuid::Uuid;

/// Unique violations become `AlreadyExists` keyed by the constraint;
/// everything else is an infrastructure failure.
fn map_sqlx_error(err: sqlx::Error) -> CoreError {
    if let Some(db_err) = err.as_database_error() {
        if db_err.is_unique_violation() {
            let conflict = match db_err.constraint() {
                Some("tenants_slug_key") => Conflict::Slug,
                Some("users_email_key") => Conflict::Email,
                other => Conflict::Record(other.unwrap_or("record").to_string()),
            };
            return CoreError::AlreadyExists(conflict);
        }
    }
    CoreError::Infrastructure(Box::new(err))
}

// --- Row types ---

#[derive(sqlx::FromRow, Debug)]
struct TenantRow {
    id: Uuid,
    name: String,
    slug: String,
    subscription_status: String,
    trial_ends_at: Option<DateTime<Utc>>,
    payment_customer_id: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<TenantRow> for Tenant {
    type Error = CoreError;

    fn try_from(row: TenantRow) -> Result<Self, Self::Error> {
        Ok(Tenant {
            id: row.id,
            name: row.name,
            slug: row.slug,
            subscription_status: row.subscription_status.parse()?,
            trial_ends_at: row.trial_ends_at,
            payment_customer_id: row.payment_customer_id,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(sqlx::FromRow, Debug)]
struct TenantOverviewRow {
    #[sqlx(flatten)]
    tenant: TenantRow,
    owner_name: Option<String>,
    owner_email: Option<String>,
    product_count: i64,
}

#[derive(sqlx::FromRow, Debug)]
struct UserRow {
    id: Uuid,
    name: Option<String>,
    email: String,
    password_hash: String,
    role: String,
    tenant_id: Option<Uuid>,
    created_at: DateTime<Utc>,
}

impl TryFrom<UserRow> for User {
    type Error = CoreError;

    fn try_from(row: UserRow) -> Result<Self, Self::Error> {
        Ok(User::restore(
            row.id,
            row.name,
            row.email,
            row.password_hash,
            row.role.parse()?,
            row.tenant_id,
            row.created_at,
        )?)
    }
}

#[derive(sqlx::FromRow, Debug)]
struct ProductRow {
    id: Uuid,
    tenant_id: Uuid,
    name: String,
    description: Option<String>,
    sku: Option<String>,
    category: String,
    unit: String,
    price: Decimal,
    min_stock_level: i32,
    image_url: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<ProductRow> for Product {
    fn from(row: ProductRow) -> Self {
        Product {
            id: row.id,
            tenant_id: row.tenant_id,
            name: row.name,
            description: row.description,
            sku: row.sku,
            category: row.category,
            unit: row.unit,
            price: row.price,
            min_stock_level: row.min_stock_level,
            image_url: row.image_url,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(sqlx::FromRow, Debug)]
struct BatchRow {
    id: Uuid,
    tenant_id: Uuid,
    product_id: Uuid,
    lot_code: Option<String>,
    quantity: i32,
    expiration_date: DateTime<Utc>,
    unit_cost: Option<Decimal>,
    created_at: DateTime<Utc>,
}

impl From<BatchRow> for Batch {
    fn from(row: BatchRow) -> Self {
        Batch {
            id: row.id,
            tenant_id: row.tenant_id,
            product_id: row.product_id,
            lot_code: row.lot_code,
            quantity: row.quantity,
            expiration_date: row.expiration_date,
            unit_cost: row.unit_cost,
            created_at: row.created_at,
        }
    }
}

#[derive(sqlx::FromRow, Debug)]
struct BatchWithProductRow {
    #[sqlx(flatten)]
    batch: BatchRow,
    product_name: String,
    product_category: String,
}

#[derive(sqlx::FromRow, Debug)]
struct SubscriptionRow {
    id: Uuid,
    tenant_id: Uuid,
    external_payment_id: String,
    amount: Decimal,
    status: String,
    created_at: DateTime<Utc>,
}

impl From<SubscriptionRow> for SubscriptionRecord {
    fn from(row: SubscriptionRow) -> Self {
        SubscriptionRecord {
            id: row.id,
            tenant_id: row.tenant_id,
            external_payment_id: row.external_payment_id,
            amount: row.amount,
            status: row.status,
            created_at: row.created_at,
        }
    }
}

const TENANT_COLUMNS: &str = "id, name, slug, subscription_status, trial_ends_at, \
     payment_customer_id, created_at, updated_at";
const USER_COLUMNS: &str = "id, name, email, password_hash, role, tenant_id, created_at";
const PRODUCT_COLUMNS: &str = "id, tenant_id, name, description, sku, category, unit, price, \
     min_stock_level, image_url, created_at, updated_at";
const BATCH_COLUMNS: &str =
    "id, tenant_id, product_id, lot_code, quantity, expiration_date, unit_cost, created_at";

/// PostgreSQL implementation of both repository ports using sqlx.
#[derive(Debug, Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Apply the embedded schema migrations.
    pub async fn migrate(&self) -> Result<(), CoreError> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| CoreError::Infrastructure(Box::new(e)))
    }

    async fn begin(&self) -> Result<Transaction<'_, Postgres>, CoreError> {
        self.pool.begin().await.map_err(map_sqlx_error)
    }

    async fn insert_batch(tx: &mut Transaction<'_, Postgres>, batch: &Batch) -> Result<(), CoreError> {
        sqlx::query(
            "INSERT INTO batches (id, tenant_id, product_id, lot_code, quantity, expiration_date, unit_cost, created_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
        )
        .bind(batch.id)
        .bind(batch.tenant_id)
        .bind(batch.product_id)
        .bind(&batch.lot_code)
        .bind(batch.quantity)
        .bind(batch.expiration_date)
        .bind(batch.unit_cost)
        .bind(batch.created_at)
        .execute(&mut **tx)
        .await
        .map_err(map_sqlx_error)?;
        Ok(())
    }

    async fn batches_for_product(&self, scope: &TenantScope, product_id: Uuid) -> Result<Vec<Batch>, CoreError> {
        let query = format!(
            "SELECT {} FROM batches WHERE tenant_id = $1 AND product_id = $2 ORDER BY expiration_date ASC",
            BATCH_COLUMNS
        );
        let rows: Vec<BatchRow> = sqlx::query_as(&query)
            .bind(scope.tenant_id())
            .bind(product_id)
            .fetch_all(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        Ok(rows.into_iter().map(Batch::from).collect())
    }
}

#[async_trait]
impl TenantRepository for PostgresStore {
    async fn slug_exists(&self, slug: &str) -> Result<bool, CoreError> {
        sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM tenants WHERE slug = $1)")
            .bind(slug)
            .fetch_one(&self.pool)
            .await
            .map_err(map_sqlx_error)
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, CoreError> {
        let query = format!("SELECT {} FROM users WHERE email = $1", USER_COLUMNS);
        let row: Option<UserRow> = sqlx::query_as(&query)
            .bind(email.trim().to_lowercase())
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        row.map(User::try_from).transpose()
    }

    async fn find_user(&self, user_id: Uuid) -> Result<Option<User>, CoreError> {
        let query = format!("SELECT {} FROM users WHERE id = $1", USER_COLUMNS);
        let row: Option<UserRow> = sqlx::query_as(&query)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        row.map(User::try_from).transpose()
    }

    async fn create_tenant_with_owner(&self, tenant: &Tenant, owner: &User) -> Result<(), CoreError> {
        let mut tx = self.begin().await?;

        sqlx::query(
            "INSERT INTO tenants (id, name, slug, subscription_status, trial_ends_at, payment_customer_id, created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
        )
        .bind(tenant.id)
        .bind(&tenant.name)
        .bind(&tenant.slug)
        .bind(tenant.subscription_status.as_str())
        .bind(tenant.trial_ends_at)
        .bind(&tenant.payment_customer_id)
        .bind(tenant.created_at)
        .bind(tenant.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(map_sqlx_error)?;

        insert_user(&mut tx, owner).await?;

        // Dropping `tx` on an early return above rolls back the tenant insert.
        tx.commit().await.map_err(map_sqlx_error)
    }

    async fn create_user(&self, user: &User) -> Result<(), CoreError> {
        let mut tx = self.begin().await?;
        insert_user(&mut tx, user).await?;
        tx.commit().await.map_err(map_sqlx_error)
    }

    async fn find_tenant(&self, tenant_id: Uuid) -> Result<Option<Tenant>, CoreError> {
        let query = format!("SELECT {} FROM tenants WHERE id = $1", TENANT_COLUMNS);
        let row: Option<TenantRow> = sqlx::query_as(&query)
            .bind(tenant_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        row.map(Tenant::try_from).transpose()
    }

    async fn list_tenants(&self) -> Result<Vec<TenantOverview>, CoreError> {
        let rows: Vec<TenantOverviewRow> = sqlx::query_as(
            "SELECT t.id, t.name, t.slug, t.subscription_status, t.trial_ends_at,
                    t.payment_customer_id, t.created_at, t.updated_at,
                    owner.name AS owner_name,
                    owner.email AS owner_email,
                    (SELECT COUNT(*) FROM products p WHERE p.tenant_id = t.id) AS product_count
             FROM tenants t
             LEFT JOIN LATERAL (
                 SELECT u.name, u.email FROM users u
                 WHERE u.tenant_id = t.id
                 ORDER BY u.created_at ASC
                 LIMIT 1
             ) owner ON TRUE
             ORDER BY t.created_at DESC",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        rows.into_iter()
            .map(|row| {
                Ok(TenantOverview {
                    tenant: Tenant::try_from(row.tenant)?,
                    owner_name: row.owner_name,
                    owner_email: row.owner_email,
                    product_count: row.product_count,
                })
            })
            .collect()
    }

    async fn set_subscription_status(
        &self,
        tenant_id: Uuid,
        status: SubscriptionStatus,
        payment_customer_id: Option<&str>,
    ) -> Result<Tenant, CoreError> {
        let query = format!(
            "UPDATE tenants
             SET subscription_status = $2,
                 payment_customer_id = COALESCE($3, payment_customer_id),
                 updated_at = $4
             WHERE id = $1
             RETURNING {}",
            TENANT_COLUMNS
        );
        let row: Option<TenantRow> = sqlx::query_as(&query)
            .bind(tenant_id)
            .bind(status.as_str())
            .bind(payment_customer_id)
            .bind(Utc::now())
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        row.ok_or_else(|| CoreError::NotFound("Tenant".into()))?
            .try_into()
    }

    async fn record_subscription(&self, record: &SubscriptionRecord) -> Result<bool, CoreError> {
        let result = sqlx::query(
            "INSERT INTO subscriptions (id, tenant_id, external_payment_id, amount, status, created_at)
             VALUES ($1, $2, $3, $4, $5, $6)
             ON CONFLICT (external_payment_id) DO NOTHING",
        )
        .bind(record.id)
        .bind(record.tenant_id)
        .bind(&record.external_payment_id)
        .bind(record.amount)
        .bind(&record.status)
        .bind(record.created_at)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;
        Ok(result.rows_affected() == 1)
    }

    async fn list_subscriptions(&self, tenant_id: Uuid) -> Result<Vec<SubscriptionRecord>, CoreError> {
        let rows: Vec<SubscriptionRow> = sqlx::query_as(
            "SELECT id, tenant_id, external_payment_id, amount, status, created_at
             FROM subscriptions WHERE tenant_id = $1 ORDER BY created_at ASC",
        )
        .bind(tenant_id)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_error)?;
        Ok(rows.into_iter().map(SubscriptionRecord::from).collect())
    }

    async fn expire_trials(&self, now: DateTime<Utc>) -> Result<Vec<Uuid>, CoreError> {
        sqlx::query_scalar(
            "UPDATE tenants
             SET subscription_status = 'SUSPENDED', updated_at = $1
             WHERE subscription_status = 'TRIAL' AND trial_ends_at <= $1
             RETURNING id",
        )
        .bind(now)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_error)
    }
}

async fn insert_user(tx: &mut Transaction<'_, Postgres>, user: &User) -> Result<(), CoreError> {
    sqlx::query(
        "INSERT INTO users (id, name, email, password_hash, role, tenant_id, created_at)
         VALUES ($1, $2, $3, $4, $5, $6, $7)",
    )
    .bind(user.id())
    .bind(user.name())
    .bind(user.email())
    .bind(user.password_hash())
    .bind(user.role().as_str())
    .bind(user.tenant_id())
    .bind(user.created_at())
    .execute(&mut **tx)
    .await
    .map_err(map_sqlx_error)?;
    Ok(())
}

#[async_trait]
impl InventoryRepository for PostgresStore {
    async fn list_products(&self, scope: &TenantScope) -> Result<Vec<ProductWithBatches>, CoreError> {
        let query = format!(
            "SELECT {} FROM products WHERE tenant_id = $1 ORDER BY created_at DESC",
            PRODUCT_COLUMNS
        );
        let products: Vec<ProductRow> = sqlx::query_as(&query)
            .bind(scope.tenant_id())
            .fetch_all(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        let query = format!(
            "SELECT {} FROM batches WHERE tenant_id = $1 ORDER BY expiration_date ASC",
            BATCH_COLUMNS
        );
        let batch_rows: Vec<BatchRow> = sqlx::query_as(&query)
            .bind(scope.tenant_id())
            .fetch_all(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        let mut by_product: HashMap<Uuid, Vec<Batch>> = HashMap::new();
        for row in batch_rows {
            by_product.entry(row.product_id).or_default().push(row.into());
        }

        Ok(products
            .into_iter()
            .map(|row| {
                let product = Product::from(row);
                let batches = by_product.remove(&product.id).unwrap_or_default();
                ProductWithBatches { product, batches }
            })
            .collect())
    }

    async fn find_product(
        &self,
        scope: &TenantScope,
        product_id: Uuid,
    ) -> Result<Option<ProductWithBatches>, CoreError> {
        let query = format!(
            "SELECT {} FROM products WHERE id = $1 AND tenant_id = $2",
            PRODUCT_COLUMNS
        );
        let row: Option<ProductRow> = sqlx::query_as(&query)
            .bind(product_id)
            .bind(scope.tenant_id())
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        let Some(row) = row else {
            return Ok(None);
        };
        let batches = self.batches_for_product(scope, product_id).await?;
        Ok(Some(ProductWithBatches {
            product: row.into(),
            batches,
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

        let mut tx = self.begin().await?;
        sqlx::query(
            "INSERT INTO products (id, tenant_id, name, description, sku, category, unit, price, min_stock_level, image_url, created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)",
        )
        .bind(product.id)
        .bind(product.tenant_id)
        .bind(&product.name)
        .bind(&product.description)
        .bind(&product.sku)
        .bind(&product.category)
        .bind(&product.unit)
        .bind(product.price)
        .bind(product.min_stock_level)
        .bind(&product.image_url)
        .bind(product.created_at)
        .bind(product.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(map_sqlx_error)?;

        for batch in &batches {
            Self::insert_batch(&mut tx, batch).await?;
        }
        tx.commit().await.map_err(map_sqlx_error)?;

        Ok(ProductWithBatches { product, batches })
    }

    async fn update_product(
        &self,
        scope: &TenantScope,
        product_id: Uuid,
        changes: ProductChanges,
    ) -> Result<Product, CoreError> {
        let mut tx = self.begin().await?;

        let query = format!(
            "SELECT {} FROM products WHERE id = $1 AND tenant_id = $2 FOR UPDATE",
            PRODUCT_COLUMNS
        );
        let row: Option<ProductRow> = sqlx::query_as(&query)
            .bind(product_id)
            .bind(scope.tenant_id())
            .fetch_optional(&mut *tx)
            .await
            .map_err(map_sqlx_error)?;
        let mut product: Product = row
            .ok_or_else(|| CoreError::NotFound("Product".into()))?
            .into();

        changes.apply_to(&mut product, Utc::now())?;

        sqlx::query(
            "UPDATE products
             SET name = $3, description = $4, sku = $5, category = $6, unit = $7,
                 price = $8, min_stock_level = $9, image_url = $10, updated_at = $11
             WHERE id = $1 AND tenant_id = $2",
        )
        .bind(product.id)
        .bind(scope.tenant_id())
        .bind(&product.name)
        .bind(&product.description)
        .bind(&product.sku)
        .bind(&product.category)
        .bind(&product.unit)
        .bind(product.price)
        .bind(product.min_stock_level)
        .bind(&product.image_url)
        .bind(product.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(map_sqlx_error)?;

        tx.commit().await.map_err(map_sqlx_error)?;
        Ok(product)
    }

    async fn delete_product(&self, scope: &TenantScope, product_id: Uuid) -> Result<(), CoreError> {
        let mut tx = self.begin().await?;

        sqlx::query("DELETE FROM batches WHERE product_id = $1 AND tenant_id = $2")
            .bind(product_id)
            .bind(scope.tenant_id())
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx_error)?;

        let result = sqlx::query("DELETE FROM products WHERE id = $1 AND tenant_id = $2")
            .bind(product_id)
            .bind(scope.tenant_id())
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx_error)?;

        if result.rows_affected() == 0 {
            // Nothing of ours was touched; the rollback on drop is a no-op.
            return Err(CoreError::NotFound("Product".into()));
        }
        tx.commit().await.map_err(map_sqlx_error)
    }

    async fn list_batches(&self, scope: &TenantScope) -> Result<Vec<BatchWithProduct>, CoreError> {
        let rows: Vec<BatchWithProductRow> = sqlx::query_as(
            "SELECT b.id, b.tenant_id, b.product_id, b.lot_code, b.quantity, b.expiration_date,
                    b.unit_cost, b.created_at,
                    p.name AS product_name, p.category AS product_category
             FROM batches b
             JOIN products p ON p.id = b.product_id AND p.tenant_id = b.tenant_id
             WHERE b.tenant_id = $1
             ORDER BY b.expiration_date ASC",
        )
        .bind(scope.tenant_id())
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(rows
            .into_iter()
            .map(|row| {
                let product = ProductSummary {
                    id: row.batch.product_id,
                    name: row.product_name,
                    category: row.product_category,
                };
                BatchWithProduct {
                    batch: row.batch.into(),
                    product,
                }
            })
            .collect())
    }

    async fn create_batch(
        &self,
        scope: &TenantScope,
        product_id: Uuid,
        batch: NewBatch,
    ) -> Result<Batch, CoreError> {
        let mut tx = self.begin().await?;

        let owned: bool =
            sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM products WHERE id = $1 AND tenant_id = $2)")
                .bind(product_id)
                .bind(scope.tenant_id())
                .fetch_one(&mut *tx)
                .await
                .map_err(map_sqlx_error)?;
        if !owned {
            return Err(CoreError::NotFound("Product".into()));
        }

        let batch = batch.into_batch(scope.tenant_id(), product_id, Utc::now())?;
        Self::insert_batch(&mut tx, &batch).await?;
        tx.commit().await.map_err(map_sqlx_error)?;
        Ok(batch)
    }

    async fn update_batch(
        &self,
        scope: &TenantScope,
        batch_id: Uuid,
        changes: BatchChanges,
    ) -> Result<Batch, CoreError> {
        let mut tx = self.begin().await?;

        let query = format!(
            "SELECT {} FROM batches b
             WHERE b.id = $1 AND b.tenant_id = $2
               AND EXISTS (SELECT 1 FROM products p WHERE p.id = b.product_id AND p.tenant_id = $2)
             FOR UPDATE",
            BATCH_COLUMNS
        );
        let row: Option<BatchRow> = sqlx::query_as(&query)
            .bind(batch_id)
            .bind(scope.tenant_id())
            .fetch_optional(&mut *tx)
            .await
            .map_err(map_sqlx_error)?;
        let mut batch: Batch = row
            .ok_or_else(|| CoreError::NotFound("Batch".into()))?
            .into();

        changes.apply_to(&mut batch)?;

        sqlx::query(
            "UPDATE batches
             SET quantity = $3, expiration_date = $4, lot_code = $5, unit_cost = $6
             WHERE id = $1 AND tenant_id = $2",
        )
        .bind(batch.id)
        .bind(scope.tenant_id())
        .bind(batch.quantity)
        .bind(batch.expiration_date)
        .bind(&batch.lot_code)
        .bind(batch.unit_cost)
        .execute(&mut *tx)
        .await
        .map_err(map_sqlx_error)?;

        tx.commit().await.map_err(map_sqlx_error)?;
        Ok(batch)
    }

    async fn delete_batch(&self, scope: &TenantScope, batch_id: Uuid) -> Result<(), CoreError> {
        let result = sqlx::query(
            "DELETE FROM batches b
             WHERE b.id = $1 AND b.tenant_id = $2
               AND EXISTS (SELECT 1 FROM products p WHERE p.id = b.product_id AND p.tenant_id = $2)",
        )
        .bind(batch_id)
        .bind(scope.tenant_id())
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        if result.rows_affected() == 0 {
            return Err(CoreError::NotFound("Batch".into()));
        }
        Ok(())
    }
}
