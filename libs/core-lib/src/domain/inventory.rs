use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const DEFAULT_CATEGORY: &str = "Geral";
pub const DEFAULT_UNIT: &str = "unidade";
pub const DEFAULT_MIN_STOCK_LEVEL: i32 = 5;

/// Batches expiring within this many days are CRITICAL.
pub const CRITICAL_WINDOW_DAYS: i64 = 30;
/// Batches expiring within this many days (and not CRITICAL) are WARNING.
pub const WARNING_WINDOW_DAYS: i64 = 60;

const MILLIS_PER_DAY: i64 = 86_400_000;

// --- Stored records ---

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub sku: Option<String>,
    pub category: String,
    pub unit: String,
    pub price: Decimal,
    pub min_stock_level: i32,
    pub image_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Batch {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub product_id: Uuid,
    pub lot_code: Option<String>,
    pub quantity: i32,
    pub expiration_date: DateTime<Utc>,
    pub unit_cost: Option<Decimal>,
    pub created_at: DateTime<Utc>,
}

impl Batch {
    pub fn total_cost(&self) -> Option<Decimal> {
        self.unit_cost.map(|cost| cost * Decimal::from(self.quantity))
    }

    pub fn days_remaining(&self, now: DateTime<Utc>) -> i64 {
        days_until(self.expiration_date, now)
    }

    pub fn expiry_status(&self, now: DateTime<Utc>) -> ExpiryStatus {
        classify_expiry(self.days_remaining(now))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductWithBatches {
    #[serde(flatten)]
    pub product: Product,
    pub batches: Vec<Batch>,
}

impl ProductWithBatches {
    pub fn total_quantity(&self) -> i64 {
        self.batches.iter().map(|b| i64::from(b.quantity)).sum()
    }

    pub fn stock_status(&self) -> StockStatus {
        classify_stock(self.total_quantity(), self.product.min_stock_level)
    }

    pub fn stock_value(&self) -> Decimal {
        self.product.price * Decimal::from(self.total_quantity())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductSummary {
    pub id: Uuid,
    pub name: String,
    pub category: String,
}

impl From<&Product> for ProductSummary {
    fn from(product: &Product) -> Self {
        Self {
            id: product.id,
            name: product.name.clone(),
            category: product.category.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchWithProduct {
    #[serde(flatten)]
    pub batch: Batch,
    pub product: ProductSummary,
}

// --- Inputs ---

#[derive(Debug, Clone, Default)]
pub struct NewProduct {
    pub name: String,
    pub description: Option<String>,
    pub sku: Option<String>,
    pub category: Option<String>,
    pub unit: Option<String>,
    pub price: Decimal,
    pub min_stock_level: Option<i32>,
    pub image_url: Option<String>,
}

impl NewProduct {
    pub fn into_product(self, tenant_id: Uuid, now: DateTime<Utc>) -> Result<Product, InventoryError> {
        let name = required_text("Name", &self.name)?;
        validate_price(self.price)?;
        let min_stock_level = self.min_stock_level.unwrap_or(DEFAULT_MIN_STOCK_LEVEL);
        validate_min_stock(min_stock_level)?;

        Ok(Product {
            id: Uuid::new_v4(),
            tenant_id,
            name,
            description: non_blank(self.description),
            sku: non_blank(self.sku),
            category: non_blank(self.category).unwrap_or_else(|| DEFAULT_CATEGORY.to_string()),
            unit: non_blank(self.unit).unwrap_or_else(|| DEFAULT_UNIT.to_string()),
            price: self.price,
            min_stock_level,
            image_url: non_blank(self.image_url),
            created_at: now,
            updated_at: now,
        })
    }
}

#[derive(Debug, Clone)]
pub struct NewBatch {
    pub quantity: i32,
    pub expiration_date: DateTime<Utc>,
    pub lot_code: Option<String>,
    pub unit_cost: Option<Decimal>,
}

impl NewBatch {
    pub fn into_batch(
        self,
        tenant_id: Uuid,
        product_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Batch, InventoryError> {
        if self.quantity <= 0 {
            return Err(InventoryError::InvalidInput(
                "Quantity must be greater than zero".into(),
            ));
        }
        validate_unit_cost(self.unit_cost)?;

        Ok(Batch {
            id: Uuid::new_v4(),
            tenant_id,
            product_id,
            lot_code: non_blank(self.lot_code),
            quantity: self.quantity,
            expiration_date: self.expiration_date,
            unit_cost: self.unit_cost,
            created_at: now,
        })
    }
}

/// Partial product update. `None` leaves a field untouched.
#[derive(Debug, Clone, Default)]
pub struct ProductChanges {
    pub name: Option<String>,
    pub description: Option<String>,
    pub sku: Option<String>,
    pub category: Option<String>,
    pub unit: Option<String>,
    pub price: Option<Decimal>,
    pub min_stock_level: Option<i32>,
    pub image_url: Option<String>,
}

impl ProductChanges {
    pub fn apply_to(self, product: &mut Product, now: DateTime<Utc>) -> Result<(), InventoryError> {
        if let Some(name) = self.name {
            product.name = required_text("Name", &name)?;
        }
        if let Some(price) = self.price {
            validate_price(price)?;
            product.price = price;
        }
        if let Some(level) = self.min_stock_level {
            validate_min_stock(level)?;
            product.min_stock_level = level;
        }
        if let Some(category) = self.category {
            product.category = required_text("Category", &category)?;
        }
        if let Some(unit) = self.unit {
            product.unit = required_text("Unit", &unit)?;
        }
        if self.description.is_some() {
            product.description = non_blank(self.description);
        }
        if self.sku.is_some() {
            product.sku = non_blank(self.sku);
        }
        if self.image_url.is_some() {
            product.image_url = non_blank(self.image_url);
        }
        product.updated_at = now;
        Ok(())
    }
}

/// Partial batch update. Quantity may drop to zero here, unlike on creation.
#[derive(Debug, Clone, Default)]
pub struct BatchChanges {
    pub quantity: Option<i32>,
    pub expiration_date: Option<DateTime<Utc>>,
    pub lot_code: Option<String>,
    pub unit_cost: Option<Decimal>,
}

impl BatchChanges {
    pub fn apply_to(self, batch: &mut Batch) -> Result<(), InventoryError> {
        if let Some(quantity) = self.quantity {
            if quantity < 0 {
                return Err(InventoryError::InvalidInput(
                    "Quantity cannot be negative".into(),
                ));
            }
            batch.quantity = quantity;
        }
        if let Some(date) = self.expiration_date {
            batch.expiration_date = date;
        }
        if self.lot_code.is_some() {
            batch.lot_code = non_blank(self.lot_code);
        }
        if self.unit_cost.is_some() {
            validate_unit_cost(self.unit_cost)?;
            batch.unit_cost = self.unit_cost;
        }
        Ok(())
    }
}

fn required_text(field: &str, value: &str) -> Result<String, InventoryError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(InventoryError::InvalidInput(format!(
            "{} cannot be empty",
            field
        )));
    }
    Ok(value.to_string())
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn validate_price(price: Decimal) -> Result<(), InventoryError> {
    if price.is_sign_negative() && !price.is_zero() {
        return Err(InventoryError::InvalidInput("Price cannot be negative".into()));
    }
    Ok(())
}

fn validate_unit_cost(cost: Option<Decimal>) -> Result<(), InventoryError> {
    match cost {
        Some(c) if c.is_sign_negative() && !c.is_zero() => Err(InventoryError::InvalidInput(
            "Unit cost cannot be negative".into(),
        )),
        _ => Ok(()),
    }
}

fn validate_min_stock(level: i32) -> Result<(), InventoryError> {
    if level < 0 {
        return Err(InventoryError::InvalidInput(
            "Minimum stock level cannot be negative".into(),
        ));
    }
    Ok(())
}

// --- Classification ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StockStatus {
    None,
    Low,
    Normal,
}

impl StockStatus {
    pub fn label(&self) -> &'static str {
        match self {
            StockStatus::None => "Sem Estoque",
            StockStatus::Low => "Baixo Estoque",
            StockStatus::Normal => "Normal",
        }
    }
}

/// An empty product is NONE whatever its minimum level.
pub fn classify_stock(total_quantity: i64, min_stock_level: i32) -> StockStatus {
    if total_quantity <= 0 {
        StockStatus::None
    } else if total_quantity <= i64::from(min_stock_level) {
        StockStatus::Low
    } else {
        StockStatus::Normal
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExpiryStatus {
    Expired,
    Critical,
    Warning,
    Ok,
}

impl ExpiryStatus {
    pub fn label(&self) -> &'static str {
        match self {
            ExpiryStatus::Expired => "Vencido",
            ExpiryStatus::Critical => "Crítico",
            ExpiryStatus::Warning => "Atenção",
            ExpiryStatus::Ok => "OK",
        }
    }
}

/// Whole days until `expiration`, rounded up. Negative once it has passed.
pub fn days_until(expiration: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    let millis = (expiration - now).num_milliseconds();
    let days = millis.div_euclid(MILLIS_PER_DAY);
    if millis.rem_euclid(MILLIS_PER_DAY) == 0 {
        days
    } else {
        days + 1
    }
}

pub fn classify_expiry(days_remaining: i64) -> ExpiryStatus {
    if days_remaining < 0 {
        ExpiryStatus::Expired
    } else if days_remaining <= CRITICAL_WINDOW_DAYS {
        ExpiryStatus::Critical
    } else if days_remaining <= WARNING_WINDOW_DAYS {
        ExpiryStatus::Warning
    } else {
        ExpiryStatus::Ok
    }
}

// --- Dashboard summary ---

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryValue {
    pub category: String,
    pub value: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InventorySummary {
    pub product_count: usize,
    pub total_value: Decimal,
    pub low_stock_count: usize,
    pub out_of_stock_count: usize,
    pub expiring_soon_count: usize,
    pub expired_count: usize,
    pub total_batches: usize,
    pub category_values: Vec<CategoryValue>,
}

impl InventorySummary {
    pub fn compute(products: &[ProductWithBatches], now: DateTime<Utc>) -> Self {
        let mut summary = InventorySummary {
            product_count: products.len(),
            total_value: Decimal::ZERO,
            low_stock_count: 0,
            out_of_stock_count: 0,
            expiring_soon_count: 0,
            expired_count: 0,
            total_batches: 0,
            category_values: Vec::new(),
        };

        for item in products {
            let value = item.stock_value();
            summary.total_value += value;

            match item.stock_status() {
                StockStatus::None => {
                    summary.low_stock_count += 1;
                    summary.out_of_stock_count += 1;
                }
                StockStatus::Low => summary.low_stock_count += 1,
                StockStatus::Normal => {}
            }

            for batch in &item.batches {
                summary.total_batches += 1;
                match batch.expiry_status(now) {
                    ExpiryStatus::Expired => summary.expired_count += 1,
                    ExpiryStatus::Critical | ExpiryStatus::Warning => {
                        summary.expiring_soon_count += 1
                    }
                    ExpiryStatus::Ok => {}
                }
            }

            if value > Decimal::ZERO {
                match summary
                    .category_values
                    .iter_mut()
                    .find(|c| c.category == item.product.category)
                {
                    Some(entry) => entry.value += value,
                    None => summary.category_values.push(CategoryValue {
                        category: item.product.category.clone(),
                        value,
                    }),
                }
            }
        }

        summary
    }
}

// --- Errors ---

#[derive(thiserror::Error, Debug)]
pub enum InventoryError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}
