use crate::AppState;
use crate::application::ApiError;
use crate::application::extract::{ApiJson, ApiPath};
use crate::application::batches::{BatchView, parse_expiration};
use crate::application::middleware::AuthenticatedUser;
use axum::{
    Json,
    extract::{Extension, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::{DateTime, Utc};
use core_lib::{
    CoreError,
    domain::inventory::{NewBatch, NewProduct, Product, ProductChanges, ProductWithBatches, StockStatus},
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::info;
use uuid::Uuid;

/// A product with its batches and derived stock figures.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductView {
    #[serde(flatten)]
    pub product: Product,
    pub batches: Vec<BatchView>,
    pub total_quantity: i64,
    pub stock_status: StockStatus,
    pub stock_status_label: &'static str,
}

impl ProductView {
    pub fn at(item: ProductWithBatches, now: DateTime<Utc>) -> Self {
        let total_quantity = item.total_quantity();
        let stock_status = item.stock_status();
        Self {
            product: item.product,
            batches: item
                .batches
                .into_iter()
                .map(|b| BatchView::at(b, now))
                .collect(),
            total_quantity,
            stock_status,
            stock_status_label: stock_status.label(),
        }
    }
}

// --- DTOs ---

/// Product fields plus an optional first batch.
#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct CreateProductDto {
    name: Option<String>,
    description: Option<String>,
    sku: Option<String>,
    category: Option<String>,
    unit: Option<String>,
    price: Option<Decimal>,
    min_stock_level: Option<i32>,
    image_url: Option<String>,
    quantity: Option<i32>,
    expiration_date: Option<String>,
    lot_code: Option<String>,
    unit_cost: Option<Decimal>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct UpdateProductDto {
    name: Option<String>,
    description: Option<String>,
    sku: Option<String>,
    category: Option<String>,
    unit: Option<String>,
    price: Option<Decimal>,
    min_stock_level: Option<i32>,
    image_url: Option<String>,
}

impl CreateProductDto {
    fn into_parts(self) -> Result<(NewProduct, Option<NewBatch>), ApiError> {
        let (Some(name), Some(price)) = (self.name, self.price) else {
            return Err(ApiError::BadRequest("Name and price are required".into()));
        };

        let initial_batch = match (self.quantity, self.expiration_date.as_deref()) {
            (Some(quantity), Some(expiration)) if quantity > 0 => Some(NewBatch {
                quantity,
                expiration_date: parse_expiration(expiration)?,
                lot_code: self.lot_code,
                unit_cost: self.unit_cost,
            }),
            _ => None,
        };

        let product = NewProduct {
            name,
            description: self.description,
            sku: self.sku,
            category: self.category,
            unit: self.unit,
            price,
            min_stock_level: self.min_stock_level,
            image_url: self.image_url,
        };
        Ok((product, initial_batch))
    }
}

// --- Axum Route Handlers ---

pub async fn handle_list_products(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
) -> Result<impl IntoResponse, ApiError> {
    let scope = user.scope()?;
    let now = Utc::now();
    let products: Vec<ProductView> = state
        .inventory
        .list_products(&scope)
        .await?
        .into_iter()
        .map(|p| ProductView::at(p, now))
        .collect();
    Ok(Json(products))
}

pub async fn handle_create_product(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    ApiJson(payload): ApiJson<CreateProductDto>,
) -> Result<impl IntoResponse, ApiError> {
    let scope = user.scope()?;
    let (product, initial_batch) = payload.into_parts()?;
    let created = state
        .inventory
        .create_product(&scope, product, initial_batch)
        .await?;
    info!(
        tenant_id = %scope.tenant_id(),
        product_id = %created.product.id,
        batches = created.batches.len(),
        "Product created"
    );
    Ok((StatusCode::CREATED, Json(ProductView::at(created, Utc::now()))))
}

pub async fn handle_get_product(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    ApiPath(product_id): ApiPath<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let scope = user.scope()?;
    let product = state
        .inventory
        .find_product(&scope, product_id)
        .await?
        .ok_or_else(|| CoreError::NotFound("Product".into()))?;
    Ok(Json(ProductView::at(product, Utc::now())))
}

pub async fn handle_update_product(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    ApiPath(product_id): ApiPath<Uuid>,
    ApiJson(payload): ApiJson<UpdateProductDto>,
) -> Result<impl IntoResponse, ApiError> {
    let scope = user.scope()?;
    let changes = ProductChanges {
        name: payload.name,
        description: payload.description,
        sku: payload.sku,
        category: payload.category,
        unit: payload.unit,
        price: payload.price,
        min_stock_level: payload.min_stock_level,
        image_url: payload.image_url,
    };
    state
        .inventory
        .update_product(&scope, product_id, changes)
        .await?;

    let product = state
        .inventory
        .find_product(&scope, product_id)
        .await?
        .ok_or_else(|| CoreError::NotFound("Product".into()))?;
    Ok(Json(ProductView::at(product, Utc::now())))
}

pub async fn handle_delete_product(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    ApiPath(product_id): ApiPath<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let scope = user.scope()?;
    state.inventory.delete_product(&scope, product_id).await?;
    info!(tenant_id = %scope.tenant_id(), %product_id, "Product deleted");
    Ok(Json(json!({ "success": true })))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dto(body: serde_json::Value) -> CreateProductDto {
        serde_json::from_value(body).unwrap()
    }

    #[test]
    fn test_name_and_price_are_required() {
        let result = dto(json!({ "name": "Botox" })).into_parts();
        assert!(matches!(result, Err(ApiError::BadRequest(_))));
    }

    #[test]
    fn test_initial_batch_needs_quantity_and_date() {
        let (_, batch) = dto(json!({ "name": "Botox", "price": 10.0, "quantity": 3 }))
            .into_parts()
            .unwrap();
        assert!(batch.is_none());

        let (_, batch) = dto(json!({
            "name": "Botox",
            "price": 10.0,
            "quantity": 0,
            "expirationDate": "2030-01-01"
        }))
        .into_parts()
        .unwrap();
        assert!(batch.is_none());

        let (product, batch) = dto(json!({
            "name": "Botox",
            "price": 10.0,
            "quantity": 3,
            "expirationDate": "2030-01-01",
            "lotCode": "L-1"
        }))
        .into_parts()
        .unwrap();
        assert_eq!(product.name, "Botox");
        let batch = batch.unwrap();
        assert_eq!(batch.quantity, 3);
        assert_eq!(batch.lot_code.as_deref(), Some("L-1"));
    }
}
