use crate::AppState;
use crate::application::ApiError;
use crate::application::extract::{ApiJson, ApiPath};
use crate::application::middleware::AuthenticatedUser;
use axum::{
    Json,
    extract::{Extension, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::{DateTime, NaiveDate, Utc};
use core_lib::domain::inventory::{
    Batch, BatchChanges, BatchWithProduct, ExpiryStatus, NewBatch, ProductSummary,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::info;
use uuid::Uuid;

// --- Views ---

/// A batch with its derived cost and expiry classification.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchView {
    #[serde(flatten)]
    pub batch: Batch,
    pub total_cost: Option<Decimal>,
    pub days_remaining: i64,
    pub expiry_status: ExpiryStatus,
    pub expiry_status_label: &'static str,
}

impl BatchView {
    pub fn at(batch: Batch, now: DateTime<Utc>) -> Self {
        let expiry_status = batch.expiry_status(now);
        Self {
            total_cost: batch.total_cost(),
            days_remaining: batch.days_remaining(now),
            expiry_status,
            expiry_status_label: expiry_status.label(),
            batch,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct BatchWithProductView {
    #[serde(flatten)]
    pub batch: BatchView,
    pub product: ProductSummary,
}

/// `YYYY-MM-DD` (midnight UTC) or a full RFC 3339 timestamp.
pub fn parse_expiration(raw: &str) -> Result<DateTime<Utc>, ApiError> {
    let raw = raw.trim();
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        if let Some(midnight) = date.and_hms_opt(0, 0, 0) {
            return Ok(midnight.and_utc());
        }
    }
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| ApiError::BadRequest(format!("Invalid expiration date: {}", raw)))
}

// --- DTOs ---

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct CreateBatchDto {
    product_id: Option<Uuid>,
    quantity: Option<i32>,
    expiration_date: Option<String>,
    lot_code: Option<String>,
    unit_cost: Option<Decimal>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct UpdateBatchDto {
    quantity: Option<i32>,
    expiration_date: Option<String>,
    lot_code: Option<String>,
    unit_cost: Option<Decimal>,
}

// --- Axum Route Handlers ---

pub async fn handle_list_batches(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
) -> Result<impl IntoResponse, ApiError> {
    let scope = user.scope()?;
    let now = Utc::now();
    let batches: Vec<BatchWithProductView> = state
        .inventory
        .list_batches(&scope)
        .await?
        .into_iter()
        .map(|BatchWithProduct { batch, product }| BatchWithProductView {
            batch: BatchView::at(batch, now),
            product,
        })
        .collect();
    Ok(Json(batches))
}

pub async fn handle_create_batch(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    ApiJson(payload): ApiJson<CreateBatchDto>,
) -> Result<impl IntoResponse, ApiError> {
    let scope = user.scope()?;
    let (Some(product_id), Some(quantity), Some(expiration)) =
        (payload.product_id, payload.quantity, payload.expiration_date.as_deref())
    else {
        return Err(ApiError::BadRequest(
            "productId, quantity and expirationDate are required".into(),
        ));
    };

    let batch = state
        .inventory
        .create_batch(
            &scope,
            product_id,
            NewBatch {
                quantity,
                expiration_date: parse_expiration(expiration)?,
                lot_code: payload.lot_code,
                unit_cost: payload.unit_cost,
            },
        )
        .await?;
    info!(tenant_id = %scope.tenant_id(), batch_id = %batch.id, %product_id, "Batch created");
    Ok((StatusCode::CREATED, Json(BatchView::at(batch, Utc::now()))))
}

pub async fn handle_update_batch(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    ApiPath(batch_id): ApiPath<Uuid>,
    ApiJson(payload): ApiJson<UpdateBatchDto>,
) -> Result<impl IntoResponse, ApiError> {
    let scope = user.scope()?;
    let expiration_date = payload
        .expiration_date
        .as_deref()
        .map(parse_expiration)
        .transpose()?;

    let batch = state
        .inventory
        .update_batch(
            &scope,
            batch_id,
            BatchChanges {
                quantity: payload.quantity,
                expiration_date,
                lot_code: payload.lot_code,
                unit_cost: payload.unit_cost,
            },
        )
        .await?;
    Ok(Json(BatchView::at(batch, Utc::now())))
}

pub async fn handle_delete_batch(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    ApiPath(batch_id): ApiPath<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let scope = user.scope()?;
    state.inventory.delete_batch(&scope, batch_id).await?;
    info!(tenant_id = %scope.tenant_id(), %batch_id, "Batch deleted");
    Ok(Json(json!({ "success": true })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    #[test]
    fn test_parse_expiration_formats() {
        assert_eq!(
            parse_expiration("2026-03-01").unwrap(),
            Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).unwrap()
        );
        assert_eq!(
            parse_expiration("2026-03-01T12:30:00-03:00").unwrap(),
            Utc.with_ymd_and_hms(2026, 3, 1, 15, 30, 0).unwrap()
        );
        assert!(parse_expiration("01/03/2026").is_err());
    }

    #[test]
    fn test_view_derives_cost_and_status() {
        let now = Utc::now();
        let batch = Batch {
            id: Uuid::new_v4(),
            tenant_id: Uuid::new_v4(),
            product_id: Uuid::new_v4(),
            lot_code: None,
            quantity: 4,
            expiration_date: now + Duration::days(30),
            unit_cost: Some(Decimal::new(250, 2)),
            created_at: now,
        };
        let view = BatchView::at(batch, now);
        assert_eq!(view.total_cost, Some(Decimal::new(1000, 2)));
        assert_eq!(view.days_remaining, 30);
        assert_eq!(view.expiry_status, ExpiryStatus::Critical);

        let json = serde_json::to_value(&view).unwrap();
        assert_eq!(json["expiryStatus"], "CRITICAL");
        assert_eq!(json["expiryStatusLabel"], "Crítico");
        assert_eq!(json["quantity"], 4);
    }
}
