use axum::{
    Json,
    body::Bytes,
    extract::{Query, State},
    http::HeaderMap,
    response::IntoResponse,
};
use core_lib::{
    CommandHandler,
    domain::billing::{ProcessNotification, verify_signature},
};
use serde::Deserialize;
use serde_json::json;
use std::collections::HashMap;
use tracing::{info, warn};

use super::ApiError;
use super::commands::ProcessNotificationHandler;
use crate::AppState;

pub const SIGNATURE_HEADER: &str = "x-signature";
pub const REQUEST_ID_HEADER: &str = "x-request-id";

#[derive(Debug, Default, Deserialize)]
struct NotificationData {
    id: Option<serde_json::Value>,
}

#[derive(Debug, Default, Deserialize)]
struct NotificationBody {
    #[serde(rename = "type")]
    kind: Option<String>,
    topic: Option<String>,
    data: Option<NotificationData>,
}

/// Type and resource id. The type comes from the body, then the query
/// (`type`/`topic`). The id prefers the signed `data.id` query parameter,
/// then the body's `data.id`, then a legacy `id` parameter.
fn notification_target(body: &[u8], query: &HashMap<String, String>) -> (Option<String>, Option<String>) {
    let parsed: NotificationBody = serde_json::from_slice(body).unwrap_or_default();

    let kind = parsed
        .kind
        .or(parsed.topic)
        .or_else(|| query.get("type").cloned())
        .or_else(|| query.get("topic").cloned());

    let body_id = parsed.data.and_then(|d| d.id).map(|id| match id {
        serde_json::Value::String(s) => s,
        other => other.to_string(),
    });
    let resource_id = query
        .get("data.id")
        .cloned()
        .or(body_id)
        .or_else(|| query.get("id").cloned());

    (kind, resource_id)
}

// GET /api/webhooks/mercadopago
pub async fn handle_webhook_status() -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "message": "Mercado Pago webhook endpoint is active",
    }))
}

// POST /api/webhooks/mercadopago
pub async fn handle_webhook(
    State(app_state): State<AppState>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    let (kind, resource_id) = notification_target(&body, &query);
    let Some(kind) = kind else {
        info!("Webhook without a notification type; acknowledging");
        return Ok(Json(json!({ "received": true, "outcome": "ignored" })));
    };
    let resource_id = resource_id.unwrap_or_default();

    if let Some(secret) = app_state.config.mp_webhook_secret.as_deref() {
        let header = |name: &str| headers.get(name).and_then(|v| v.to_str().ok());
        // The provider signs the `data.id` of the notification URL, not the body.
        let signed_id = query.get("data.id").map(String::as_str);
        let verified = header(SIGNATURE_HEADER).is_some_and(|signature| {
            verify_signature(secret, signature, header(REQUEST_ID_HEADER), signed_id)
        });
        if !verified {
            warn!(%kind, %resource_id, "Webhook signature verification failed");
            return Err(ApiError::Unauthorized);
        }
    }

    let handler = ProcessNotificationHandler::new(
        app_state.tenants.clone(),
        app_state.payments.clone(),
        app_state.cache.clone(),
    );
    let outcome = handler
        .handle(ProcessNotification { kind, resource_id })
        .await?;
    Ok(Json(json!({ "received": true, "outcome": outcome })))
}
