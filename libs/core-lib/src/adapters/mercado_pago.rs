use crate::domain::billing::{CheckoutRequest, CheckoutSession, NotificationKind, ProviderEvent};
use crate::{CoreError, PaymentGateway};
use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::{error, info};

pub const DEFAULT_API_BASE_URL: &str = "https://api.mercadopago.com";

/// Mercado Pago REST client implementing the PaymentGateway port.
#[derive(Debug, Clone)]
pub struct MercadoPagoGateway {
    client: reqwest::Client,
    base_url: String,
    access_token: String,
}

#[derive(Debug, Deserialize)]
struct PreferenceResponse {
    id: String,
    init_point: String,
    sandbox_init_point: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Payer {
    id: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct PaymentResponse {
    id: serde_json::Value,
    status: String,
    external_reference: Option<String>,
    payer: Option<Payer>,
    transaction_amount: Option<Decimal>,
}

#[derive(Debug, Deserialize)]
struct PreapprovalResponse {
    id: serde_json::Value,
    status: String,
    external_reference: Option<String>,
    payer_id: Option<serde_json::Value>,
}

/// Provider ids arrive as either JSON numbers or strings.
fn id_string(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

impl MercadoPagoGateway {
    pub fn new(base_url: &str, access_token: &str) -> Result<Self, CoreError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .map_err(|e| CoreError::Configuration(format!("HTTP client: {}", e)))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            access_token: access_token.to_string(),
        })
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, path: &str) -> Result<T, CoreError> {
        let url = format!("{}{}", self.base_url, path);
        let response = self
            .client
            .get(&url)
            .bearer_auth(&self.access_token)
            .send()
            .await
            .map_err(|e| CoreError::Upstream(format!("GET {}: {}", path, e)))?;

        if !response.status().is_success() {
            let status = response.status();
            error!(%status, path, "Mercado Pago request failed");
            return Err(CoreError::Upstream(format!("GET {} returned {}", path, status)));
        }
        response
            .json::<T>()
            .await
            .map_err(|e| CoreError::Upstream(format!("GET {}: invalid body: {}", path, e)))
    }
}

#[async_trait]
impl PaymentGateway for MercadoPagoGateway {
    async fn create_checkout(&self, request: &CheckoutRequest) -> Result<CheckoutSession, CoreError> {
        let body = json!({
            "items": [{
                "title": request.title,
                "description": request.description,
                "quantity": 1,
                "currency_id": "BRL",
                "unit_price": request.unit_price,
            }],
            "payer": {
                "email": request.payer_email,
                "name": request.payer_name,
            },
            "external_reference": request.tenant_id.to_string(),
            "back_urls": {
                "success": request.success_url,
                "failure": request.failure_url,
                "pending": request.pending_url,
            },
            "auto_return": "approved",
            "notification_url": request.notification_url,
        });

        let response = self
            .client
            .post(format!("{}/checkout/preferences", self.base_url))
            .bearer_auth(&self.access_token)
            .json(&body)
            .send()
            .await
            .map_err(|e| CoreError::Upstream(format!("create preference: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let detail = response.text().await.unwrap_or_default();
            error!(%status, %detail, "Mercado Pago rejected checkout preference");
            return Err(CoreError::Upstream(format!("create preference returned {}", status)));
        }

        let preference: PreferenceResponse = response
            .json()
            .await
            .map_err(|e| CoreError::Upstream(format!("create preference: invalid body: {}", e)))?;
        info!(preference_id = %preference.id, tenant_id = %request.tenant_id, "Checkout preference created");

        Ok(CheckoutSession {
            checkout_url: preference.init_point,
            sandbox_url: preference.sandbox_init_point,
            preference_id: preference.id,
        })
    }

    async fn fetch_event(&self, kind: NotificationKind, resource_id: &str) -> Result<ProviderEvent, CoreError> {
        match kind {
            NotificationKind::Payment => {
                let payment: PaymentResponse =
                    self.get_json(&format!("/v1/payments/{}", resource_id)).await?;
                Ok(ProviderEvent {
                    kind,
                    resource_id: id_string(&payment.id),
                    status: payment.status,
                    external_reference: payment.external_reference,
                    payer_id: payment.payer.and_then(|p| p.id).map(|id| id_string(&id)),
                    amount: payment.transaction_amount,
                })
            }
            NotificationKind::Preapproval => {
                let preapproval: PreapprovalResponse =
                    self.get_json(&format!("/preapproval/{}", resource_id)).await?;
                Ok(ProviderEvent {
                    kind,
                    resource_id: id_string(&preapproval.id),
                    status: preapproval.status,
                    external_reference: preapproval.external_reference,
                    payer_id: preapproval.payer_id.map(|id| id_string(&id)),
                    amount: None,
                })
            }
        }
    }
}
