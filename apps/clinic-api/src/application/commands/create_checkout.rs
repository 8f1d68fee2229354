use crate::AppState;
use crate::application::ApiError;
use crate::application::middleware::AuthenticatedUser;
use crate::config::AppConfig;
use axum::{
    Json,
    extract::{Extension, State},
    response::IntoResponse,
};
use core_lib::{
    CommandHandler, CoreError, PaymentGateway, TenantRepository,
    domain::billing::{CheckoutRequest, CheckoutSession, CreateCheckout},
};
use std::sync::Arc;
use tracing::info;

pub const WEBHOOK_PATH: &str = "/api/webhooks/mercadopago";

pub struct CreateCheckoutHandler {
    tenants: Arc<dyn TenantRepository>,
    payments: Arc<dyn PaymentGateway>,
    config: Arc<AppConfig>,
}

impl CreateCheckoutHandler {
    pub fn new(
        tenants: Arc<dyn TenantRepository>,
        payments: Arc<dyn PaymentGateway>,
        config: Arc<AppConfig>,
    ) -> Self {
        Self {
            tenants,
            payments,
            config,
        }
    }
}

impl CommandHandler<CreateCheckout> for CreateCheckoutHandler {
    type Output = CheckoutSession;

    async fn handle(&self, command: CreateCheckout) -> Result<CheckoutSession, CoreError> {
        let tenant = self
            .tenants
            .find_tenant(command.tenant_id)
            .await?
            .ok_or_else(|| CoreError::NotFound("Tenant".into()))?;
        let payer = self
            .tenants
            .find_user(command.user_id)
            .await?
            .ok_or_else(|| CoreError::NotFound("User".into()))?;

        let base = &self.config.app_base_url;
        let request = CheckoutRequest {
            tenant_id: tenant.id,
            title: self.config.plan_title.clone(),
            description: format!("Monthly subscription for {}", tenant.name),
            unit_price: self.config.plan_price,
            payer_email: payer.email().to_string(),
            payer_name: payer.name().map(str::to_string),
            success_url: format!("{}/payment-success", base),
            failure_url: format!("{}/payment-required", base),
            pending_url: format!("{}/payment-required", base),
            notification_url: format!("{}{}", base, WEBHOOK_PATH),
        };

        let session = self.payments.create_checkout(&request).await?;
        info!(
            tenant_id = %tenant.id,
            preference_id = %session.preference_id,
            "Checkout created"
        );
        Ok(session)
    }
}

// --- Axum Route Handler ---

pub async fn handle_create_checkout(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
) -> Result<impl IntoResponse, ApiError> {
    let scope = user.scope()?;
    let handler = CreateCheckoutHandler::new(
        state.tenants.clone(),
        state.payments.clone(),
        state.config.clone(),
    );
    let session = handler
        .handle(CreateCheckout {
            tenant_id: scope.tenant_id(),
            user_id: user.user_id,
        })
        .await?;
    Ok(Json(session))
}
