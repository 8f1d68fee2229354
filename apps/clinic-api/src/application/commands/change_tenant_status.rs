use crate::AppState;
use crate::application::ApiError;
use crate::application::extract::ApiPath;
use axum::{
    Json,
    extract::State,
    response::IntoResponse,
};
use core_lib::{
    CommandHandler, CoreError, TenantRepository,
    domain::tenant::{ChangeTenantStatus, StatusTrigger, Tenant},
};
use serde_json::json;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

/// Applies a trigger to a tenant's subscription state.
pub struct ChangeTenantStatusHandler {
    tenants: Arc<dyn TenantRepository>,
}

impl ChangeTenantStatusHandler {
    pub fn new(tenants: Arc<dyn TenantRepository>) -> Self {
        Self { tenants }
    }
}

impl CommandHandler<ChangeTenantStatus> for ChangeTenantStatusHandler {
    type Output = Tenant;

    async fn handle(&self, command: ChangeTenantStatus) -> Result<Tenant, CoreError> {
        let tenant = self
            .tenants
            .find_tenant(command.tenant_id)
            .await?
            .ok_or_else(|| CoreError::NotFound("Tenant".into()))?;

        let next = tenant.subscription_status.on(command.trigger);
        if next == tenant.subscription_status {
            return Ok(tenant);
        }

        let updated = self
            .tenants
            .set_subscription_status(tenant.id, next, None)
            .await?;
        info!(
            tenant_id = %tenant.id,
            from = %tenant.subscription_status,
            to = %next,
            trigger = ?command.trigger,
            "Subscription status changed"
        );
        Ok(updated)
    }
}

// --- Axum Route Handlers ---

async fn change_status(
    state: AppState,
    tenant_id: Uuid,
    trigger: StatusTrigger,
) -> Result<impl IntoResponse, ApiError> {
    let handler = ChangeTenantStatusHandler::new(state.tenants.clone());
    let tenant = handler
        .handle(ChangeTenantStatus { tenant_id, trigger })
        .await?;
    Ok(Json(json!({ "success": true, "tenant": tenant })))
}

pub async fn handle_approve_tenant(
    State(state): State<AppState>,
    ApiPath(tenant_id): ApiPath<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    change_status(state, tenant_id, StatusTrigger::AdminApproved).await
}

pub async fn handle_reject_tenant(
    State(state): State<AppState>,
    ApiPath(tenant_id): ApiPath<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    change_status(state, tenant_id, StatusTrigger::AdminRejected).await
}
