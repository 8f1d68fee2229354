use axum::{
    Json,
    extract::{Extension, State},
    response::IntoResponse,
};
use chrono::Utc;
use core_lib::{
    CoreError,
    domain::{
        inventory::InventorySummary,
        tenant::{Access, SubscriptionStatus, Tenant, TenantOverview},
    },
};
use rust_decimal::Decimal;
use serde::Serialize;
use serde_json::json;
use tracing::debug;

use super::ApiError;
use super::middleware::AuthenticatedUser;
use super::session::TenantView;
use crate::AppState;

// GET /api/session
pub async fn handle_get_session(
    State(app_state): State<AppState>,
    Extension(ctx): Extension<AuthenticatedUser>,
) -> Result<impl IntoResponse, ApiError> {
    let user = app_state
        .tenants
        .find_user(ctx.user_id)
        .await?
        .ok_or(ApiError::Unauthorized)?;

    let tenant = match ctx.tenant_id {
        Some(tenant_id) => app_state.tenants.find_tenant(tenant_id).await?,
        None => None,
    };
    let now = Utc::now();
    let access = match (&tenant, ctx.is_super_admin()) {
        (_, true) => Access::Granted,
        (Some(t), false) => t.access_at(now),
        (None, false) => Access::PaymentRequired,
    };

    Ok(Json(json!({
        "user": {
            "id": user.id(),
            "name": user.name(),
            "email": user.email(),
            "role": user.role(),
            "tenantId": user.tenant_id(),
        },
        "tenant": tenant.as_ref().map(TenantView::from),
        "hasAccess": access == Access::Granted,
        "trialDaysLeft": tenant.as_ref().and_then(|t| t.trial_days_left(now)),
        "expiresAt": ctx.expires_at,
    })))
}

// --- Admin console ---

// GET /api/admin/tenants
pub async fn handle_list_tenants(
    State(app_state): State<AppState>,
) -> Result<Json<Vec<TenantOverview>>, ApiError> {
    let tenants = app_state.tenants.list_tenants().await?;
    debug!(count = tenants.len(), "Listed tenants");
    Ok(Json(tenants))
}

#[derive(Debug, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlatformStats {
    pub total_tenants: usize,
    pub pending: usize,
    pub trial: usize,
    pub active: usize,
    pub suspended: usize,
    pub total_products: i64,
    pub mrr: Decimal,
    pub pending_tenants: Vec<Tenant>,
}

impl PlatformStats {
    /// MRR counts every ACTIVE tenant at the single plan price.
    pub fn compute(tenants: Vec<TenantOverview>, plan_price: Decimal) -> Self {
        let mut stats = PlatformStats {
            total_tenants: tenants.len(),
            ..Default::default()
        };
        for overview in tenants {
            stats.total_products += overview.product_count;
            match overview.tenant.subscription_status {
                SubscriptionStatus::Pending => {
                    stats.pending += 1;
                    stats.pending_tenants.push(overview.tenant);
                }
                SubscriptionStatus::Trial => stats.trial += 1,
                SubscriptionStatus::Active => stats.active += 1,
                SubscriptionStatus::Suspended => stats.suspended += 1,
            }
        }
        stats.mrr = plan_price * Decimal::from(stats.active);
        stats
    }
}

// GET /api/admin/stats
pub async fn handle_platform_stats(
    State(app_state): State<AppState>,
) -> Result<Json<PlatformStats>, ApiError> {
    let tenants = app_state.tenants.list_tenants().await?;
    Ok(Json(PlatformStats::compute(tenants, app_state.config.plan_price)))
}

// --- Clinic dashboard ---

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardStats {
    #[serde(flatten)]
    pub inventory: InventorySummary,
    pub subscription_status: SubscriptionStatus,
    pub trial_days_left: Option<i64>,
}

// GET /api/dashboard/stats
pub async fn handle_dashboard_stats(
    State(app_state): State<AppState>,
    Extension(ctx): Extension<AuthenticatedUser>,
) -> Result<impl IntoResponse, ApiError> {
    let scope = ctx.scope()?;
    let tenant = app_state
        .tenants
        .find_tenant(scope.tenant_id())
        .await?
        .ok_or_else(|| CoreError::NotFound("Tenant".into()))?;

    let now = Utc::now();
    let products = app_state.inventory.list_products(&scope).await?;
    Ok(Json(DashboardStats {
        inventory: InventorySummary::compute(&products, now),
        subscription_status: tenant.subscription_status,
        trial_days_left: tenant.trial_days_left(now),
    }))
}
