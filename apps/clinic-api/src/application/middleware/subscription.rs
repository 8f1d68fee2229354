use axum::{
    extract::{Extension, Request, State},
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};
use chrono::Utc;
use core_lib::domain::tenant::Access;
use tracing::{info, warn};

use super::AuthenticatedUser;
use crate::AppState;
use crate::application::ApiError;

pub const PAYMENT_REQUIRED_PATH: &str = "/payment-required";

/// Lets a request through only when the caller's tenant currently has
/// access. Denied requests are sent to the payment page with a 303.
pub async fn subscription_gate(
    State(app_state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    if user.is_super_admin() {
        return Ok(next.run(req).await);
    }

    let tenant_id = user.tenant_id.ok_or(ApiError::Unauthorized)?;
    let Some(tenant) = app_state.tenants.find_tenant(tenant_id).await? else {
        warn!(%tenant_id, "Session refers to a missing tenant.");
        return Err(ApiError::Unauthorized);
    };

    match tenant.access_at(Utc::now()) {
        Access::Granted => Ok(next.run(req).await),
        Access::PaymentRequired => {
            info!(
                %tenant_id,
                status = %tenant.subscription_status,
                "Subscription gate redirected request."
            );
            Ok(Redirect::to(PAYMENT_REQUIRED_PATH).into_response())
        }
    }
}
