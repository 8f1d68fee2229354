use axum::{
    extract::{Extension, Request},
    middleware::Next,
    response::Response,
};
use tracing::warn;

use crate::application::ApiError;
use crate::application::middleware::AuthenticatedUser;

/// Middleware guarding the platform admin console.
pub async fn require_super_admin(
    Extension(user): Extension<AuthenticatedUser>,
    req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    if !user.is_super_admin() {
        warn!(user_id = %user.user_id, "Non-admin attempted admin route.");
        return Err(ApiError::Forbidden);
    }
    Ok(next.run(req).await)
}
