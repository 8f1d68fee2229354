use crate::AppState;
use crate::application::ApiError;
use crate::application::extract::ApiJson;
use crate::application::middleware::AuthenticatedUser;
use crate::application::session::{SessionClaims, SessionKeys, TenantView, revocation_key};
use axum::{
    Json,
    extract::{Extension, State},
    http::header,
    response::IntoResponse,
};
use chrono::Utc;
use core_lib::{
    CommandHandler, CoreError, TenantRepository,
    domain::{
        tenant::Tenant,
        user::{LoginUser, User, verify_password},
    },
};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tracing::{info, warn};

use super::blocking;

/// A freshly issued session.
#[derive(Debug)]
pub struct LoginSession {
    pub token: String,
    pub claims: SessionClaims,
    pub user: User,
    pub tenant: Option<Tenant>,
}

pub struct LoginHandler {
    tenants: Arc<dyn TenantRepository>,
    sessions: Arc<SessionKeys>,
}

impl LoginHandler {
    pub fn new(tenants: Arc<dyn TenantRepository>, sessions: Arc<SessionKeys>) -> Self {
        Self { tenants, sessions }
    }
}

fn invalid_credentials() -> CoreError {
    CoreError::Unauthorized("Invalid credentials".into())
}

impl CommandHandler<LoginUser> for LoginHandler {
    type Output = LoginSession;

    async fn handle(&self, command: LoginUser) -> Result<LoginSession, CoreError> {
        let email = command.email.trim().to_lowercase();
        if email.is_empty() || command.password.is_empty() {
            return Err(invalid_credentials());
        }

        let Some(user) = self.tenants.find_user_by_email(&email).await? else {
            warn!("Login failed: unknown email");
            return Err(invalid_credentials());
        };

        let password = command.password;
        let stored_hash = user.password_hash().to_string();
        match blocking(move || verify_password(&password, &stored_hash)).await {
            Ok(()) => {}
            Err(CoreError::Unauthorized(_)) => {
                warn!(user_id = %user.id(), "Login failed: wrong password");
                return Err(invalid_credentials());
            }
            Err(e) => return Err(e),
        }

        let tenant = match user.tenant_id() {
            Some(tenant_id) => Some(
                self.tenants
                    .find_tenant(tenant_id)
                    .await?
                    .ok_or_else(|| CoreError::Internal(format!("User {} has no tenant", user.id())))?,
            ),
            None => None,
        };

        let (token, claims) = self.sessions.issue(&user, tenant.as_ref())?;
        info!(user_id = %user.id(), role = %user.role(), "User logged in");
        Ok(LoginSession {
            token,
            claims,
            user,
            tenant,
        })
    }
}

#[derive(Deserialize, Debug)]
pub struct LoginRequest {
    #[serde(default)]
    email: String,
    #[serde(default)]
    password: String,
}

// --- Axum Route Handlers ---

pub async fn handle_login_request(
    State(state): State<AppState>,
    ApiJson(payload): ApiJson<LoginRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let handler = LoginHandler::new(state.tenants.clone(), state.sessions.clone());
    let session = handler
        .handle(LoginUser {
            email: payload.email,
            password: payload.password,
        })
        .await?;

    let cookie = state
        .sessions
        .cookie(&session.token, state.config.secure_cookies());
    let body = json!({
        "token": session.token,
        "expiresAt": session.claims.exp,
        "user": {
            "id": session.user.id(),
            "name": session.user.name(),
            "email": session.user.email(),
            "role": session.user.role(),
            "tenantId": session.user.tenant_id(),
        },
        "tenant": session.tenant.as_ref().map(TenantView::from),
    });
    Ok(([(header::SET_COOKIE, cookie)], Json(body)))
}

pub async fn handle_logout_request(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
) -> Result<impl IntoResponse, ApiError> {
    // Keep the revocation only as long as the token could still be used.
    let remaining = (user.expires_at - Utc::now().timestamp()).max(1) as u64;
    state
        .cache
        .set(&revocation_key(user.jti), b"1", Some(remaining))
        .await?;
    info!(user_id = %user.user_id, "User logged out");

    let cookie = SessionKeys::clear_cookie(state.config.secure_cookies());
    Ok(([(header::SET_COOKIE, cookie)], Json(json!({ "success": true }))))
}
