use axum::{
    extract::{Request, State},
    http::{HeaderMap, header},
    middleware::Next,
    response::Response,
};
use core_lib::domain::{scope::TenantScope, user::Role};
use tracing::warn;
use uuid::Uuid;

use crate::AppState;
use crate::application::ApiError;
use crate::application::session::{SESSION_COOKIE, revocation_key};

/// Identity resolved from a verified session token.
#[derive(Clone, Debug)]
pub struct AuthenticatedUser {
    pub user_id: Uuid,
    pub role: Role,
    pub tenant_id: Option<Uuid>,
    pub jti: Uuid,
    pub expires_at: i64,
}

impl AuthenticatedUser {
    pub fn is_super_admin(&self) -> bool {
        self.role == Role::SuperAdmin
    }

    /// The caller's own tenant. Sessions without one (super admins) cannot
    /// use tenant-owned endpoints.
    pub fn scope(&self) -> Result<TenantScope, ApiError> {
        self.tenant_id
            .map(TenantScope::from_session)
            .ok_or(ApiError::Unauthorized)
    }
}

/// Bearer token first, then the session cookie.
fn session_token(headers: &HeaderMap) -> Option<&str> {
    let bearer = headers
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty());
    if bearer.is_some() {
        return bearer;
    }

    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|h| h.to_str().ok())
        .flat_map(|h| h.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, value)| *name == SESSION_COOKIE && !value.is_empty())
        .map(|(_, value)| value)
}

/// Middleware resolving the session into an `AuthenticatedUser` extension.
pub async fn session_auth(
    State(app_state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let Some(token) = session_token(req.headers()) else {
        warn!("Session authentication failed: no token presented.");
        return Err(ApiError::Unauthorized);
    };

    let claims = app_state.sessions.decode(token).map_err(|e| {
        warn!("Session authentication failed: {}", e);
        ApiError::Unauthorized
    })?;

    match app_state.cache.get(&revocation_key(claims.jti)).await {
        Ok(None) => {}
        Ok(Some(_)) => {
            warn!(user_id = %claims.sub, "Revoked session presented.");
            return Err(ApiError::Unauthorized);
        }
        Err(e) => {
            // Cannot confirm the token is still valid.
            warn!("Cache error during session lookup: {}", e);
            return Err(ApiError::Unauthorized);
        }
    }

    req.extensions_mut().insert(AuthenticatedUser {
        user_id: claims.sub,
        role: claims.role,
        tenant_id: claims.tenant_id,
        jti: claims.jti,
        expires_at: claims.exp,
    });
    Ok(next.run(req).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_bearer_wins_over_cookie() {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer abc"));
        headers.insert(header::COOKIE, HeaderValue::from_static("session=xyz"));
        assert_eq!(session_token(&headers), Some("abc"));
    }

    #[test]
    fn test_cookie_is_found_among_others() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::COOKIE,
            HeaderValue::from_static("theme=dark; session=xyz; lang=pt"),
        );
        assert_eq!(session_token(&headers), Some("xyz"));
    }

    #[test]
    fn test_missing_or_empty_token() {
        let mut headers = HeaderMap::new();
        assert_eq!(session_token(&headers), None);
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer "));
        headers.insert(header::COOKIE, HeaderValue::from_static("session="));
        assert_eq!(session_token(&headers), None);
    }
}
