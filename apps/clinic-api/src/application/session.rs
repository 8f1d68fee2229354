use chrono::{DateTime, Utc};
use core_lib::{
    CoreError,
    domain::{
        tenant::{SubscriptionStatus, Tenant},
        user::{Role, User},
    },
};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const SESSION_COOKIE: &str = "session";

/// Claims carried by a session token. Tenant status is a login-time
/// snapshot for clients; access decisions re-read it from the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionClaims {
    pub sub: Uuid,
    pub role: Role,
    pub tenant_id: Option<Uuid>,
    pub tenant_status: Option<SubscriptionStatus>,
    pub trial_ends_at: Option<DateTime<Utc>>,
    pub iat: i64,
    pub exp: i64,
    pub jti: Uuid,
}

/// Tenant fields a signed-in clinic user sees. Billing identifiers stay
/// server-side.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TenantView {
    pub id: Uuid,
    pub name: String,
    pub slug: String,
    pub subscription_status: SubscriptionStatus,
    pub trial_ends_at: Option<DateTime<Utc>>,
}

impl From<&Tenant> for TenantView {
    fn from(tenant: &Tenant) -> Self {
        Self {
            id: tenant.id,
            name: tenant.name.clone(),
            slug: tenant.slug.clone(),
            subscription_status: tenant.subscription_status,
            trial_ends_at: tenant.trial_ends_at,
        }
    }
}

/// HS256 signing and verification of session tokens.
pub struct SessionKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
    ttl_secs: u64,
}

impl SessionKeys {
    pub fn new(secret: &str, ttl_secs: u64) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.set_required_spec_claims(&["sub", "exp", "iat"]);
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            validation,
            ttl_secs,
        }
    }

    pub fn ttl_secs(&self) -> u64 {
        self.ttl_secs
    }

    pub fn issue(&self, user: &User, tenant: Option<&Tenant>) -> Result<(String, SessionClaims), CoreError> {
        let now = Utc::now().timestamp();
        let claims = SessionClaims {
            sub: user.id(),
            role: user.role(),
            tenant_id: user.tenant_id(),
            tenant_status: tenant.map(|t| t.subscription_status),
            trial_ends_at: tenant.and_then(|t| t.trial_ends_at),
            iat: now,
            exp: now + self.ttl_secs as i64,
            jti: Uuid::new_v4(),
        };
        let token = jsonwebtoken::encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|e| CoreError::Internal(format!("JWT encode: {}", e)))?;
        Ok((token, claims))
    }

    /// Verify signature and expiry. Any failure is `Unauthorized`.
    pub fn decode(&self, token: &str) -> Result<SessionClaims, CoreError> {
        jsonwebtoken::decode::<SessionClaims>(token, &self.decoding, &self.validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => {
                    CoreError::Unauthorized("Session expired".into())
                }
                _ => CoreError::Unauthorized("Invalid session".into()),
            })
    }

    /// `Set-Cookie` value carrying the token.
    pub fn cookie(&self, token: &str, secure: bool) -> String {
        let mut cookie = format!(
            "{}={}; Path=/; HttpOnly; SameSite=Lax; Max-Age={}",
            SESSION_COOKIE, token, self.ttl_secs
        );
        if secure {
            cookie.push_str("; Secure");
        }
        cookie
    }

    pub fn clear_cookie(secure: bool) -> String {
        let mut cookie = format!("{}=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0", SESSION_COOKIE);
        if secure {
            cookie.push_str("; Secure");
        }
        cookie
    }
}

/// Cache key marking a token id as logged out.
pub fn revocation_key(jti: Uuid) -> String {
    format!("session:revoked:{}", jti)
}
