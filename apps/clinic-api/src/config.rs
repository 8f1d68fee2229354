use core_lib::CoreError;
use core_lib::adapters::mercado_pago::DEFAULT_API_BASE_URL;
use rust_decimal::Decimal;
use std::{net::SocketAddr, str::FromStr};

pub const MIN_SESSION_SECRET_LEN: usize = 32;

/// Credentials for the platform super admin created at startup.
#[derive(Debug, Clone)]
pub struct SuperAdminSeed {
    pub email: String,
    pub password: String,
}

/// Runtime settings, read once at startup.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bind_addr: SocketAddr,
    pub database_url: Option<String>,
    pub redis_url: Option<String>,
    pub session_secret: String,
    pub session_ttl_secs: u64,
    pub app_base_url: String,
    pub mp_access_token: Option<String>,
    pub mp_api_base_url: String,
    pub mp_webhook_secret: Option<String>,
    pub plan_price: Decimal,
    pub plan_title: String,
    pub trial_days: u32,
    pub trial_sweep_interval_secs: u64,
    pub super_admin: Option<SuperAdminSeed>,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, CoreError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the config from any key/value source. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, CoreError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let session_secret = get("SESSION_SECRET")
            .ok_or_else(|| CoreError::Configuration("SESSION_SECRET is required".into()))?;
        if session_secret.len() < MIN_SESSION_SECRET_LEN {
            return Err(CoreError::Configuration(format!(
                "SESSION_SECRET must be at least {} bytes",
                MIN_SESSION_SECRET_LEN
            )));
        }

        let super_admin = match (get("SUPER_ADMIN_EMAIL"), get("SUPER_ADMIN_PASSWORD")) {
            (Some(email), Some(password)) => Some(SuperAdminSeed { email, password }),
            (None, None) => None,
            _ => {
                return Err(CoreError::Configuration(
                    "SUPER_ADMIN_EMAIL and SUPER_ADMIN_PASSWORD must be set together".into(),
                ));
            }
        };

        Ok(Self {
            bind_addr: parse_or("BIND_ADDR", get("BIND_ADDR"), SocketAddr::from(([0, 0, 0, 0], 3000)))?,
            database_url: get("DATABASE_URL"),
            redis_url: get("REDIS_URL"),
            session_secret,
            session_ttl_secs: parse_or("SESSION_TTL_SECS", get("SESSION_TTL_SECS"), 43_200)?,
            app_base_url: get("APP_BASE_URL")
                .unwrap_or_else(|| "http://localhost:3000".to_string())
                .trim_end_matches('/')
                .to_string(),
            mp_access_token: get("MP_ACCESS_TOKEN"),
            mp_api_base_url: get("MP_API_BASE_URL").unwrap_or_else(|| DEFAULT_API_BASE_URL.to_string()),
            mp_webhook_secret: get("MP_WEBHOOK_SECRET"),
            plan_price: parse_or("PLAN_PRICE", get("PLAN_PRICE"), Decimal::new(4990, 2))?,
            plan_title: get("PLAN_TITLE").unwrap_or_else(|| "Clinic inventory monthly plan".to_string()),
            trial_days: parse_or("TRIAL_DAYS", get("TRIAL_DAYS"), 0)?,
            trial_sweep_interval_secs: parse_or(
                "TRIAL_SWEEP_INTERVAL_SECS",
                get("TRIAL_SWEEP_INTERVAL_SECS"),
                3600,
            )?,
            super_admin,
        })
    }

    /// Session cookies are marked `Secure` when the app is served over TLS.
    pub fn secure_cookies(&self) -> bool {
        self.app_base_url.starts_with("https://")
    }
}

fn parse_or<T: FromStr>(key: &str, value: Option<String>, default: T) -> Result<T, CoreError> {
    match value {
        Some(raw) => raw
            .parse()
            .map_err(|_| CoreError::Configuration(format!("Invalid value for {}: {}", key, raw))),
        None => Ok(default),
    }
}
