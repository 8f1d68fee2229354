use crate::AppState;
use crate::application::ApiError;
use crate::application::extract::ApiJson;
use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use chrono::Utc;
use core_lib::{
    CommandHandler, Conflict, CoreError, TenantRepository,
    domain::{
        tenant::{RegisterClinic, Tenant, generate_slug, random_slug_candidate, slug_candidate},
        user::{User, hash_password, normalize_email, validate_password},
    },
};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tracing::{info, warn};

use super::blocking;

/// `base`, `base-2` .. `base-50`; after that the suffix is random.
const NUMBERED_SLUG_ATTEMPTS: u32 = 50;
const RANDOM_SLUG_ATTEMPTS: u32 = 10;

pub struct RegisterClinicHandler {
    tenants: Arc<dyn TenantRepository>,
    trial_days: u32,
}

impl RegisterClinicHandler {
    pub fn new(tenants: Arc<dyn TenantRepository>, trial_days: u32) -> Self {
        Self { tenants, trial_days }
    }
}

fn email_taken() -> CoreError {
    CoreError::Validation("Email already registered".into())
}

impl CommandHandler<RegisterClinic> for RegisterClinicHandler {
    type Output = Tenant;

    async fn handle(&self, command: RegisterClinic) -> Result<Tenant, CoreError> {
        // 1. Validate input before touching the store
        let owner_name = command.owner_name.trim().to_string();
        let clinic_name = command.clinic_name.trim().to_string();
        if owner_name.is_empty() || clinic_name.is_empty() {
            return Err(CoreError::Validation("All fields are required".into()));
        }
        let email = normalize_email(&command.email)?;
        validate_password(&command.password)?;

        // 2. Reject known emails early; the unique constraint still decides races
        if self.tenants.find_user_by_email(&email).await?.is_some() {
            return Err(email_taken());
        }

        let password = command.password;
        let password_hash = blocking(move || hash_password(&password)).await?;

        // 3. Try slug candidates until one is free
        let base = generate_slug(&clinic_name);
        for attempt in 1..=NUMBERED_SLUG_ATTEMPTS + RANDOM_SLUG_ATTEMPTS {
            let slug = if attempt <= NUMBERED_SLUG_ATTEMPTS {
                slug_candidate(&base, attempt)
            } else {
                random_slug_candidate(&base)
            };
            if self.tenants.slug_exists(&slug).await? {
                continue;
            }

            let now = Utc::now();
            let tenant = Tenant::signup(&clinic_name, slug, self.trial_days, now)?;
            let owner = User::clinic_admin(&owner_name, &email, password_hash.clone(), tenant.id, now)?;

            match self.tenants.create_tenant_with_owner(&tenant, &owner).await {
                Ok(()) => {
                    info!(
                        tenant_id = %tenant.id,
                        slug = %tenant.slug,
                        status = %tenant.subscription_status,
                        "Clinic registered"
                    );
                    return Ok(tenant);
                }
                // Lost a race for this slug; move on to the next candidate.
                Err(CoreError::AlreadyExists(Conflict::Slug)) => continue,
                Err(CoreError::AlreadyExists(Conflict::Email)) => return Err(email_taken()),
                Err(e) => return Err(e),
            }
        }

        warn!(%base, "No free slug after {} attempts", NUMBERED_SLUG_ATTEMPTS + RANDOM_SLUG_ATTEMPTS);
        Err(CoreError::Internal(format!("could not allocate a slug for {}", base)))
    }
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct RegisterClinicDto {
    #[serde(default)]
    name: String,
    #[serde(default)]
    clinic_name: String,
    #[serde(default)]
    email: String,
    #[serde(default)]
    password: String,
}

// --- Axum Route Handler ---

pub async fn handle_register_request(
    State(state): State<AppState>,
    ApiJson(payload): ApiJson<RegisterClinicDto>,
) -> Result<impl IntoResponse, ApiError> {
    let handler = RegisterClinicHandler::new(state.tenants.clone(), state.config.trial_days);
    let tenant = handler
        .handle(RegisterClinic {
            owner_name: payload.name,
            clinic_name: payload.clinic_name,
            email: payload.email,
            password: payload.password,
        })
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "success": true,
            "message": "Clinic registered successfully",
            "tenantId": tenant.id,
            "slug": tenant.slug,
            "subscriptionStatus": tenant.subscription_status,
        })),
    ))
}
