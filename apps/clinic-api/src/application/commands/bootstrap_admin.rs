use chrono::Utc;
use core_lib::{
    CommandHandler, Conflict, CoreError, TenantRepository,
    domain::user::{BootstrapSuperAdmin, User, hash_password, normalize_email, validate_password},
};
use std::sync::Arc;
use tracing::{info, warn};

use super::blocking;

/// Creates the platform super admin at startup. Returns whether a user was
/// created.
pub struct BootstrapSuperAdminHandler {
    tenants: Arc<dyn TenantRepository>,
}

impl BootstrapSuperAdminHandler {
    pub fn new(tenants: Arc<dyn TenantRepository>) -> Self {
        Self { tenants }
    }
}

impl CommandHandler<BootstrapSuperAdmin> for BootstrapSuperAdminHandler {
    type Output = bool;

    async fn handle(&self, command: BootstrapSuperAdmin) -> Result<bool, CoreError> {
        let email = normalize_email(&command.email)?;
        validate_password(&command.password)?;

        if let Some(existing) = self.tenants.find_user_by_email(&email).await? {
            if !existing.is_super_admin() {
                warn!(%email, "Super admin email belongs to a clinic user; not promoting");
            }
            return Ok(false);
        }

        let password = command.password;
        let hash = blocking(move || hash_password(&password)).await?;
        let admin = User::super_admin(&email, hash, Utc::now())?;
        match self.tenants.create_user(&admin).await {
            Ok(()) => {
                info!(%email, "Super admin created");
                Ok(true)
            }
            // Another instance created it first.
            Err(CoreError::AlreadyExists(Conflict::Email)) => Ok(false),
            Err(e) => Err(e),
        }
    }
}
