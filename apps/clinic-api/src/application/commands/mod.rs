pub mod bootstrap_admin;
pub mod change_tenant_status;
pub mod create_checkout;
pub mod login;
pub mod process_notification;
pub mod register_clinic;

pub use bootstrap_admin::BootstrapSuperAdminHandler;
pub use change_tenant_status::ChangeTenantStatusHandler;
pub use create_checkout::CreateCheckoutHandler;
pub use login::LoginHandler;
pub use process_notification::ProcessNotificationHandler;
pub use register_clinic::RegisterClinicHandler;

/// Argon2 is CPU-bound; keep it off the async workers.
pub(crate) async fn blocking<T, F>(f: F) -> Result<T, core_lib::CoreError>
where
    F: FnOnce() -> Result<T, core_lib::domain::user::UserError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| core_lib::CoreError::Internal(format!("Blocking task failed: {}", e)))?
        .map_err(core_lib::CoreError::from)
}
