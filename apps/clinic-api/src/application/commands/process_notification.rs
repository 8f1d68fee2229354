use chrono::Utc;
use core_lib::{
    Cache, CommandHandler, CoreError, PaymentGateway, TenantRepository,
    domain::{
        billing::{
            NotificationKind, ProcessNotification, ProviderEvent, WebhookOutcome, is_valid_resource_id,
        },
        tenant::{StatusTrigger, Tenant},
    },
};
use std::sync::Arc;
use tracing::{error, info, warn};

pub const PROVIDER: &str = "mercadopago";
/// How long a processed notification is remembered.
pub const IDEMPOTENCY_TTL_SECS: u64 = 7 * 24 * 60 * 60;

pub struct ProcessNotificationHandler {
    tenants: Arc<dyn TenantRepository>,
    payments: Arc<dyn PaymentGateway>,
    cache: Arc<dyn Cache>,
}

impl ProcessNotificationHandler {
    pub fn new(
        tenants: Arc<dyn TenantRepository>,
        payments: Arc<dyn PaymentGateway>,
        cache: Arc<dyn Cache>,
    ) -> Self {
        Self {
            tenants,
            payments,
            cache,
        }
    }

    async fn apply(
        &self,
        tenant: &Tenant,
        event: &ProviderEvent,
        trigger: StatusTrigger,
    ) -> Result<(), CoreError> {
        let next = tenant.subscription_status.on(trigger);
        self.tenants
            .set_subscription_status(tenant.id, next, event.payer_id.as_deref())
            .await?;

        if let Some(record) = event.audit_record(tenant.id, Utc::now()) {
            if !self.tenants.record_subscription(&record).await? {
                info!(payment_id = %record.external_payment_id, "Payment already recorded");
            }
        }

        info!(
            tenant_id = %tenant.id,
            from = %tenant.subscription_status,
            to = %next,
            kind = event.kind.as_str(),
            resource_id = %event.resource_id,
            "Subscription updated from provider notification"
        );
        Ok(())
    }
}

impl CommandHandler<ProcessNotification> for ProcessNotificationHandler {
    type Output = WebhookOutcome;

    async fn handle(&self, command: ProcessNotification) -> Result<WebhookOutcome, CoreError> {
        // 1. Only payment and preapproval notifications matter
        let Some(kind) = NotificationKind::parse(&command.kind) else {
            info!(kind = %command.kind, "Ignoring notification type");
            return Ok(WebhookOutcome::Ignored);
        };
        let resource_id = command.resource_id.trim();
        if resource_id.is_empty() {
            return Err(CoreError::Validation("Missing notification resource id".into()));
        }
        if !is_valid_resource_id(resource_id) {
            warn!(kind = kind.as_str(), "Rejecting malformed notification resource id");
            return Err(CoreError::Validation("Invalid notification resource id".into()));
        }

        // 2. Never trust the body; read the resource back from the provider
        let event = self.payments.fetch_event(kind, resource_id).await?;

        // 3. Map provider status to a transition
        let Some(trigger) = event.trigger() else {
            info!(
                kind = kind.as_str(),
                resource_id = %event.resource_id,
                status = %event.status,
                "Notification status has no effect"
            );
            return Ok(WebhookOutcome::Ignored);
        };

        // 4. Resolve the tenant from external_reference
        let tenant = match event.tenant_id() {
            Some(tenant_id) => self.tenants.find_tenant(tenant_id).await?,
            None => None,
        };
        let Some(tenant) = tenant else {
            warn!(
                resource_id = %event.resource_id,
                external_reference = ?event.external_reference,
                "Notification does not reference a known tenant"
            );
            return Ok(WebhookOutcome::Unresolved);
        };

        // 5. Claim the notification so redeliveries are acknowledged only once
        let key = event.idempotency_key(PROVIDER);
        if !self
            .cache
            .set_if_absent(&key, b"1", Some(IDEMPOTENCY_TTL_SECS))
            .await?
        {
            info!(%key, "Duplicate notification");
            return Ok(WebhookOutcome::Duplicate);
        }

        // 6. Apply; release the claim so a retry can succeed
        if let Err(e) = self.apply(&tenant, &event, trigger).await {
            if let Err(release) = self.cache.delete(&key).await {
                error!(%key, "Failed to release notification claim: {}", release);
            }
            return Err(e);
        }
        Ok(WebhookOutcome::Applied)
    }
}
