use chrono::Utc;
use core_lib::{CoreError, TenantRepository};
use std::{sync::Arc, time::Duration};
use tokio::task::JoinHandle;
use tracing::{error, info};

/// Suspends every trial that has ended. Returns how many were suspended.
pub async fn sweep_once(tenants: &dyn TenantRepository) -> Result<usize, CoreError> {
    let expired = tenants.expire_trials(Utc::now()).await?;
    for tenant_id in &expired {
        info!(%tenant_id, "Trial expired; tenant suspended");
    }
    Ok(expired.len())
}

/// Runs `sweep_once` every `interval_secs` until the runtime shuts down.
pub fn spawn(tenants: Arc<dyn TenantRepository>, interval_secs: u64) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(interval_secs.max(1)));
        loop {
            ticker.tick().await;
            if let Err(e) = sweep_once(tenants.as_ref()).await {
                error!("Trial sweep failed: {}", e);
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;
    use core_lib::adapters::InMemoryStore;
    use core_lib::domain::{
        tenant::{SubscriptionStatus, Tenant},
        user::User,
    };

    #[tokio::test]
    async fn test_sweep_suspends_only_ended_trials() {
        let store = InMemoryStore::new();
        let now = Utc::now();

        let mut ended = Tenant::signup("Old", "old".into(), 7, now).unwrap();
        ended.trial_ends_at = Some(now - ChronoDuration::hours(1));
        let running = Tenant::signup("New", "new".into(), 7, now).unwrap();
        for (tenant, email) in [(&ended, "old@x.com"), (&running, "new@x.com")] {
            let owner = User::clinic_admin("Owner", email, "h".into(), tenant.id, now).unwrap();
            store.create_tenant_with_owner(tenant, &owner).await.unwrap();
        }

        assert_eq!(sweep_once(&store).await.unwrap(), 1);
        assert_eq!(
            store.find_tenant(ended.id).await.unwrap().unwrap().subscription_status,
            SubscriptionStatus::Suspended
        );
        assert_eq!(
            store.find_tenant(running.id).await.unwrap().unwrap().subscription_status,
            SubscriptionStatus::Trial
        );
        assert_eq!(sweep_once(&store).await.unwrap(), 0);
    }
}
