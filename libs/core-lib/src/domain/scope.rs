use uuid::Uuid;

/// The tenant a request is allowed to see.
///
/// Build this only from verified session claims. Tenant ids arriving in a
/// path, query string or body must never be turned into a scope; repository
/// methods take a `&TenantScope` so that every inventory query carries the
/// caller's own tenant predicate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TenantScope {
    tenant_id: Uuid,
}

impl TenantScope {
    pub fn from_session(tenant_id: Uuid) -> Self {
        Self { tenant_id }
    }

    pub fn tenant_id(&self) -> Uuid {
        self.tenant_id
    }

    pub fn owns(&self, tenant_id: Uuid) -> bool {
        self.tenant_id == tenant_id
    }
}
