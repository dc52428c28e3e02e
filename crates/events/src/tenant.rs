use estateerp_core::TenantId;

use crate::EventEnvelope;

/// Messages that belong to exactly one tenant (company).
///
/// Background workers use this to stay pinned to a tenant and drop foreign
/// messages.
pub trait TenantScoped {
    fn tenant_id(&self) -> TenantId;
}

impl<E> TenantScoped for EventEnvelope<E> {
    fn tenant_id(&self) -> TenantId {
        EventEnvelope::tenant_id(self)
    }
}
