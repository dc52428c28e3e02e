//! Permission checks at the command boundary, before anything is dispatched.
//!
//! Domain aggregates and infra stay auth-agnostic; roles from the token are
//! resolved to permissions here through the [`RolePolicy`].

use estateerp_auth::{
    AuthzError, CommandAuthorization, Permission, Principal, RolePolicy, TenantMembership, authorize,
    authorize_all,
};

use crate::context::{PrincipalContext, TenantContext};

/// A command paired with the permissions needed to dispatch it.
pub struct CmdAuth<C> {
    pub inner: C,
    pub required: Vec<Permission>,
}

impl<C> CmdAuth<C> {
    pub fn new(inner: C, permission: &'static str) -> Self {
        Self {
            inner,
            required: vec![Permission::new(permission)],
        }
    }
}

impl<C> CommandAuthorization for CmdAuth<C> {
    fn required_permissions(&self) -> &[Permission] {
        &self.required
    }
}

fn principal(policy: &RolePolicy, tenant: &TenantContext, principal: &PrincipalContext) -> Principal {
    Principal {
        principal_id: principal.principal_id(),
        active_tenant_id: tenant.tenant_id(),
        membership: TenantMembership {
            tenant_id: tenant.tenant_id(),
            roles: principal.roles().to_vec(),
            permissions: policy.permissions_for(principal.roles()),
        },
    }
}

pub fn authorize_command<C: CommandAuthorization>(
    policy: &RolePolicy,
    tenant: &TenantContext,
    caller: &PrincipalContext,
    command: &C,
) -> Result<(), AuthzError> {
    authorize_all(&principal(policy, tenant, caller), command)
}

/// Single-permission check for reads and workflow endpoints.
pub fn require(
    policy: &RolePolicy,
    tenant: &TenantContext,
    caller: &PrincipalContext,
    permission: &'static str,
) -> Result<(), AuthzError> {
    authorize(&principal(policy, tenant, caller), &Permission::new(permission))
}

#[cfg(test)]
mod tests {
    use super::*;
    use estateerp_auth::{PrincipalId, Role};
    use estateerp_core::TenantId;

    fn caller(role: &'static str) -> PrincipalContext {
        PrincipalContext::new(PrincipalId::new(), vec![Role::new(role)])
    }

    #[test]
    fn roles_resolve_through_the_policy() {
        let policy = RolePolicy::default();
        let tenant = TenantContext::new(TenantId::new());

        let cmd = CmdAuth::new((), "invoicing.invoices.issue");
        assert!(authorize_command(&policy, &tenant, &caller("accountant"), &cmd).is_ok());
        assert!(matches!(
            authorize_command(&policy, &tenant, &caller("sales"), &cmd),
            Err(AuthzError::Forbidden(_))
        ));

        assert!(require(&policy, &tenant, &caller("sales"), "invoicing.read").is_ok());
        assert!(require(&policy, &tenant, &caller("store"), "hr.read").is_err());
        assert!(require(&policy, &tenant, &caller("admin"), "hr.payslips.approve").is_ok());
    }

    #[test]
    fn unknown_roles_grant_nothing() {
        let policy = RolePolicy::default();
        let tenant = TenantContext::new(TenantId::new());
        assert!(require(&policy, &tenant, &caller("viewer"), "crm.read").is_err());
    }
}
