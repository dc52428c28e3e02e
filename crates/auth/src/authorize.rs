use thiserror::Error;

use estateerp_core::TenantId;

use crate::{Permission, PrincipalId, TenantMembership};

/// A fully resolved principal for authorization decisions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub principal_id: PrincipalId,
    pub active_tenant_id: TenantId,
    pub membership: TenantMembership,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthzError {
    #[error("tenant mismatch")]
    TenantMismatch,

    #[error("forbidden: missing permission '{0}'")]
    Forbidden(String),
}

/// Permissions a command needs before it may be dispatched.
pub trait CommandAuthorization {
    fn required_permissions(&self) -> &[Permission];
}

/// Check one permission for a principal inside its active tenant.
///
/// Granted permissions may be exact (`invoicing.invoices.issue`), a prefix
/// wildcard (`invoicing.*`) or the global wildcard (`*`).
pub fn authorize(principal: &Principal, required: &Permission) -> Result<(), AuthzError> {
    if principal.active_tenant_id != principal.membership.tenant_id {
        return Err(AuthzError::TenantMismatch);
    }

    if principal
        .membership
        .permissions
        .iter()
        .any(|granted| granted.grants(required))
    {
        Ok(())
    } else {
        Err(AuthzError::Forbidden(required.as_str().to_string()))
    }
}

/// Check every permission a command requires.
pub fn authorize_all<C: CommandAuthorization + ?Sized>(
    principal: &Principal,
    command: &C,
) -> Result<(), AuthzError> {
    for perm in command.required_permissions() {
        authorize(principal, perm)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Role;

    fn principal(tenant_id: TenantId, permissions: Vec<Permission>) -> Principal {
        Principal {
            principal_id: PrincipalId::new(),
            active_tenant_id: tenant_id,
            membership: TenantMembership {
                tenant_id,
                roles: vec![Role::new("accountant")],
                permissions,
            },
        }
    }

    #[test]
    fn prefix_wildcard_grants_area_permissions() {
        let p = principal(TenantId::new(), vec![Permission::new("accounting.*")]);
        assert!(authorize(&p, &Permission::new("accounting.vouchers.post")).is_ok());
        assert_eq!(
            authorize(&p, &Permission::new("hr.payslips.approve")),
            Err(AuthzError::Forbidden("hr.payslips.approve".to_string()))
        );
    }

    #[test]
    fn membership_of_other_tenant_is_rejected() {
        let mut p = principal(TenantId::new(), vec![Permission::new("*")]);
        p.active_tenant_id = TenantId::new();
        assert_eq!(
            authorize(&p, &Permission::new("crm.leads.create")),
            Err(AuthzError::TenantMismatch)
        );
    }

    #[test]
    fn all_required_permissions_must_be_granted() {
        struct Cmd(Vec<Permission>);
        impl CommandAuthorization for Cmd {
            fn required_permissions(&self) -> &[Permission] {
                &self.0
            }
        }

        let p = principal(TenantId::new(), vec![Permission::new("inventory.*")]);
        let ok = Cmd(vec![Permission::new("inventory.items.create")]);
        let mixed = Cmd(vec![
            Permission::new("inventory.items.create"),
            Permission::new("manufacturing.orders.complete"),
        ]);
        assert!(authorize_all(&p, &ok).is_ok());
        assert!(authorize_all(&p, &mixed).is_err());
    }
}
