use std::borrow::Cow;
use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::Permission;

/// Role name as carried in a token (`admin`, `accountant`, `sales`, `hr`, `store`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Role(Cow<'static, str>);

impl Role {
    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for Role {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Static role → permission mapping.
#[derive(Debug, Clone)]
pub struct RolePolicy {
    grants: HashMap<String, Vec<Permission>>,
}

impl RolePolicy {
    pub fn empty() -> Self {
        Self {
            grants: HashMap::new(),
        }
    }

    pub fn grant(mut self, role: &str, permissions: &[&'static str]) -> Self {
        self.grants
            .entry(role.to_string())
            .or_default()
            .extend(permissions.iter().map(|p| Permission::new(*p)));
        self
    }

    /// Union of the permissions of every role; unknown roles grant nothing.
    pub fn permissions_for(&self, roles: &[Role]) -> Vec<Permission> {
        let mut out: Vec<Permission> = Vec::new();
        for role in roles {
            if let Some(perms) = self.grants.get(role.as_str()) {
                for p in perms {
                    if !out.contains(p) {
                        out.push(p.clone());
                    }
                }
            }
        }
        out
    }
}

impl Default for RolePolicy {
    fn default() -> Self {
        Self::empty()
            .grant("admin", &["*"])
            .grant(
                "accountant",
                &["accounting.*", "invoicing.*", "banking.*", "data.*", "mail.*"],
            )
            .grant(
                "sales",
                &["crm.*", "property.*", "invoicing.read", "mail.*"],
            )
            .grant("hr", &["hr.*"])
            .grant("store", &["inventory.*", "manufacturing.*"])
    }
}
