use std::borrow::Cow;

use serde::{Deserialize, Serialize};

/// Permission identifier, dotted by area: `"<area>.<resource>.<action>"`.
///
/// Two wildcard forms exist on the granting side: `"*"` (everything) and
/// `"<prefix>.*"` (everything under a prefix).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Permission(Cow<'static, str>);

impl Permission {
    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_wildcard(&self) -> bool {
        self.as_str() == "*"
    }

    /// Whether holding `self` satisfies a requirement for `required`.
    pub fn grants(&self, required: &Permission) -> bool {
        if self.is_wildcard() || self.as_str() == required.as_str() {
            return true;
        }
        match self.as_str().strip_suffix(".*") {
            Some(prefix) => required
                .as_str()
                .strip_prefix(prefix)
                .is_some_and(|rest| rest.starts_with('.')),
            None => false,
        }
    }
}

impl core::fmt::Display for Permission {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefix_wildcard_does_not_match_sibling_prefixes() {
        let granted = Permission::new("crm.*");
        assert!(granted.grants(&Permission::new("crm.leads.assign")));
        assert!(!granted.grants(&Permission::new("crmx.leads.assign")));
        assert!(!granted.grants(&Permission::new("crm")));
    }
}
