use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use estateerp_core::TenantId;

use crate::{PrincipalId, Role};

/// Claims carried by a back-office bearer token.
///
/// Timestamps are unix seconds (`iat`/`exp`) so tokens minted by any standard
/// JWT library decode without custom serializers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JwtClaims {
    pub sub: PrincipalId,
    pub tenant_id: TenantId,
    #[serde(default)]
    pub roles: Vec<Role>,
    pub iat: i64,
    pub exp: i64,
}

impl JwtClaims {
    pub fn issued_at(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.iat, 0)
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TokenValidationError {
    #[error("token has expired")]
    Expired,

    #[error("token not yet valid (issued in the future)")]
    NotYetValid,

    #[error("invalid token time window (exp <= iat)")]
    InvalidTimeWindow,
}

/// Check the token's time window against `now`.
pub fn validate_claims(claims: &JwtClaims, now: DateTime<Utc>) -> Result<(), TokenValidationError> {
    if claims.exp <= claims.iat {
        return Err(TokenValidationError::InvalidTimeWindow);
    }
    let now = now.timestamp();
    if now < claims.iat {
        return Err(TokenValidationError::NotYetValid);
    }
    if now >= claims.exp {
        return Err(TokenValidationError::Expired);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn claims(iat: i64, exp: i64) -> JwtClaims {
        JwtClaims {
            sub: PrincipalId::new(),
            tenant_id: TenantId::new(),
            roles: vec![Role::new("admin")],
            iat,
            exp,
        }
    }

    #[test]
    fn time_window_is_enforced() {
        let now = DateTime::from_timestamp(1_000, 0).unwrap();
        assert_eq!(validate_claims(&claims(900, 1_100), now), Ok(()));
        assert_eq!(
            validate_claims(&claims(900, 1_000), now),
            Err(TokenValidationError::Expired)
        );
        assert_eq!(
            validate_claims(&claims(1_001, 2_000), now),
            Err(TokenValidationError::NotYetValid)
        );
        assert_eq!(
            validate_claims(&claims(900, 900), now),
            Err(TokenValidationError::InvalidTimeWindow)
        );
    }
}
