//! `estateerp-auth`: authentication and authorization for the back office.
//!
//! Decoupled from HTTP and storage: the API layer decodes a bearer token with a
//! [`JwtValidator`], resolves the roles to permissions through the
//! [`RolePolicy`], and calls [`authorize`] before dispatching a command.

pub mod authorize;
pub mod claims;
pub mod jwt;
pub mod permissions;
pub mod principal;
pub mod roles;

pub use authorize::{AuthzError, CommandAuthorization, Principal, authorize, authorize_all};
pub use claims::{JwtClaims, TokenValidationError, validate_claims};
pub use jwt::{Hs256JwtValidator, JwtError, JwtValidator};
pub use permissions::Permission;
pub use principal::{PrincipalId, TenantMembership};
pub use roles::{Role, RolePolicy};
