use std::sync::Arc;

use axum::extract::FromRequestParts;
use axum::http::StatusCode;
use axum::http::request::Parts;
use axum::response::Response;

use estateerp_auth::{JwtClaims, PrincipalId, Role};
use estateerp_core::TenantId;

use crate::app::errors::json_error;
use crate::app::services::AppServices;

/// Company the request acts for. Set by the auth middleware from the token.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct TenantContext {
    tenant_id: TenantId,
}

impl TenantContext {
    pub fn new(tenant_id: TenantId) -> Self {
        Self { tenant_id }
    }

    pub fn tenant_id(&self) -> TenantId {
        self.tenant_id
    }
}

/// Authenticated user and the roles its token carries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrincipalContext {
    principal_id: PrincipalId,
    roles: Vec<Role>,
}

impl PrincipalContext {
    pub fn new(principal_id: PrincipalId, roles: Vec<Role>) -> Self {
        Self { principal_id, roles }
    }

    pub fn from_claims(claims: &JwtClaims) -> Self {
        Self::new(claims.sub, claims.roles.clone())
    }

    pub fn principal_id(&self) -> PrincipalId {
        self.principal_id
    }

    pub fn roles(&self) -> &[Role] {
        &self.roles
    }
}

/// Everything a handler needs about the request: services, tenant and caller.
#[derive(Clone)]
pub struct RequestCtx {
    pub services: Arc<AppServices>,
    pub tenant: TenantContext,
    pub principal: PrincipalContext,
}

impl RequestCtx {
    pub fn tenant_id(&self) -> TenantId {
        self.tenant.tenant_id()
    }
}

#[axum::async_trait]
impl<S> FromRequestParts<S> for RequestCtx
where
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let services = parts
            .extensions
            .get::<Arc<AppServices>>()
            .cloned()
            .ok_or_else(|| {
                json_error(StatusCode::INTERNAL_SERVER_ERROR, "internal", "services are not wired")
            })?;
        let tenant = parts
            .extensions
            .get::<TenantContext>()
            .copied()
            .ok_or_else(|| json_error(StatusCode::UNAUTHORIZED, "unauthenticated", "missing tenant context"))?;
        let principal = parts
            .extensions
            .get::<PrincipalContext>()
            .cloned()
            .ok_or_else(|| json_error(StatusCode::UNAUTHORIZED, "unauthenticated", "missing principal"))?;
        Ok(Self {
            services,
            tenant,
            principal,
        })
    }
}
