use axum::Json;
use axum::response::IntoResponse;
use serde_json::json;

use crate::context::RequestCtx;

pub async fn health() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

pub async fn whoami(ctx: RequestCtx) -> impl IntoResponse {
    let permissions = ctx.services.policy.permissions_for(ctx.principal.roles());
    Json(json!({
        "tenant_id": ctx.tenant_id().to_string(),
        "principal_id": ctx.principal.principal_id().to_string(),
        "roles": ctx.principal.roles().iter().map(|r| r.as_str()).collect::<Vec<_>>(),
        "permissions": permissions.iter().map(|p| p.as_str()).collect::<Vec<_>>(),
    }))
}
