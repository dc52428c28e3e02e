use std::fmt::Display;
use std::str::FromStr;

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use chrono::{NaiveDate, Utc};
use serde::Serialize;
use serde_json::json;

use estateerp_infra::event_store::StoredEvent;

use crate::app::errors::{forbidden, json_error};
use crate::authz::{CmdAuth, authorize_command, require as require_permission};
use crate::context::RequestCtx;

pub fn parse_id<T>(raw: &str, what: &'static str) -> Result<T, Response>
where
    T: FromStr,
    T::Err: Display,
{
    raw.parse()
        .map_err(|e: T::Err| json_error(StatusCode::BAD_REQUEST, "invalid_id", format!("invalid {what}: {e}")))
}

/// Check the caller may dispatch `command`, handing the command back.
pub fn authorized<C>(ctx: &RequestCtx, command: C, permission: &'static str) -> Result<C, Response> {
    let cmd_auth = CmdAuth::new(command, permission);
    authorize_command(&ctx.services.policy, &ctx.tenant, &ctx.principal, &cmd_auth).map_err(forbidden)?;
    Ok(cmd_auth.inner)
}

pub fn require(ctx: &RequestCtx, permission: &'static str) -> Result<(), Response> {
    require_permission(&ctx.services.policy, &ctx.tenant, &ctx.principal, permission).map_err(forbidden)
}

pub fn created(id: impl Display, committed: &[StoredEvent]) -> Response {
    (
        StatusCode::CREATED,
        Json(json!({"id": id.to_string(), "events_committed": committed.len()})),
    )
        .into_response()
}

pub fn accepted(id: impl Display, committed: &[StoredEvent]) -> Response {
    (
        StatusCode::OK,
        Json(json!({"id": id.to_string(), "events_committed": committed.len()})),
    )
        .into_response()
}

pub fn json<T: Serialize>(value: T) -> Response {
    (StatusCode::OK, Json(value)).into_response()
}

pub fn items<T: Serialize>(items: Vec<T>) -> Response {
    json(json!({ "items": items }))
}

pub fn today() -> NaiveDate {
    Utc::now().date_naive()
}

pub fn csv_body(text: String) -> Response {
    (
        StatusCode::OK,
        [(axum::http::header::CONTENT_TYPE, "text/csv; charset=utf-8")],
        text,
    )
        .into_response()
}
