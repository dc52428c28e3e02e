//! Every failure leaves the API as `{"error": <code>, "message": <text>}`.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use tracing::error;

use estateerp_auth::AuthzError;
use estateerp_infra::command_dispatcher::DispatchError;
use estateerp_infra::data::DataError;
use estateerp_infra::event_store::EventStoreError;
use estateerp_infra::mail::MailError;
use estateerp_infra::workflows::WorkflowError;

pub type ApiResult = Result<Response, Response>;

pub fn json_error(status: StatusCode, code: &'static str, message: impl Into<String>) -> Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}

pub fn not_found(what: impl Into<String>) -> Response {
    json_error(StatusCode::NOT_FOUND, "not_found", what)
}

pub fn validation(message: impl Into<String>) -> Response {
    json_error(StatusCode::BAD_REQUEST, "validation_error", message)
}

pub fn forbidden(err: AuthzError) -> Response {
    json_error(StatusCode::FORBIDDEN, "forbidden", err.to_string())
}

pub fn store_error_to_response(err: EventStoreError) -> Response {
    error!(error = %err, "event store failure");
    json_error(StatusCode::INTERNAL_SERVER_ERROR, "store_error", err.to_string())
}

pub fn dispatch_error_to_response(err: DispatchError) -> Response {
    match err {
        DispatchError::Concurrency(msg) => json_error(StatusCode::CONFLICT, "conflict", msg),
        DispatchError::Conflict(msg) => json_error(StatusCode::CONFLICT, "conflict", msg),
        DispatchError::Validation(msg) => json_error(StatusCode::BAD_REQUEST, "validation_error", msg),
        DispatchError::InvariantViolation(msg) => {
            json_error(StatusCode::UNPROCESSABLE_ENTITY, "invariant_violation", msg)
        }
        DispatchError::Unauthorized => json_error(StatusCode::FORBIDDEN, "forbidden", "not allowed"),
        DispatchError::NotFound => not_found("not found"),
        DispatchError::Deserialize(msg) => {
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "deserialize_error", msg)
        }
        DispatchError::Store(e) => store_error_to_response(e),
        DispatchError::Publish(msg) => json_error(StatusCode::BAD_GATEWAY, "publish_error", msg),
        DispatchError::TenantIsolation(msg) => json_error(StatusCode::FORBIDDEN, "tenant_isolation", msg),
    }
}

pub fn workflow_error_to_response(err: WorkflowError) -> Response {
    match err {
        WorkflowError::Dispatch(e) => dispatch_error_to_response(e),
        WorkflowError::Mail(MailError::InvalidRecipient(addr)) => {
            validation(format!("invalid recipient: {addr}"))
        }
        WorkflowError::Mail(e @ MailError::Transport(_)) => {
            json_error(StatusCode::BAD_GATEWAY, "mail_error", e.to_string())
        }
        WorkflowError::Validation(msg) => validation(msg),
        WorkflowError::NotFound(msg) => not_found(msg),
        WorkflowError::Decode(msg) => json_error(StatusCode::INTERNAL_SERVER_ERROR, "deserialize_error", msg),
    }
}

pub fn data_error_to_response(err: DataError) -> Response {
    match err {
        DataError::Csv(msg) => json_error(StatusCode::BAD_REQUEST, "invalid_csv", msg),
        DataError::Json(msg) => json_error(StatusCode::BAD_REQUEST, "invalid_json", msg),
        DataError::Invalid(msg) => validation(msg),
        e @ DataError::TenantNotEmpty(_) => json_error(StatusCode::CONFLICT, "conflict", e.to_string()),
        DataError::Store(e) => store_error_to_response(e),
        DataError::Dispatch(e) => dispatch_error_to_response(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statuses_follow_the_error_kind() {
        let cases = [
            (DispatchError::Validation("x".into()), StatusCode::BAD_REQUEST),
            (DispatchError::InvariantViolation("x".into()), StatusCode::UNPROCESSABLE_ENTITY),
            (DispatchError::Concurrency("x".into()), StatusCode::CONFLICT),
            (DispatchError::NotFound, StatusCode::NOT_FOUND),
            (
                DispatchError::Store(EventStoreError::Backend("down".into())),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (err, status) in cases {
            assert_eq!(dispatch_error_to_response(err).status(), status);
        }
        assert_eq!(
            data_error_to_response(DataError::TenantNotEmpty(3)).status(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            workflow_error_to_response(WorkflowError::NotFound("order".into())).status(),
            StatusCode::NOT_FOUND
        );
    }
}
