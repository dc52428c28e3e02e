//! HTTP application wiring.
//!
//! - `services.rs`: event store, bus, read models and dispatcher
//! - `routes/`: handlers, one file per business area
//! - `dto.rs`: request bodies and query strings
//! - `errors.rs`: JSON error responses

use std::sync::Arc;

use axum::http::StatusCode;
use axum::routing::get;
use axum::{Extension, Router};
use tower::ServiceBuilder;

use estateerp_auth::Hs256JwtValidator;
use estateerp_infra::config::AppConfig;

use crate::middleware;

pub mod dto;
pub mod errors;
pub mod routes;
pub mod services;

pub use services::{AppServices, StartupError};

/// Build the router and the services behind it. The caller owns the services
/// handle so it can stop the projection worker on shutdown.
pub async fn build_app(config: AppConfig) -> Result<(Router, Arc<AppServices>), StartupError> {
    let jwt = Arc::new(Hs256JwtValidator::new(config.jwt_secret.as_bytes()));
    let auth_state = middleware::AuthState { jwt };

    let services = Arc::new(services::build_services(config).await?);

    let protected = routes::router().layer(
        ServiceBuilder::new()
            .layer(axum::middleware::from_fn_with_state(auth_state, middleware::auth_middleware))
            .layer(Extension(services.clone())),
    );

    let app = Router::new()
        .route("/health", get(routes::system::health))
        .merge(protected)
        .fallback(|| async {
            errors::json_error(StatusCode::NOT_FOUND, "not_found", "no such route")
        });
    Ok((app, services))
}
