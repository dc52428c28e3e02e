use axum::{routing::get, Router};

pub mod accounting;
pub mod banking;
pub mod common;
pub mod crm;
pub mod data;
pub mod hr;
pub mod inventory;
pub mod invoices;
pub mod mail;
pub mod manufacturing;
pub mod property;
pub mod system;

/// Router for all authenticated (tenant-scoped) endpoints.
pub fn router() -> Router {
    Router::new()
        .route("/whoami", get(system::whoami))
        .nest("/crm", crm::router())
        .nest("/property", property::router())
        .nest("/invoices", invoices::router())
        .nest("/accounting", accounting::router())
        .nest("/inventory", inventory::router())
        .nest("/manufacturing", manufacturing::router())
        .nest("/banking", banking::router())
        .nest("/hr", hr::router())
        .nest("/data", data::router())
        .nest("/mail", mail::router())
}
