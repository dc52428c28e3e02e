//! HTTP API: JWT authentication, per-command authorization and the JSON
//! routes over every business area.

pub mod app;
pub mod authz;
pub mod context;
pub mod middleware;
