//! HTTP API Module
//!
//! Health, fleet status and monitor telemetry endpoints.

mod routes;
mod telemetry;

pub use routes::{router, run_api_server, ApiState};
pub use telemetry::Telemetry;
