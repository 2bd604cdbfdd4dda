//! HTTP API

pub mod routes;

pub use routes::{import_jobs_routes, ApiState};
