//! Fabrik Server - Industrial telemetry platform
//!
//! Library interface exposing the HTTP API, configuration, and the
//! background import-job engine.

pub mod api;
pub mod config;
pub mod error;
pub mod import;

pub use error::{ApiResult, AppError};
