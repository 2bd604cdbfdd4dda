//! Fabrik Common Library
//!
//! Shared error handling and logging initialization for the Fabrik
//! workspace members.

pub mod error;
pub mod logging;

// Re-export commonly used types
pub use error::{FabrikError, Result};
