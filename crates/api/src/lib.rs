// Test code patterns:
#![cfg_attr(test, allow(clippy::expect_used))]
#![cfg_attr(test, allow(clippy::unwrap_used))]

//! EGLISE API Library
//!
//! HTTP surface for the parish billing platform: church-facing subscribe /
//! upgrade / dashboard routes and the operator admin panel API.

pub mod auth;
pub mod config;
pub mod error;
pub mod routes;
pub mod state;

pub use config::Config;
pub use error::{ApiError, ApiResult};
pub use state::AppState;
