//! REST API module for operational integrations
//!
//! Serves health, Prometheus metrics and dependency index lookups.

mod dto;
mod handlers;
mod server;

pub use dto::{DependentsResponse, ErrorResponse, HealthResponse};
pub use server::{router, run_server};
