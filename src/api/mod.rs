//! API layer
//!
//! HTTP handlers for the federation surface, the caller-resolution
//! middleware, and the Prometheus metrics endpoint.

pub mod context;
mod handlers;
pub mod metrics;

pub use context::{attach_caller, Caller};
pub use handlers::federation_router;
pub use metrics::metrics_router;
