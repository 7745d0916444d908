//! Cross-cutting HTTP middleware
//!
//! Authentication and permission gates live in [`crate::auth`].
//!
//! Author: hephaex@gmail.com

pub mod metrics;
pub mod security_headers;

pub use metrics::{metrics_middleware, ApiMetrics};
pub use security_headers::security_headers_middleware;
