//! # HTTP Middleware
//!
//! - [`auth_throttle`] — per-principal authentication failure window.
//! - [`metrics`] — request, failure and authentication counters.
//! - [`tracing_layer`] — per-request tracing spans.

pub mod auth_throttle;
pub mod metrics;
pub mod tracing_layer;
