//! # gatehouse-web
//!
//! Runs HTTP requests through an explicit middleware chain on top of axum.
//!
//! Each request gets a fresh [`RequestContext`] and passes through the
//! application [`Chain`] (logging, error translation, metrics, panic recovery),
//! then through any route chain (authentication, authorization), and finally
//! reaches the handler. Health checks are registered without middleware.
//!
//! ## Features
//!
//! - `tracing` (default) - Logging initialization via `gatehouse`
//! - `metrics` - Mirror counters into `metrics` and expose a Prometheus endpoint

mod app;
mod config;
mod context;
mod handler;
mod metrics;
pub mod mid;
mod routes;
mod server;
mod shutdown;

pub use app::{App, X_REQUEST_ID};
pub use config::{AuthConfig, ServerConfig};
pub use context::RequestContext;
pub use handler::{
    handler_fn, BoxFuture, BoxHandler, Chain, Handler, HandlerError, HandlerResult, Middleware,
};
pub use metrics::{Metrics, MetricsSnapshot, TASK_SAMPLE_INTERVAL};
pub use routes::{debug_vars, liveness, readiness};
pub use server::{serve_listener, serve_router, ServerError};
pub use shutdown::Shutdown;

#[cfg(feature = "metrics")]
pub use metrics::prometheus_routes;

pub use axum::http::StatusCode;
pub use axum::routing::MethodFilter;
pub use gatehouse::{AppError, ConfigBuilder, ConfigError, Environment, ErrorCode, LoggingConfig};
