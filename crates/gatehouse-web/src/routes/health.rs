use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use gatehouse::{AppError, ErrorCode};
use serde_json::json;
use std::sync::Arc;

use crate::handler::{handler_fn, BoxHandler};
use crate::metrics::Metrics;
use crate::shutdown::Shutdown;

/// `GET /liveness`: the process is up.
pub fn liveness() -> BoxHandler {
    handler_fn(|_ctx, _req| {
        Box::pin(async { Ok((StatusCode::OK, Json(json!({ "status": "ok" }))).into_response()) })
    })
}

/// `GET /readiness`: accepting work until shutdown has been requested.
pub fn readiness(shutdown: Shutdown) -> BoxHandler {
    handler_fn(move |_ctx, _req| {
        let draining = shutdown.is_triggered();
        Box::pin(async move {
            if draining {
                return Err(AppError::new(ErrorCode::Unavailable, "shutting down").into());
            }
            Ok((StatusCode::OK, Json(json!({ "status": "ok" }))).into_response())
        })
    })
}

/// `GET /debug/vars`: current request counters.
pub fn debug_vars(metrics: Arc<Metrics>) -> BoxHandler {
    handler_fn(move |_ctx, _req| {
        let snapshot = metrics.snapshot();
        Box::pin(async move { Ok(Json(snapshot).into_response()) })
    })
}
