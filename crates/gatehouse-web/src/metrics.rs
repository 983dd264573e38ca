//! Request counters shared by the metrics and panic middleware.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

#[cfg(feature = "metrics")]
use metrics::{counter, gauge};

/// How often, in requests, the live task count is re-sampled.
pub const TASK_SAMPLE_INTERVAL: u64 = 1000;

/// Process-wide counters.
///
/// Built once at startup and handed to the middleware that update it; handlers
/// only ever read a [`MetricsSnapshot`].
#[derive(Debug, Default)]
pub struct Metrics {
    requests: AtomicU64,
    errors: AtomicU64,
    panics: AtomicU64,
    tasks: AtomicU64,
}

/// Point-in-time copy of [`Metrics`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub requests: u64,
    pub errors: u64,
    pub panics: u64,
    pub tasks: u64,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count a request and return the new total.
    pub fn add_request(&self) -> u64 {
        #[cfg(feature = "metrics")]
        counter!("gatehouse_requests_total").increment(1);
        self.requests.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn add_error(&self) -> u64 {
        #[cfg(feature = "metrics")]
        counter!("gatehouse_errors_total").increment(1);
        self.errors.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn add_panic(&self) -> u64 {
        #[cfg(feature = "metrics")]
        counter!("gatehouse_panics_total").increment(1);
        self.panics.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Record the number of tasks alive on the current tokio runtime.
    pub fn sample_tasks(&self) {
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            return;
        };
        let alive = handle.metrics().num_alive_tasks() as u64;
        #[cfg(feature = "metrics")]
        gauge!("gatehouse_tasks").set(alive as f64);
        self.tasks.store(alive, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            requests: self.requests.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
            panics: self.panics.load(Ordering::Relaxed),
            tasks: self.tasks.load(Ordering::Relaxed),
        }
    }
}

#[cfg(feature = "metrics")]
mod prometheus {
    use axum::http::header;
    use axum::response::IntoResponse;
    use axum::routing::get;
    use axum::Router;
    use gatehouse::AppError;
    use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
    use std::sync::OnceLock;

    static PROMETHEUS_HANDLE: OnceLock<Option<PrometheusHandle>> = OnceLock::new();

    fn handle() -> Option<&'static PrometheusHandle> {
        PROMETHEUS_HANDLE
            .get_or_init(|| match PrometheusBuilder::new().install_recorder() {
                Ok(handle) => Some(handle),
                Err(err) => {
                    tracing::error!(error = %err, "failed to install Prometheus recorder");
                    None
                }
            })
            .as_ref()
    }

    /// Router exposing the Prometheus scrape endpoint at `path`.
    pub fn prometheus_routes(path: &str) -> Router {
        handle();
        Router::new().route(path, get(render))
    }

    async fn render() -> axum::response::Response {
        match handle() {
            Some(handle) => (
                [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
                handle.render(),
            )
                .into_response(),
            None => AppError::internal().into_response(),
        }
    }
}

#[cfg(feature = "metrics")]
pub use prometheus::prometheus_routes;
