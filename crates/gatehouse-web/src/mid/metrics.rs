use axum::body::Body;
use axum::http::Request;
use std::sync::Arc;

use crate::context::RequestContext;
use crate::handler::{BoxFuture, BoxHandler, Handler, HandlerResult, Middleware};
use crate::metrics::{Metrics, TASK_SAMPLE_INTERVAL};

/// Counts requests and errors.
#[derive(Debug, Clone)]
pub struct RequestMetrics {
    metrics: Arc<Metrics>,
}

impl RequestMetrics {
    pub fn new(metrics: Arc<Metrics>) -> Self {
        Self { metrics }
    }
}

impl Middleware for RequestMetrics {
    fn wrap(&self, next: BoxHandler) -> BoxHandler {
        Arc::new(RequestMetricsHandler {
            metrics: Arc::clone(&self.metrics),
            next,
        })
    }
}

struct RequestMetricsHandler {
    metrics: Arc<Metrics>,
    next: BoxHandler,
}

impl Handler for RequestMetricsHandler {
    fn call<'a>(
        &'a self,
        ctx: &'a mut RequestContext,
        req: Request<Body>,
    ) -> BoxFuture<'a, HandlerResult> {
        Box::pin(async move {
            let result = self.next.call(ctx, req).await;

            if self.metrics.add_request() % TASK_SAMPLE_INTERVAL == 0 {
                self.metrics.sample_tasks();
            }
            if result.is_err() {
                self.metrics.add_error();
            }

            result
        })
    }
}
