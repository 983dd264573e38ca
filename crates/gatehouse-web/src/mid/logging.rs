use axum::body::Body;
use axum::extract::ConnectInfo;
use axum::http::Request;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::Instrument;

use crate::context::RequestContext;
use crate::handler::{BoxFuture, BoxHandler, Handler, HandlerResult, Middleware};

/// Logs every request on entry and completion inside an `http` span.
#[derive(Debug, Clone, Copy, Default)]
pub struct Logger;

impl Middleware for Logger {
    fn wrap(&self, next: BoxHandler) -> BoxHandler {
        Arc::new(LoggerHandler { next })
    }
}

struct LoggerHandler {
    next: BoxHandler,
}

impl Handler for LoggerHandler {
    fn call<'a>(
        &'a self,
        ctx: &'a mut RequestContext,
        req: Request<Body>,
    ) -> BoxFuture<'a, HandlerResult> {
        let method = req.method().clone();
        let path = req
            .uri()
            .path_and_query()
            .map(|pq| pq.as_str().to_string())
            .unwrap_or_else(|| req.uri().path().to_string());
        let remote_addr = req
            .extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.to_string())
            .unwrap_or_else(|| "-".to_string());

        let span = tracing::info_span!(
            "http",
            trace_id = %ctx.trace_id(),
            method = %method,
            path = %req.uri().path(),
        );

        Box::pin(
            async move {
                tracing::info!(
                    %method,
                    %path,
                    %remote_addr,
                    start_time_ms = ctx.start_unix_ms(),
                    "request started"
                );

                let result = self.next.call(ctx, req).await;

                let status = ctx.status().map(|s| s.as_u16()).unwrap_or_default();
                tracing::info!(
                    %method,
                    %path,
                    %remote_addr,
                    status,
                    elapsed_us = ctx.elapsed().as_micros() as u64,
                    "request completed"
                );

                result
            }
            .instrument(span),
        )
    }
}
