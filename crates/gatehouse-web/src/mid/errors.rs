use axum::body::Body;
use axum::http::Request;
use axum::response::IntoResponse;
use std::sync::Arc;

use crate::context::RequestContext;
use crate::handler::{BoxFuture, BoxHandler, Handler, HandlerResult, Middleware};
use crate::shutdown::Shutdown;

/// Turns errors from the inner chain into `{code, message}` responses.
///
/// Every error is logged with its server-side detail. Errors that mean the
/// process can no longer serve correctly also trigger graceful shutdown.
#[derive(Debug, Clone)]
pub struct ErrorTranslation {
    shutdown: Shutdown,
}

impl ErrorTranslation {
    pub fn new(shutdown: Shutdown) -> Self {
        Self { shutdown }
    }
}

impl Middleware for ErrorTranslation {
    fn wrap(&self, next: BoxHandler) -> BoxHandler {
        Arc::new(ErrorTranslationHandler {
            shutdown: self.shutdown.clone(),
            next,
        })
    }
}

struct ErrorTranslationHandler {
    shutdown: Shutdown,
    next: BoxHandler,
}

impl Handler for ErrorTranslationHandler {
    fn call<'a>(
        &'a self,
        ctx: &'a mut RequestContext,
        req: Request<Body>,
    ) -> BoxFuture<'a, HandlerResult> {
        Box::pin(async move {
            let err = match self.next.call(ctx, req).await {
                Ok(response) => return Ok(response),
                Err(err) => err,
            };

            let shutdown = err.requires_shutdown();
            let reason = err.to_string();
            let app = err.into_app_error();

            tracing::error!(
                code = %app.code,
                message = %app.message,
                detail = app.detail().unwrap_or_default(),
                "request failed"
            );

            let response = app.into_response();
            ctx.set_status(response.status());

            if shutdown {
                self.shutdown.trigger(&reason);
            }

            Ok(response)
        })
    }
}
