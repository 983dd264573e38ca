use axum::body::Body;
use axum::http::Request;
use gatehouse::{AppError, ErrorCode};
use std::sync::Arc;
use std::time::Duration;

use crate::context::RequestContext;
use crate::handler::{BoxFuture, BoxHandler, Handler, HandlerResult, Middleware};

/// Fails the request with `deadline_exceeded` once `timeout` has elapsed.
///
/// The inner future is dropped at the deadline; the layers above still see an
/// ordinary `Err` and log, count and translate it.
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    timeout: Duration,
}

impl Deadline {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl Middleware for Deadline {
    fn wrap(&self, next: BoxHandler) -> BoxHandler {
        Arc::new(DeadlineHandler {
            timeout: self.timeout,
            next,
        })
    }
}

struct DeadlineHandler {
    timeout: Duration,
    next: BoxHandler,
}

impl Handler for DeadlineHandler {
    fn call<'a>(
        &'a self,
        ctx: &'a mut RequestContext,
        req: Request<Body>,
    ) -> BoxFuture<'a, HandlerResult> {
        Box::pin(async move {
            match tokio::time::timeout(self.timeout, self.next.call(ctx, req)).await {
                Ok(result) => result,
                Err(_) => Err(AppError::new(ErrorCode::DeadlineExceeded, "request timed out")
                    .with_detail(format!("no response within {:?}", self.timeout))
                    .into()),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::{handler_fn, Chain, HandlerError};
    use crate::mid::testing::{ok_handler, request};
    use axum::http::StatusCode;
    use axum::response::IntoResponse;

    fn slow_handler(delay: Duration) -> BoxHandler {
        handler_fn(move |_ctx, _req| {
            Box::pin(async move {
                tokio::time::sleep(delay).await;
                Ok(StatusCode::OK.into_response())
            })
        })
    }

    #[tokio::test(start_paused = true)]
    async fn slow_handler_exceeds_deadline() {
        let handler = Chain::new()
            .with(Deadline::new(Duration::from_millis(50)))
            .then(slow_handler(Duration::from_secs(5)));

        let result = handler.call(&mut RequestContext::new(), request()).await;

        assert!(matches!(
            result,
            Err(HandlerError::App(err)) if err.code == ErrorCode::DeadlineExceeded
        ));
    }

    #[tokio::test]
    async fn fast_handler_is_untouched() {
        let handler = Chain::new()
            .with(Deadline::new(Duration::from_secs(5)))
            .then(ok_handler());

        let mut ctx = RequestContext::new();
        let response = handler.call(&mut ctx, request()).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(ctx.status(), Some(StatusCode::OK));
    }
}
