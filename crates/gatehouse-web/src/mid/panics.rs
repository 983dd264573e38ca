use axum::body::Body;
use axum::http::Request;
use futures_util::FutureExt;
use gatehouse::AppError;
use std::any::Any;
use std::backtrace::Backtrace;
use std::cell::RefCell;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Once};

use crate::context::RequestContext;
use crate::handler::{BoxFuture, BoxHandler, Handler, HandlerError, HandlerResult, Middleware};
use crate::metrics::Metrics;

thread_local! {
    static LAST_BACKTRACE: RefCell<Option<String>> = const { RefCell::new(None) };
}

static INSTALL_HOOK: Once = Once::new();

/// Chain a panic hook that stashes a backtrace for the panicking thread.
///
/// The unwind is caught on the same thread that polled the panicking future,
/// so the backtrace can be picked up right after `catch_unwind` returns.
fn install_backtrace_hook() {
    INSTALL_HOOK.call_once(|| {
        let previous = std::panic::take_hook();
        std::panic::set_hook(Box::new(move |info| {
            let trace = Backtrace::force_capture().to_string();
            LAST_BACKTRACE.with(|slot| *slot.borrow_mut() = Some(trace));
            previous(info);
        }));
    });
}

fn take_backtrace() -> String {
    LAST_BACKTRACE
        .with(|slot| slot.borrow_mut().take())
        .unwrap_or_else(|| "<no backtrace>".to_string())
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Converts a panic anywhere beneath it into an `internal` error.
///
/// The panic message and backtrace go into the error detail; the client only
/// sees the generic internal error.
#[derive(Debug, Clone)]
pub struct PanicRecovery {
    metrics: Arc<Metrics>,
}

impl PanicRecovery {
    pub fn new(metrics: Arc<Metrics>) -> Self {
        install_backtrace_hook();
        Self { metrics }
    }
}

impl Middleware for PanicRecovery {
    fn wrap(&self, next: BoxHandler) -> BoxHandler {
        Arc::new(PanicRecoveryHandler {
            metrics: Arc::clone(&self.metrics),
            next,
        })
    }
}

struct PanicRecoveryHandler {
    metrics: Arc<Metrics>,
    next: BoxHandler,
}

impl Handler for PanicRecoveryHandler {
    fn call<'a>(
        &'a self,
        ctx: &'a mut RequestContext,
        req: Request<Body>,
    ) -> BoxFuture<'a, HandlerResult> {
        Box::pin(async move {
            match AssertUnwindSafe(self.next.call(ctx, req)).catch_unwind().await {
                Ok(result) => result,
                Err(payload) => {
                    let message = panic_message(payload.as_ref());
                    let trace = take_backtrace();
                    self.metrics.add_panic();

                    Err(HandlerError::App(
                        AppError::internal()
                            .with_detail(format!("PANIC [{}] TRACE [{}]", message, trace)),
                    ))
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::Chain;
    use crate::mid::testing::{ok_handler, panicking_handler, request};
    use crate::mid::{ErrorTranslation, RequestMetrics};
    use crate::shutdown::Shutdown;
    use axum::http::StatusCode;
    use gatehouse::ErrorCode;
    use http_body_util::BodyExt;

    #[tokio::test]
    async fn panic_becomes_internal_error() {
        let metrics = Arc::new(Metrics::new());
        let handler = Chain::new()
            .with(PanicRecovery::new(Arc::clone(&metrics)))
            .then(panicking_handler());

        let err = match handler.call(&mut RequestContext::new(), request()).await {
            Err(HandlerError::App(err)) => err,
            other => panic!("expected app error, got {:?}", other.map(|r| r.status())),
        };

        assert_eq!(err.code, ErrorCode::Internal);
        assert_eq!(err.message, "internal error");
        let detail = err.detail().unwrap();
        assert!(detail.starts_with("PANIC [handler blew up] TRACE ["), "{detail}");
        assert_eq!(metrics.snapshot().panics, 1);
    }

    #[tokio::test]
    async fn full_chain_answers_once_and_keeps_serving() {
        let metrics = Arc::new(Metrics::new());
        let shutdown = Shutdown::new();
        let app = Chain::new()
            .with(ErrorTranslation::new(shutdown.clone()))
            .with(RequestMetrics::new(Arc::clone(&metrics)))
            .with(PanicRecovery::new(Arc::clone(&metrics)));

        let mut ctx = RequestContext::new();
        let response = app
            .then(panicking_handler())
            .call(&mut ctx, request())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(ctx.status(), Some(StatusCode::INTERNAL_SERVER_ERROR));
        let body = response.into_body().collect().await.unwrap().to_bytes();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"code": "internal", "message": "internal error"})
        );

        let snap = metrics.snapshot();
        assert_eq!(snap.panics, 1);
        assert_eq!(snap.errors, 1);
        assert!(!shutdown.is_triggered());

        let response = app
            .then(ok_handler())
            .call(&mut RequestContext::new(), request())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(metrics.snapshot().requests, 2);
    }

    #[test]
    fn panic_message_handles_payload_types() {
        assert_eq!(panic_message(&"static"), "static");
        assert_eq!(panic_message(&String::from("owned")), "owned");
        assert_eq!(panic_message(&42_u32), "unknown panic");
    }
}
