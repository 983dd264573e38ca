//! Request decorators.
//!
//! The application chain is assembled outermost first:
//!
//! ```rust,ignore
//! let app = Chain::new()
//!     .with(Logger)
//!     .with(ErrorTranslation::new(shutdown.clone()))
//!     .with(RequestMetrics::new(metrics.clone()))
//!     .with(PanicRecovery::new(metrics.clone()));
//!
//! let admin = Chain::new()
//!     .with(Authenticate::new(authority.clone()))
//!     .with(Authorize::new(authority.clone(), "admin"));
//! ```

mod auth;
mod deadline;
mod errors;
mod logging;
mod metrics;
mod panics;

pub use auth::{Authenticate, Authorize};
pub use deadline::Deadline;
pub use errors::ErrorTranslation;
pub use logging::Logger;
pub use metrics::RequestMetrics;
pub use panics::PanicRecovery;

#[cfg(test)]
pub(crate) mod testing {
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use axum::response::IntoResponse;

    use crate::handler::{handler_fn, BoxHandler, HandlerError};

    pub fn request() -> Request<Body> {
        Request::builder().uri("/test").body(Body::empty()).unwrap()
    }

    pub fn ok_handler() -> BoxHandler {
        handler_fn(|_ctx, _req| Box::pin(async { Ok(StatusCode::OK.into_response()) }))
    }

    pub fn failing_handler(make: fn() -> HandlerError) -> BoxHandler {
        handler_fn(move |_ctx, _req| Box::pin(async move { Err(make()) }))
    }

    pub fn panicking_handler() -> BoxHandler {
        handler_fn(|_ctx, _req| {
            Box::pin(async {
                if true {
                    panic!("handler blew up");
                }
                Ok(StatusCode::OK.into_response())
            })
        })
    }
}
