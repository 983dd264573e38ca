//! Handlers, middleware and the chain that composes them.

use axum::body::Body;
use axum::http::Request;
use axum::response::Response;
use gatehouse::AppError;
use gatehouse_auth::AuthError;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::{fmt, io};

use crate::context::RequestContext;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

pub type HandlerResult = Result<Response, HandlerError>;

/// Anything that can fail inside the chain.
#[derive(Debug)]
pub enum HandlerError {
    /// Already classified; sent to the client as-is.
    App(AppError),
    /// I/O failure while serving the request.
    Io(io::Error),
    /// The service asked to be shut down.
    Shutdown(String),
    /// Anything else. Reported as `unknown`.
    Other(Box<dyn std::error::Error + Send + Sync>),
}

impl HandlerError {
    pub fn other(err: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        Self::Other(err.into())
    }

    /// Whether this failure should stop the service.
    ///
    /// Dropped connections are the client's problem; any other I/O error means
    /// the process itself is in trouble.
    pub fn requires_shutdown(&self) -> bool {
        match self {
            Self::Shutdown(_) => true,
            Self::Io(err) => !matches!(
                err.kind(),
                io::ErrorKind::BrokenPipe
                    | io::ErrorKind::ConnectionReset
                    | io::ErrorKind::ConnectionAborted
            ),
            Self::App(_) | Self::Other(_) => false,
        }
    }

    /// Classify for the client. Unclassified errors keep their text in the
    /// server-side detail only.
    pub fn into_app_error(self) -> AppError {
        match self {
            Self::App(err) => err,
            other => AppError::unknown().with_detail(other.to_string()),
        }
    }
}

impl fmt::Display for HandlerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::App(err) => write!(f, "{}", err),
            Self::Io(err) => write!(f, "io: {}", err),
            Self::Shutdown(reason) => write!(f, "shutdown requested: {}", reason),
            Self::Other(err) => write!(f, "{}", err),
        }
    }
}

impl std::error::Error for HandlerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::App(err) => Some(err),
            Self::Io(err) => Some(err),
            Self::Shutdown(_) => None,
            Self::Other(err) => Some(err.as_ref()),
        }
    }
}

impl From<AppError> for HandlerError {
    fn from(err: AppError) -> Self {
        Self::App(err)
    }
}

impl From<AuthError> for HandlerError {
    fn from(err: AuthError) -> Self {
        Self::App(err.into())
    }
}

impl From<io::Error> for HandlerError {
    fn from(err: io::Error) -> Self {
        Self::Io(err)
    }
}

/// A request handler: a terminal route function, or a middleware wrapping one.
pub trait Handler: Send + Sync + 'static {
    fn call<'a>(
        &'a self,
        ctx: &'a mut RequestContext,
        req: Request<Body>,
    ) -> BoxFuture<'a, HandlerResult>;
}

pub type BoxHandler = Arc<dyn Handler>;

/// Wraps a handler with extra behavior on the way in and out.
pub trait Middleware: Send + Sync + 'static {
    fn wrap(&self, next: BoxHandler) -> BoxHandler;
}

/// Terminal handler built from a closure. Records the status of a successful
/// response on the context.
pub struct HandlerFn<F> {
    f: F,
}

/// Turn a closure into a [`BoxHandler`].
///
/// ```rust,ignore
/// let hello = handler_fn(|ctx, _req| {
///     Box::pin(async move {
///         let user = ctx.require_user_id()?;
///         Ok(Json(json!({ "user": user })).into_response())
///     })
/// });
/// ```
pub fn handler_fn<F>(f: F) -> BoxHandler
where
    F: for<'a> Fn(&'a mut RequestContext, Request<Body>) -> BoxFuture<'a, HandlerResult>
        + Send
        + Sync
        + 'static,
{
    Arc::new(HandlerFn { f })
}

impl<F> Handler for HandlerFn<F>
where
    F: for<'a> Fn(&'a mut RequestContext, Request<Body>) -> BoxFuture<'a, HandlerResult>
        + Send
        + Sync
        + 'static,
{
    fn call<'a>(
        &'a self,
        ctx: &'a mut RequestContext,
        req: Request<Body>,
    ) -> BoxFuture<'a, HandlerResult> {
        Box::pin(async move {
            let response = (self.f)(&mut *ctx, req).await?;
            ctx.set_status(response.status());
            Ok(response)
        })
    }
}

/// Ordered list of middleware. The first one added sees the request first
/// and the response last.
#[derive(Clone, Default)]
pub struct Chain {
    layers: Vec<Arc<dyn Middleware>>,
}

impl Chain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, middleware: impl Middleware) -> Self {
        self.layers.push(Arc::new(middleware));
        self
    }

    /// Append every layer of `inner` beneath the current ones.
    pub fn append(mut self, inner: &Chain) -> Self {
        self.layers.extend(inner.layers.iter().cloned());
        self
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    /// Wrap `handler` in every layer.
    pub fn then(&self, handler: BoxHandler) -> BoxHandler {
        self.layers
            .iter()
            .rev()
            .fold(handler, |next, middleware| middleware.wrap(next))
    }
}

impl fmt::Debug for Chain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Chain").field("layers", &self.layers.len()).finish()
    }
}
