//! Adapter between axum routing and the middleware chain.

use axum::body::Body;
use axum::http::{HeaderName, HeaderValue, Request};
use axum::response::{IntoResponse, Response};
use axum::routing::{MethodFilter, MethodRouter};
use axum::Router;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use crate::context::RequestContext;
use crate::handler::{BoxFuture, BoxHandler, Chain, Handler, Middleware};
use crate::metrics::Metrics;
use crate::mid::Deadline;
use crate::routes;
use crate::shutdown::Shutdown;

pub const X_REQUEST_ID: HeaderName = HeaderName::from_static("x-request-id");

/// Route table where every route runs through the application chain.
///
/// Handlers are wrapped when [`App::into_router`] is called, so the order of
/// `handle` and `with_timeout` does not matter.
///
/// # Example
///
/// ```rust,ignore
/// let router = App::new(app_chain)
///     .with_health_routes(shutdown.clone(), metrics.clone())
///     .handle(MethodFilter::GET, "/auth/whoami", &user_only, whoami())
///     .with_timeout(config.request_timeout())
///     .into_router();
/// ```
pub struct App {
    chain: Chain,
    routes: BTreeMap<String, Vec<Registration>>,
    merged: Vec<Router>,
    timeout: Option<Duration>,
}

struct Registration {
    method: MethodFilter,
    /// `None` for bare routes.
    chain: Option<Chain>,
    handler: BoxHandler,
}

impl App {
    pub fn new(chain: Chain) -> Self {
        Self {
            chain,
            routes: BTreeMap::new(),
            merged: Vec::new(),
            timeout: None,
        }
    }

    /// Register `handler` behind the application chain followed by `route`.
    pub fn handle(
        self,
        method: MethodFilter,
        path: &str,
        route: &Chain,
        handler: BoxHandler,
    ) -> Self {
        self.register(method, path, Some(route.clone()), handler)
    }

    /// Register `handler` with no middleware at all.
    pub fn handle_bare(self, method: MethodFilter, path: &str, handler: BoxHandler) -> Self {
        self.register(method, path, None, handler)
    }

    /// Liveness, readiness and debug counters on the bare chain.
    pub fn with_health_routes(self, shutdown: Shutdown, metrics: Arc<Metrics>) -> Self {
        self.handle_bare(MethodFilter::GET, "/liveness", routes::liveness())
            .handle_bare(MethodFilter::GET, "/readiness", routes::readiness(shutdown))
            .handle_bare(MethodFilter::GET, "/debug/vars", routes::debug_vars(metrics))
    }

    /// Merge a plain axum router, bypassing the chain.
    pub fn merge(mut self, router: Router) -> Self {
        self.merged.push(router);
        self
    }

    /// Fail requests that run longer than `timeout` with `deadline_exceeded`.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    fn register(
        mut self,
        method: MethodFilter,
        path: &str,
        chain: Option<Chain>,
        handler: BoxHandler,
    ) -> Self {
        self.routes
            .entry(path.to_string())
            .or_default()
            .push(Registration {
                method,
                chain,
                handler,
            });
        self
    }

    /// Wrap `handler` in the application chain, the deadline and `route`.
    fn wrap(&self, route: Option<&Chain>, handler: BoxHandler) -> BoxHandler {
        let deadline = self.timeout.map(Deadline::new);
        match route {
            Some(route) => {
                let mut chain = self.chain.clone();
                if let Some(deadline) = deadline {
                    chain = chain.with(deadline);
                }
                chain.append(route).then(handler)
            }
            None => match deadline {
                Some(deadline) => deadline.wrap(handler),
                None => handler,
            },
        }
    }

    pub fn into_router(self) -> Router {
        let empty = Chain::new();
        let mut router = Router::new();

        for (path, registrations) in &self.routes {
            let mut route: Option<MethodRouter> = None;
            for reg in registrations {
                let endpoint = endpoint(self.wrap(reg.chain.as_ref(), Arc::clone(&reg.handler)));
                route = Some(match route {
                    Some(existing) => existing.on(reg.method, endpoint),
                    None => axum::routing::on(reg.method, endpoint),
                });
            }
            if let Some(route) = route {
                let not_allowed = self.wrap(Some(&empty), routes::method_not_allowed());
                router = router.route(path, route.fallback(endpoint(not_allowed)));
            }
        }

        for other in &self.merged {
            router = router.merge(other.clone());
        }

        router.fallback(endpoint(self.wrap(Some(&empty), routes::not_found())))
    }
}

/// Adapt a chain-wrapped handler into an axum handler.
fn endpoint(
    handler: BoxHandler,
) -> impl Fn(Request<Body>) -> BoxFuture<'static, Response> + Clone + Send + Sync + 'static {
    move |req: Request<Body>| -> BoxFuture<'static, Response> {
        let handler = Arc::clone(&handler);
        Box::pin(async move { dispatch(handler.as_ref(), req).await })
    }
}

/// Run one request through `handler` with a fresh context.
async fn dispatch(handler: &dyn Handler, req: Request<Body>) -> Response {
    let mut ctx = RequestContext::new();

    let mut response = match handler.call(&mut ctx, req).await {
        Ok(response) => response,
        Err(err) => err.into_app_error().into_response(),
    };

    if let Ok(value) = HeaderValue::from_str(ctx.trace_id()) {
        response.headers_mut().insert(X_REQUEST_ID, value);
    }
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::handler_fn;
    use crate::mid::{
        Authenticate, Authorize, ErrorTranslation, Logger, PanicRecovery, RequestMetrics,
    };
    use axum::http::{header, StatusCode};
    use axum::Json;
    use gatehouse_auth::{Claims, KeyStore, TokenAuthority};
    use http_body_util::BodyExt;
    use serde_json::json;
    use std::path::Path;
    use tower::ServiceExt;
    use uuid::Uuid;

    const KID: &str = "54bb2165-71e1-41a6-af3e-7da4a0e1e2c1";

    struct Fixture {
        router: Router,
        authority: Arc<TokenAuthority>,
        metrics: Arc<Metrics>,
        shutdown: Shutdown,
    }

    fn whoami() -> BoxHandler {
        handler_fn(|ctx, _req| {
            Box::pin(async move {
                let user = ctx.require_user_id()?;
                let roles = ctx.claims().map(|c| c.roles.clone()).unwrap_or_default();
                Ok(Json(json!({ "user": user, "roles": roles })).into_response())
            })
        })
    }

    fn boom() -> BoxHandler {
        handler_fn(|_ctx, _req| {
            Box::pin(async {
                if true {
                    panic!("boom");
                }
                Ok(StatusCode::OK.into_response())
            })
        })
    }

    fn slow() -> BoxHandler {
        handler_fn(|_ctx, _req| {
            Box::pin(async {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok(StatusCode::OK.into_response())
            })
        })
    }

    fn fixture() -> Fixture {
        let keys = KeyStore::load(Path::new(env!("CARGO_MANIFEST_DIR")).join("../../testdata/keys"))
            .unwrap();
        let authority = Arc::new(TokenAuthority::new(Arc::new(keys), "gatehouse"));
        let metrics = Arc::new(Metrics::new());
        let shutdown = Shutdown::new();

        let app_chain = Chain::new()
            .with(Logger)
            .with(ErrorTranslation::new(shutdown.clone()))
            .with(RequestMetrics::new(Arc::clone(&metrics)))
            .with(PanicRecovery::new(Arc::clone(&metrics)));
        let user = Chain::new()
            .with(Authenticate::new(Arc::clone(&authority)))
            .with(Authorize::new(Arc::clone(&authority), "user"));
        let admin = Chain::new()
            .with(Authenticate::new(Arc::clone(&authority)))
            .with(Authorize::new(Arc::clone(&authority), "admin"));

        let router = App::new(app_chain)
            .with_health_routes(shutdown.clone(), Arc::clone(&metrics))
            .handle(MethodFilter::GET, "/whoami", &user, whoami())
            .handle(MethodFilter::GET, "/admin", &admin, whoami())
            .handle(MethodFilter::POST, "/admin", &admin, boom())
            .handle(MethodFilter::GET, "/boom", &Chain::new(), boom())
            .handle(MethodFilter::GET, "/slow", &Chain::new(), slow())
            .with_timeout(Duration::from_secs(5))
            .into_router();

        Fixture {
            router,
            authority,
            metrics,
            shutdown,
        }
    }

    fn token(authority: &TokenAuthority, roles: &[&str]) -> String {
        let claims = Claims::new(Uuid::new_v4(), "gatehouse", Duration::from_secs(300))
            .with_roles(roles.iter().copied());
        format!("Bearer {}", authority.generate_token(KID, &claims).unwrap())
    }

    fn get(uri: &str, authorization: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder().uri(uri);
        if let Some(value) = authorization {
            builder = builder.header(header::AUTHORIZATION, value);
        }
        builder.body(Body::empty()).unwrap()
    }

    async fn send(router: &Router, req: Request<Body>) -> (StatusCode, serde_json::Value) {
        let response = router.clone().oneshot(req).await.unwrap();
        assert!(response.headers().contains_key(X_REQUEST_ID));
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        (status, serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null))
    }

    #[tokio::test]
    async fn authorized_user_reaches_handler() {
        let fx = fixture();
        let bearer = token(&fx.authority, &["user"]);
        let (status, body) = send(&fx.router, get("/whoami", Some(bearer.as_str()))).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["roles"], json!(["user"]));
        assert!(Uuid::parse_str(body["user"].as_str().unwrap()).is_ok());
    }

    #[tokio::test]
    async fn role_and_credential_failures_use_canonical_bodies() {
        let fx = fixture();

        let bearer = token(&fx.authority, &["user"]);
        let (status, body) = send(&fx.router, get("/admin", Some(bearer.as_str()))).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body, json!({"code": "permission_denied", "message": "permission denied"}));

        let (status, body) = send(&fx.router, get("/admin", Some("Basic abcd"))).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body, json!({"code": "unauthenticated", "message": "unauthenticated"}));

        let (status, _) = send(&fx.router, get("/whoami", None)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        assert_eq!(fx.metrics.snapshot().errors, 3);
    }

    #[tokio::test]
    async fn panic_yields_single_internal_response() {
        let fx = fixture();

        let (status, body) = send(&fx.router, get("/boom", None)).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body, json!({"code": "internal", "message": "internal error"}));
        assert_eq!(fx.metrics.snapshot().panics, 1);

        let (status, _) = send(&fx.router, get("/liveness", None)).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn same_path_accepts_several_methods() {
        let fx = fixture();
        let admin = token(&fx.authority, &["admin"]);

        let (status, _) = send(&fx.router, get("/admin", Some(admin.as_str()))).await;
        assert_eq!(status, StatusCode::OK);

        let req = Request::builder()
            .method("POST")
            .uri("/admin")
            .header(header::AUTHORIZATION, &admin)
            .body(Body::empty())
            .unwrap();
        let (status, _) = send(&fx.router, req).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn health_routes_skip_the_chain() {
        let fx = fixture();

        let (status, body) = send(&fx.router, get("/liveness", None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"status": "ok"}));

        let (status, _) = send(&fx.router, get("/readiness", None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(fx.metrics.snapshot().requests, 0);

        fx.shutdown.trigger("test");
        let (status, body) = send(&fx.router, get("/readiness", None)).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["code"], "unavailable");
    }

    #[tokio::test]
    async fn debug_vars_reflect_chain_traffic() {
        let fx = fixture();
        send(&fx.router, get("/whoami", None)).await;

        let (status, body) = send(&fx.router, get("/debug/vars", None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["requests"], 1);
        assert_eq!(body["errors"], 1);
    }

    #[tokio::test]
    async fn unknown_route_is_json_not_found() {
        let fx = fixture();
        let (status, body) = send(&fx.router, get("/missing", None)).await;

        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["code"], "not_found");
    }

    #[tokio::test(start_paused = true)]
    async fn timed_out_request_is_canonical_and_counted() {
        let fx = fixture();

        let (status, body) = send(&fx.router, get("/slow", None)).await;
        assert_eq!(status, StatusCode::GATEWAY_TIMEOUT);
        assert_eq!(
            body,
            json!({"code": "deadline_exceeded", "message": "request timed out"})
        );

        let snapshot = fx.metrics.snapshot();
        assert_eq!(snapshot.requests, 1);
        assert_eq!(snapshot.errors, 1);
    }

    #[tokio::test]
    async fn wrong_method_is_json_through_the_chain() {
        let fx = fixture();
        let req = Request::builder()
            .method("DELETE")
            .uri("/whoami")
            .body(Body::empty())
            .unwrap();

        let (status, body) = send(&fx.router, req).await;
        assert_eq!(status, StatusCode::NOT_IMPLEMENTED);
        assert_eq!(
            body,
            json!({"code": "unimplemented", "message": "method not allowed"})
        );
        assert_eq!(fx.metrics.snapshot().errors, 1);
    }

    #[tokio::test]
    async fn request_ids_are_unique() {
        let fx = fixture();
        let a = fx.router.clone().oneshot(get("/liveness", None)).await.unwrap();
        let b = fx.router.clone().oneshot(get("/liveness", None)).await.unwrap();

        assert_ne!(a.headers()[X_REQUEST_ID], b.headers()[X_REQUEST_ID]);
    }
}
