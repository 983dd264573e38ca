use axum::body::Body;
use axum::http::{header, Request};
use gatehouse::AppError;
use gatehouse_auth::{AuthError, TokenAuthority};
use std::collections::BTreeSet;
use std::sync::Arc;

use crate::context::RequestContext;
use crate::handler::{BoxFuture, BoxHandler, Handler, HandlerResult, Middleware};

/// Requires a valid bearer token and stores its claims on the context.
#[derive(Debug, Clone)]
pub struct Authenticate {
    authority: Arc<TokenAuthority>,
}

impl Authenticate {
    pub fn new(authority: Arc<TokenAuthority>) -> Self {
        Self { authority }
    }
}

impl Middleware for Authenticate {
    fn wrap(&self, next: BoxHandler) -> BoxHandler {
        Arc::new(AuthenticateHandler {
            authority: Arc::clone(&self.authority),
            next,
        })
    }
}

struct AuthenticateHandler {
    authority: Arc<TokenAuthority>,
    next: BoxHandler,
}

impl Handler for AuthenticateHandler {
    fn call<'a>(
        &'a self,
        ctx: &'a mut RequestContext,
        req: Request<Body>,
    ) -> BoxFuture<'a, HandlerResult> {
        Box::pin(async move {
            let authorization = req
                .headers()
                .get(header::AUTHORIZATION)
                .and_then(|v| v.to_str().ok())
                .unwrap_or_default();

            let claims = match self.authority.authenticate(authorization) {
                Ok(claims) => claims,
                Err(err) => {
                    if let AuthError::Unauthenticated(cause) = &err {
                        tracing::warn!(cause = %cause, "authentication failed");
                    }
                    return Err(AppError::from(err).into());
                }
            };

            ctx.set_claims(claims);
            self.next.call(ctx, req).await
        })
    }
}

/// Requires the authenticated claims to carry a fixed role.
#[derive(Debug, Clone)]
pub struct Authorize {
    authority: Arc<TokenAuthority>,
    role: Arc<str>,
}

impl Authorize {
    pub fn new(authority: Arc<TokenAuthority>, role: impl Into<Arc<str>>) -> Self {
        Self {
            authority,
            role: role.into(),
        }
    }
}

impl Middleware for Authorize {
    fn wrap(&self, next: BoxHandler) -> BoxHandler {
        Arc::new(AuthorizeHandler {
            authority: Arc::clone(&self.authority),
            role: Arc::clone(&self.role),
            next,
        })
    }
}

struct AuthorizeHandler {
    authority: Arc<TokenAuthority>,
    role: Arc<str>,
    next: BoxHandler,
}

impl Handler for AuthorizeHandler {
    fn call<'a>(
        &'a self,
        ctx: &'a mut RequestContext,
        req: Request<Body>,
    ) -> BoxFuture<'a, HandlerResult> {
        Box::pin(async move {
            let result = match ctx.claims() {
                Some(claims) => self.authority.authorize(claims, &self.role),
                None => Err(AuthError::Forbidden {
                    role: self.role.to_string(),
                    roles: BTreeSet::new(),
                }),
            };

            if let Err(err) = result {
                tracing::warn!(role = %self.role, user_id = ?ctx.user_id(), "authorization failed");
                return Err(AppError::from(err).into());
            }

            self.next.call(ctx, req).await
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::{handler_fn, Chain, HandlerError};
    use crate::mid::testing::request;
    use axum::http::StatusCode;
    use axum::response::IntoResponse;
    use gatehouse::ErrorCode;
    use gatehouse_auth::{Claims, KeyStore};
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use uuid::Uuid;

    const KID: &str = "54bb2165-71e1-41a6-af3e-7da4a0e1e2c1";

    fn authority() -> Arc<TokenAuthority> {
        let keys = KeyStore::load(Path::new(env!("CARGO_MANIFEST_DIR")).join("../../testdata/keys"))
            .unwrap();
        Arc::new(TokenAuthority::new(Arc::new(keys), "gatehouse"))
    }

    fn bearer(authority: &TokenAuthority, claims: &Claims) -> String {
        format!("Bearer {}", authority.generate_token(KID, claims).unwrap())
    }

    fn claims(roles: &[&str]) -> Claims {
        Claims::new(Uuid::new_v4(), "gatehouse", Duration::from_secs(3600))
            .with_roles(roles.iter().copied())
    }

    fn counting_handler(hits: Arc<AtomicUsize>) -> BoxHandler {
        handler_fn(move |_ctx, _req| {
            let hits = Arc::clone(&hits);
            Box::pin(async move {
                hits.fetch_add(1, Ordering::SeqCst);
                Ok(StatusCode::OK.into_response())
            })
        })
    }

    fn protected(authority: &Arc<TokenAuthority>, role: &str, hits: Arc<AtomicUsize>) -> BoxHandler {
        Chain::new()
            .with(Authenticate::new(Arc::clone(authority)))
            .with(Authorize::new(Arc::clone(authority), role))
            .then(counting_handler(hits))
    }

    fn with_auth(header: &str) -> Request<Body> {
        let mut req = request();
        req.headers_mut()
            .insert(header::AUTHORIZATION, header.parse().unwrap());
        req
    }

    fn code(result: HandlerResult) -> ErrorCode {
        match result {
            Err(HandlerError::App(err)) => err.code,
            Err(other) => panic!("unexpected error {other}"),
            Ok(response) => panic!("unexpected success {}", response.status()),
        }
    }

    #[tokio::test]
    async fn admin_reaches_admin_route() {
        let authority = authority();
        let hits = Arc::new(AtomicUsize::new(0));
        let handler = protected(&authority, "admin", Arc::clone(&hits));

        let input = claims(&["admin"]);
        let mut ctx = RequestContext::new();
        let response = handler
            .call(&mut ctx, with_auth(&bearer(&authority, &input)))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(claims_roles(&ctx), ["admin"]);
        assert_eq!(ctx.user_id(), input.user_id());
    }

    fn claims_roles(ctx: &RequestContext) -> Vec<String> {
        ctx.claims().unwrap().roles.iter().cloned().collect()
    }

    #[tokio::test]
    async fn user_is_denied_admin_route() {
        let authority = authority();
        let hits = Arc::new(AtomicUsize::new(0));
        let handler = protected(&authority, "admin", Arc::clone(&hits));

        let token = bearer(&authority, &claims(&["user"]));
        let result = handler.call(&mut RequestContext::new(), with_auth(&token)).await;

        assert_eq!(code(result), ErrorCode::PermissionDenied);
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn expired_token_is_unauthenticated() {
        let authority = authority();
        let hits = Arc::new(AtomicUsize::new(0));
        let handler = protected(&authority, "admin", Arc::clone(&hits));

        let mut expired = claims(&["admin"]);
        expired.exp -= 3600 + 60;
        expired.iat -= 7200;
        let token = bearer(&authority, &expired);

        let result = handler.call(&mut RequestContext::new(), with_auth(&token)).await;
        assert_eq!(code(result), ErrorCode::Unauthenticated);
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn bad_credentials_never_reach_handler() {
        let authority = authority();
        let hits = Arc::new(AtomicUsize::new(0));
        let handler = protected(&authority, "user", Arc::clone(&hits));

        for header in ["Basic abcd", "Bearer", "Bearer not.a.token", "Token xyz"] {
            let result = handler.call(&mut RequestContext::new(), with_auth(header)).await;
            assert_eq!(code(result), ErrorCode::Unauthenticated, "{header}");
        }

        let result = handler.call(&mut RequestContext::new(), request()).await;
        assert_eq!(code(result), ErrorCode::Unauthenticated);

        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn authorize_without_authenticate_is_denied() {
        let authority = authority();
        let hits = Arc::new(AtomicUsize::new(0));
        let handler = Chain::new()
            .with(Authorize::new(Arc::clone(&authority), "user"))
            .then(counting_handler(Arc::clone(&hits)));

        let result = handler.call(&mut RequestContext::new(), request()).await;
        assert_eq!(code(result), ErrorCode::PermissionDenied);
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }
}
