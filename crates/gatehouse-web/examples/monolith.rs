use axum::response::IntoResponse;
use axum::Json;
use gatehouse_auth::{Claims, KeyStore, TokenAuthority};
use gatehouse_web::mid::{
    Authenticate, Authorize, ErrorTranslation, Logger, PanicRecovery, RequestMetrics,
};
use gatehouse_web::{
    handler_fn, App, BoxHandler, Chain, MethodFilter, Metrics, ServerConfig, Shutdown,
};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

fn whoami() -> BoxHandler {
    handler_fn(|ctx, _req| {
        Box::pin(async move {
            let user_id = ctx.require_user_id()?;
            let roles = ctx.claims().map(|c| c.roles.clone()).unwrap_or_default();
            Ok(Json(json!({ "user_id": user_id, "roles": roles })).into_response())
        })
    })
}

fn ping() -> BoxHandler {
    handler_fn(|_ctx, _req| Box::pin(async { Ok(Json(json!({ "pong": true })).into_response()) }))
}

/// Development-only token minting for trying the protected routes.
fn mint_token(authority: Arc<TokenAuthority>, kid: String) -> BoxHandler {
    handler_fn(move |_ctx, _req| {
        let issued = Claims::new(Uuid::new_v4(), authority.issuer(), Duration::from_secs(3600))
            .with_roles(["user"]);
        let token = authority.generate_token(&kid, &issued);
        Box::pin(async move { Ok(Json(json!({ "token": token? })).into_response()) })
    })
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config: ServerConfig = ServerConfig::builder()
        .with_dotenv()
        .with_env_prefix("GATEHOUSE")
        .build()?;

    gatehouse::init_logging(&config.log, config.environment);

    tracing::info!(
        host = %config.host,
        port = %config.port,
        environment = %config.environment,
        "Starting server"
    );

    let keys = KeyStore::load(&config.auth.keys_folder)?;
    tracing::info!(
        keys = keys.len(),
        kids = ?keys.kids().collect::<Vec<_>>(),
        "key store loaded"
    );

    let authority = Arc::new(TokenAuthority::new(Arc::new(keys), &config.auth.issuer));
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

    let mut app = App::new(app_chain)
        .with_health_routes(shutdown.clone(), Arc::clone(&metrics))
        .handle(MethodFilter::GET, "/auth/whoami", &user, whoami())
        .handle(MethodFilter::GET, "/admin/ping", &admin, ping());

    if !config.environment.is_production() {
        app = app.handle(
            MethodFilter::POST,
            "/auth/token",
            &Chain::new(),
            mint_token(Arc::clone(&authority), config.auth.active_kid.clone()),
        );
    }

    #[cfg(feature = "metrics")]
    {
        app = app.merge(gatehouse_web::prometheus_routes("/metrics"));
    }

    let router = app.with_timeout(config.request_timeout()).into_router();

    gatehouse_web::serve_router(router, &config, shutdown).await?;

    Ok(())
}
