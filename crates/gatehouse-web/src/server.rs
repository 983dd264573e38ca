//! Server utilities.

use axum::Router;
use std::net::SocketAddr;
use std::{fmt, io};
use tokio::net::TcpListener;

use crate::shutdown::{watch_os_signals, Shutdown};
use crate::config::ServerConfig;

/// Error type for server operations.
#[derive(Debug)]
pub enum ServerError {
    /// Failed to bind to address.
    Bind(io::Error),
    /// Server runtime error.
    Runtime(io::Error),
    /// In-flight requests did not drain within the shutdown timeout.
    ShutdownTimeout,
}

impl fmt::Display for ServerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bind(e) => write!(f, "Failed to bind to address: {}", e),
            Self::Runtime(e) => write!(f, "Server error: {}", e),
            Self::ShutdownTimeout => write!(f, "Graceful shutdown did not complete, server aborted"),
        }
    }
}

impl std::error::Error for ServerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Bind(e) | Self::Runtime(e) => Some(e),
            Self::ShutdownTimeout => None,
        }
    }
}

/// Bind to the configured address and serve until shutdown.
pub async fn serve_router(
    router: Router,
    config: &(impl AsRef<ServerConfig> + Sync),
    shutdown: Shutdown,
) -> Result<(), ServerError> {
    let config = config.as_ref();
    let addr = config.addr();
    let listener = TcpListener::bind(&addr)
        .await
        .map_err(ServerError::Bind)?;

    tracing::info!("Server listening on {}", addr);

    tokio::spawn(watch_os_signals(shutdown.clone()));
    serve_listener(listener, router, config, shutdown).await
}

/// Serve on an already bound listener.
///
/// Once `shutdown` fires the listener stops accepting and in-flight requests
/// get `shutdown_timeout` to finish before the server task is aborted.
pub async fn serve_listener(
    listener: TcpListener,
    router: Router,
    config: &ServerConfig,
    shutdown: Shutdown,
) -> Result<(), ServerError> {
    let graceful = shutdown.clone();
    let mut server = tokio::spawn(async move {
        axum::serve(
            listener,
            router.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(async move { graceful.wait().await })
        .await
    });

    tokio::select! {
        joined = &mut server => return finish(joined),
        _ = shutdown.wait() => {}
    }

    let deadline = config.shutdown_timeout();
    match tokio::time::timeout(deadline, &mut server).await {
        Ok(joined) => finish(joined),
        Err(_) => {
            tracing::error!(timeout = ?deadline, "graceful shutdown timed out, aborting");
            server.abort();
            Err(ServerError::ShutdownTimeout)
        }
    }
}

fn finish(joined: Result<io::Result<()>, tokio::task::JoinError>) -> Result<(), ServerError> {
    match joined {
        Ok(Ok(())) => {
            tracing::info!("Server shutdown complete");
            Ok(())
        }
        Ok(Err(e)) => Err(ServerError::Runtime(e)),
        Err(e) => Err(ServerError::Runtime(io::Error::other(e))),
    }
}
