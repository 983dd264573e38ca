//! Graceful shutdown signalling.

use std::sync::Arc;
use tokio::sync::watch;

/// One-shot shutdown flag shared by the server, signal handler and middleware.
#[derive(Debug, Clone)]
pub struct Shutdown {
    tx: Arc<watch::Sender<bool>>,
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

impl Shutdown {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    /// Request shutdown. Returns `false` if it was already requested.
    pub fn trigger(&self, reason: &str) -> bool {
        let first = self.tx.send_if_modified(|triggered| {
            if *triggered {
                return false;
            }
            *triggered = true;
            true
        });

        if first {
            tracing::info!(reason, "starting graceful shutdown");
        }
        first
    }

    pub fn is_triggered(&self) -> bool {
        *self.tx.borrow()
    }

    /// Resolve once shutdown has been requested.
    pub async fn wait(&self) {
        let mut rx = self.tx.subscribe();
        let _ = rx.wait_for(|&triggered| triggered).await;
    }
}

/// Trigger `shutdown` on SIGINT or SIGTERM.
pub(crate) async fn watch_os_signals(shutdown: Shutdown) {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %err, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(err) => {
                tracing::error!(error = %err, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => { shutdown.trigger("SIGINT"); },
        _ = terminate => { shutdown.trigger("SIGTERM"); },
        _ = shutdown.wait() => {},
    }
}
