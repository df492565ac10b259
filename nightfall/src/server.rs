//! Server lifecycle management
//!
//! Binds the HTTP API and serves it until SIGINT/SIGTERM.

use std::sync::Arc;
use tracing::{error, info};

use nightfall_api::{create_router, AppState};
use nightfall_core::{bootstrap::Services, Config};

/// Nightfall server - owns the HTTP listener for its lifetime
pub struct NightfallServer {
    config: Arc<Config>,
    services: Services,
}

impl NightfallServer {
    pub fn new(config: Config, services: Services) -> Self {
        Self {
            config: Arc::new(config),
            services,
        }
    }

    /// Serve until a shutdown signal arrives, then drain in-flight requests
    pub async fn start(self) -> anyhow::Result<()> {
        let addr = self.config.http_address();
        let router = create_router(AppState::new(self.services, self.config.clone()));

        let listener = tokio::net::TcpListener::bind(&addr).await.map_err(|e| {
            error!("Failed to bind HTTP server to {}: {}", addr, e);
            anyhow::anyhow!("Failed to bind {addr}: {e}")
        })?;
        info!("HTTP server listening on {}", addr);

        axum::serve(listener, router)
            .with_graceful_shutdown(shutdown_signal())
            .await
            .map_err(|e| anyhow::anyhow!("HTTP server error: {e}"))?;

        info!("Nightfall server shutdown complete");
        Ok(())
    }
}

/// Resolves on Ctrl+C or SIGTERM
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => { info!("Received Ctrl+C, starting graceful shutdown..."); }
        () = terminate => { info!("Received SIGTERM, starting graceful shutdown..."); }
    }
}
