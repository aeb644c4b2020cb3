//! Authorization server runtime.
//!
//! Serves the OAuth endpoints and a bearer-protected `/api` over HTTP with
//! graceful Ctrl-C shutdown.

pub mod oauth;
pub mod transport;

use std::net::SocketAddr;

use axum::Router;

use crate::config::Config;

/// PKCE authorization server.
pub struct AuthServer {
    config: Config,
    api: Router,
}

impl AuthServer {
    /// Create a server exposing the default protected API.
    #[must_use]
    pub fn new(config: Config) -> Self {
        Self { config, api: transport::default_api() }
    }

    /// Replace the router mounted under `/api`.
    #[must_use]
    pub fn with_api(mut self, api: Router) -> Self {
        self.api = api;
        self
    }

    /// Build the router without binding a socket.
    #[must_use]
    pub fn router(self) -> Router {
        transport::create_router(self.config.oauth, self.api)
    }

    /// Run the server in HTTP mode.
    ///
    /// # Errors
    ///
    /// Returns error on server failure.
    pub async fn run_http(self) -> anyhow::Result<()> {
        let addr = SocketAddr::from(([0, 0, 0, 0], self.config.port));
        tracing::info!(
            issuer = %self.config.oauth.issuer,
            audience = %self.config.oauth.audience,
            client_id = %self.config.oauth.default_client_id,
            "Starting authorization server"
        );

        let router = self.router();
        let listener = tokio::net::TcpListener::bind(addr).await?;

        tracing::info!("HTTP server listening on http://{}", addr);

        axum::serve(listener, router).with_graceful_shutdown(shutdown_signal()).await?;

        tracing::info!("HTTP server shut down");
        Ok(())
    }
}

impl std::fmt::Debug for AuthServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthServer").field("port", &self.config.port).finish_non_exhaustive()
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to install CTRL+C handler");
        std::future::pending::<()>().await;
    }
    tracing::info!("Received shutdown signal");
}
