use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::Router;
use tokio::sync::watch;

use crate::error::GatewayError;
use crate::service::QueryService;

/// Shared state for request handlers.
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<QueryService>,
    pub started_at: Instant,
}

/// The HTTP server wrapping the query API.
pub struct GatewayServer {
    addr: SocketAddr,
    shutdown_rx: watch::Receiver<bool>,
}

impl GatewayServer {
    #[must_use]
    pub fn new(bind: &str, port: u16, shutdown_rx: watch::Receiver<bool>) -> Self {
        let addr: SocketAddr = format!("{bind}:{port}").parse().unwrap_or_else(|e| {
            tracing::warn!("invalid bind '{bind}': {e}, falling back to 0.0.0.0:{port}");
            SocketAddr::from(([0, 0, 0, 0], port))
        });

        Self { addr, shutdown_rx }
    }

    /// Serve the router until the shutdown channel flips to true.
    ///
    /// # Errors
    ///
    /// Returns an error if the server fails to bind or hits a fatal I/O
    /// error. Bind failure is the one startup condition callers should
    /// treat as fatal to the process.
    pub async fn serve(self, router: Router) -> Result<(), GatewayError> {
        let listener = tokio::net::TcpListener::bind(self.addr)
            .await
            .map_err(|e| GatewayError::Bind(self.addr.to_string(), e))?;
        tracing::info!("query service listening on {}", self.addr);

        let mut shutdown_rx = self.shutdown_rx;
        axum::serve(listener, router)
            .with_graceful_shutdown(async move {
                while !*shutdown_rx.borrow_and_update() {
                    if shutdown_rx.changed().await.is_err() {
                        std::future::pending::<()>().await;
                    }
                }
                tracing::info!("query service shutting down");
            })
            .await
            .map_err(|e| GatewayError::Server(format!("{e}")))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_bind_parses() {
        let (_tx, rx) = watch::channel(false);
        let server = GatewayServer::new("127.0.0.1", 8123, rx);
        assert_eq!(server.addr.port(), 8123);
        assert!(server.addr.ip().is_loopback());
    }

    #[test]
    fn invalid_bind_falls_back() {
        let (_tx, rx) = watch::channel(false);
        let server = GatewayServer::new("not_an_ip", 9999, rx);
        assert_eq!(server.addr.port(), 9999);
        assert_eq!(server.addr.ip(), std::net::IpAddr::from([0, 0, 0, 0]));
    }
}
