//! Prometheus exporter over HTTP.
//!
//! Serves `/metrics` in the Prometheus text format and `/health` for
//! liveness probes. The registry is shared with the render loop, which
//! keeps updating it while requests are served.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Router};
use thiserror::Error;
use tower_http::cors::CorsLayer;

use crate::capture::LiveConfig;
use crate::metrics::MetricsRegistry;

/// Errors that can occur while running the exporter.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("failed to bind to address: {0}")]
    Bind(#[from] std::io::Error),

    #[error("server error: {0}")]
    Server(String),
}

/// Listening address of the exporter.
#[derive(Debug, Clone)]
pub struct MetricsServerConfig {
    /// Address to bind the server to.
    pub bind_addr: SocketAddr,
}

impl Default for MetricsServerConfig {
    fn default() -> Self {
        Self::with_port(LiveConfig::default().metrics_port)
    }
}

impl MetricsServerConfig {
    /// Listens on all interfaces at `port`.
    pub fn with_port(port: u16) -> Self {
        Self {
            bind_addr: ([0, 0, 0, 0], port).into(),
        }
    }

    /// Takes the port from a `[live]` section; `None` if the exporter is
    /// disabled (port 0).
    pub fn from_live(live: &LiveConfig) -> Option<Self> {
        (live.metrics_port != 0).then(|| Self::with_port(live.metrics_port))
    }
}

/// HTTP exporter for a shared [`MetricsRegistry`].
pub struct MetricsServer {
    config: MetricsServerConfig,
    registry: Arc<MetricsRegistry>,
}

impl MetricsServer {
    /// Creates an exporter for `registry`.
    pub fn new(config: MetricsServerConfig, registry: Arc<MetricsRegistry>) -> Self {
        Self { config, registry }
    }

    fn router(&self) -> Router {
        Router::new()
            .route("/metrics", get(metrics_handler))
            .route("/health", get(|| async { (StatusCode::OK, "OK") }))
            .layer(CorsLayer::permissive())
            .with_state(Arc::clone(&self.registry))
    }

    /// Serves requests until `shutdown` completes.
    pub async fn run_until<F>(self, shutdown: F) -> Result<(), ServerError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let listener = tokio::net::TcpListener::bind(self.config.bind_addr).await?;
        tracing::info!(addr = %self.config.bind_addr, "Metrics server listening");

        axum::serve(listener, self.router())
            .with_graceful_shutdown(shutdown)
            .await
            .map_err(|e| ServerError::Server(e.to_string()))?;

        tracing::debug!("Metrics server stopped");
        Ok(())
    }
}

async fn metrics_handler(State(registry): State<Arc<MetricsRegistry>>) -> impl IntoResponse {
    match registry.encode() {
        Ok(body) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            body,
        ),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            [("content-type", "text/plain; charset=utf-8")],
            format!("Failed to encode metrics: {}", e),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::MetricsSnapshot;

    #[test]
    fn test_config_from_live() {
        let live = LiveConfig::default();
        let config = MetricsServerConfig::from_live(&live).unwrap();
        assert_eq!(config.bind_addr.port(), 9090);

        let disabled = LiveConfig {
            metrics_port: 0,
            ..LiveConfig::default()
        };
        assert!(MetricsServerConfig::from_live(&disabled).is_none());
    }

    #[tokio::test]
    async fn test_metrics_handler_renders_registry() {
        let registry = Arc::new(MetricsRegistry::new().unwrap());
        registry.update(&MetricsSnapshot {
            frames_rendered: 4,
            ..MetricsSnapshot::default()
        });
        let response = metrics_handler(State(registry)).await.into_response();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_server_stops_on_shutdown() {
        let registry = Arc::new(MetricsRegistry::new().unwrap());
        let server = MetricsServer::new(MetricsServerConfig::with_port(0), registry);
        server.run_until(async {}).await.unwrap();
    }
}
