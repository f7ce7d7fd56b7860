//! HTTP server for the Prometheus metrics endpoint.

use std::io;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};

use axum::Router;
use axum::extract::State;
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use crate::error::{ExporterError, Result};
use crate::metrics::SharedRegistry;
use crate::shutdown_requested;

/// Content type produced by the `prometheus-client` text encoder.
pub const METRICS_CONTENT_TYPE: &str =
    "application/openmetrics-text; version=1.0.0; charset=utf-8";

/// Application state shared across handlers.
#[derive(Clone)]
struct AppState {
    registry: SharedRegistry,
}

/// Create the HTTP router.
fn create_router(registry: SharedRegistry) -> Router {
    let state = AppState { registry };

    Router::new()
        .route("/", get(root_handler))
        .route("/metrics", get(metrics_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Liveness placeholder: 200 with an empty body.
async fn root_handler() -> StatusCode {
    StatusCode::OK
}

/// Handler for the /metrics endpoint.
async fn metrics_handler(State(state): State<AppState>) -> Response {
    match state.registry.render() {
        Ok(body) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, METRICS_CONTENT_TYPE)],
            body,
        )
            .into_response(),
        Err(e) => {
            error!(error = %e, "Failed to encode metrics");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "failed to encode metrics\n",
            )
                .into_response()
        }
    }
}

/// HTTP server bound to a listening socket.
pub struct HttpServer {
    registry: SharedRegistry,
    listener: TcpListener,
}

impl HttpServer {
    /// Bind the listening socket.
    pub async fn bind(registry: SharedRegistry, addr: SocketAddr) -> Result<Self> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| ExporterError::Bind { addr, source })?;

        Ok(Self { registry, listener })
    }

    /// Bind `port` on every interface.
    ///
    /// Tries the IPv6 wildcard first, which also accepts IPv4 on dual-stack
    /// hosts, and falls back to `0.0.0.0` when IPv6 is unavailable.
    pub async fn bind_all_interfaces(registry: SharedRegistry, port: u16) -> Result<Self> {
        let v6 = SocketAddr::from((Ipv6Addr::UNSPECIFIED, port));

        match TcpListener::bind(v6).await {
            Ok(listener) => Ok(Self { registry, listener }),
            Err(source) if source.kind() == io::ErrorKind::AddrInUse => {
                Err(ExporterError::Bind { addr: v6, source })
            }
            Err(e) => {
                warn!(error = %e, "IPv6 unavailable, listening on IPv4 only");
                Self::bind(registry, SocketAddr::from((Ipv4Addr::UNSPECIFIED, port))).await
            }
        }
    }

    /// The address actually bound (useful with port 0).
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Serve requests until the shutdown signal is received.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        let addr = self.local_addr()?;
        let router = create_router(self.registry);

        info!(addr = %addr, "Listening");

        axum::serve(self.listener, router)
            .with_graceful_shutdown(async move {
                shutdown_requested(&mut shutdown).await;
                info!("HTTP server shutting down");
            })
            .await?;

        info!("HTTP server stopped");
        Ok(())
    }
}
