//! Prometheus metrics exporter for KEMP LoadMaster appliances.
//!
//! The exporter polls the appliance statistics API on a fixed delay and
//! republishes the figures as gauges on an HTTP `/metrics` endpoint.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐     ┌─────────────────┐     ┌─────────────────┐
//! │   LoadMaster    │────>│  CollectorLoop  │────>│ MetricRegistry  │
//! │  (/accessv2)    │     │ (fetch, sleep)  │     │    (gauges)     │
//! └─────────────────┘     └─────────────────┘     └────────┬────────┘
//!                                                          │
//!                                                 ┌────────▼────────┐
//!                                                 │   HTTP Server   │
//!                                                 │   (/metrics)    │
//!                                                 └─────────────────┘
//! ```
//!
//! A failed fetch is fatal: [`Exporter::run`] returns the error, which ends
//! the process.
//!
//! # Usage
//!
//! ```bash
//! kemp-exporter server --port 8000 --wait 10 lb.example.com bal secret
//! ```

pub mod collector;
pub mod config;
pub mod error;
pub mod exporter;
pub mod http;
pub mod metrics;

pub use collector::CollectorLoop;
pub use config::ExporterConfig;
pub use error::{ExporterError, Result};
pub use exporter::Exporter;
pub use http::HttpServer;
pub use metrics::{EscapedLabel, MetricRegistry, ServerLabels, SharedRegistry};

use config::{LogFormat, LoggingConfig};
use tokio::sync::watch;

/// Initialize tracing with the given configuration.
///
/// `RUST_LOG` takes precedence over the configured level.
pub fn init_tracing(config: &LoggingConfig) -> anyhow::Result<()> {
    use tracing_subscriber::{EnvFilter, fmt, prelude::*};

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    match config.format {
        LogFormat::Text => tracing_subscriber::registry()
            .with(fmt::layer())
            .with(filter)
            .try_init(),
        LogFormat::Json => tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(filter)
            .try_init(),
    }
    .map_err(|e| anyhow::anyhow!("Failed to initialize tracing: {}", e))
}

/// Resolve once shutdown has been requested or the sender is gone.
pub(crate) async fn shutdown_requested(shutdown: &mut watch::Receiver<bool>) {
    loop {
        if *shutdown.borrow_and_update() {
            return;
        }
        if shutdown.changed().await.is_err() {
            return;
        }
    }
}
