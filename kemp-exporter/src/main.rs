//! Prometheus exporter for KEMP LoadMaster statistics.

use std::sync::Arc;

use clap::Parser;
use tracing::{info, warn};

use kemp_client::LoadMasterClient;
use kemp_exporter::config::{Cli, Command};
use kemp_exporter::{Exporter, HttpServer, MetricRegistry, init_tracing};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let Command::Server(args) = cli.command;

    let (config, credentials) = args.resolve()?;

    init_tracing(&config.logging)?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        endpoint = %credentials.endpoint,
        wait_secs = config.collector.wait_secs,
        "Starting KEMP LoadMaster exporter"
    );

    let client = LoadMasterClient::new(credentials)?;
    info!(url = %client.url(), "Polling LoadMaster statistics API");

    // Built once, shared by the collector and the HTTP handlers.
    let registry = Arc::new(MetricRegistry::new(&config.prometheus.prefix));

    let http = HttpServer::bind_all_interfaces(registry.clone(), config.server.port).await?;

    let exporter = Exporter::new(client, registry, http, config.collector.wait());
    exporter.run(termination_signal()).await?;

    info!("Exporter stopped");
    Ok(())
}

/// Resolve on Ctrl+C or SIGTERM.
async fn termination_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, shutting down..."),
        _ = terminate => info!("Received SIGTERM, shutting down..."),
    }
}
