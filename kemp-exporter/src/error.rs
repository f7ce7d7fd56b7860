//! Error types for the exporter.

use std::net::SocketAddr;

use kemp_client::ClientError;
use thiserror::Error;

/// Result type alias using [`ExporterError`].
pub type Result<T> = std::result::Result<T, ExporterError>;

/// Errors that stop the exporter.
#[derive(Debug, Error)]
pub enum ExporterError {
    /// Statistics could not be fetched. Always fatal.
    #[error("Error getting statistics: {0}")]
    Fetch(#[from] ClientError),

    /// The HTTP listener could not be bound.
    #[error("Failed to bind to {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    /// The HTTP server failed while running.
    #[error("HTTP server error: {0}")]
    Server(#[from] std::io::Error),

    /// A background task panicked or was cancelled.
    #[error("Task failed: {0}")]
    Task(String),
}
