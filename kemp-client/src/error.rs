use thiserror::Error;

/// Errors raised while fetching statistics from an appliance.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("Invalid endpoint: {0}")]
    InvalidEndpoint(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Unexpected HTTP status {status}: {body}")]
    Status {
        status: reqwest::StatusCode,
        body: String,
    },

    #[error("Failed to parse statistics: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("LoadMaster API error: {0}")]
    Api(String),
}

/// Result type alias using [`ClientError`].
pub type Result<T> = std::result::Result<T, ClientError>;
