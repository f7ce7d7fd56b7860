//! HTTP client for the LoadMaster statistics API.

use std::fmt;
use std::future::Future;

use reqwest::Url;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::error::{ClientError, Result};
use crate::stats::Snapshot;

/// Path of the JSON API on the appliance.
const API_PATH: &str = "accessv2";

/// Connection settings for a LoadMaster.
#[derive(Clone, Default)]
pub struct Credentials {
    /// Appliance URL or host. `https://` is assumed when no scheme is given.
    pub endpoint: String,
    /// API user.
    pub username: String,
    /// API password.
    pub password: String,
    /// Log raw API responses.
    pub debug: bool,
    /// Accept invalid (e.g. self-signed) TLS certificates.
    pub insecure: bool,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("endpoint", &self.endpoint)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("debug", &self.debug)
            .field("insecure", &self.insecure)
            .finish()
    }
}

/// A source of statistics snapshots.
///
/// The exporter awaits each fetch to completion before doing anything else,
/// so implementations need not support concurrent calls.
pub trait StatisticsSource: Send + Sync {
    /// Fetch one snapshot.
    fn fetch(&self) -> impl Future<Output = Result<Snapshot>> + Send;
}

#[derive(Serialize)]
struct StatsRequest<'a> {
    apiuser: &'a str,
    apipass: &'a str,
    cmd: &'static str,
}

#[derive(Deserialize)]
struct StatsResponse {
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(flatten)]
    snapshot: Snapshot,
}

/// Statistics client for a single LoadMaster.
pub struct LoadMasterClient {
    http: reqwest::Client,
    url: Url,
    credentials: Credentials,
}

impl LoadMasterClient {
    /// Create a client for the appliance described by `credentials`.
    pub fn new(credentials: Credentials) -> Result<Self> {
        let url = api_url(&credentials.endpoint)?;

        let http = reqwest::Client::builder()
            .danger_accept_invalid_certs(credentials.insecure)
            .build()?;

        debug!(url = %url, user = %credentials.username, "Created LoadMaster client");

        Ok(Self {
            http,
            url,
            credentials,
        })
    }

    /// The resolved API URL.
    pub fn url(&self) -> &Url {
        &self.url
    }
}

impl StatisticsSource for LoadMasterClient {
    async fn fetch(&self) -> Result<Snapshot> {
        trace!(url = %self.url, "Requesting statistics");

        let request = StatsRequest {
            apiuser: &self.credentials.username,
            apipass: &self.credentials.password,
            cmd: "stats",
        };

        let response = self.http.post(self.url.clone()).json(&request).send().await?;
        let status = response.status();
        let body = response.text().await?;

        if self.credentials.debug {
            debug!(%status, body = %body, "LoadMaster response");
        }

        if !status.is_success() {
            return Err(ClientError::Status { status, body });
        }

        let parsed: StatsResponse = serde_json::from_str(&body)?;

        match parsed.status.as_deref() {
            None => {}
            Some(s) if s.eq_ignore_ascii_case("ok") => {}
            Some(s) => {
                return Err(ClientError::Api(
                    parsed.message.unwrap_or_else(|| format!("status '{}'", s)),
                ));
            }
        }

        Ok(parsed.snapshot)
    }
}

/// Build the API URL from a user-supplied endpoint.
fn api_url(endpoint: &str) -> Result<Url> {
    let endpoint = endpoint.trim();
    if endpoint.is_empty() {
        return Err(ClientError::InvalidEndpoint("endpoint is empty".to_string()));
    }

    let base = if endpoint.contains("://") {
        endpoint.to_string()
    } else {
        format!("https://{}", endpoint)
    };

    let url = Url::parse(&format!("{}/{}", base.trim_end_matches('/'), API_PATH))
        .map_err(|e| ClientError::InvalidEndpoint(format!("{}: {}", endpoint, e)))?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(ClientError::InvalidEndpoint(format!(
            "unsupported scheme '{}'",
            url.scheme()
        )));
    }

    Ok(url)
}
