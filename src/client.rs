
use std::sync::OnceLock;
use std::time::Duration;

use crate::{ClientError, ClientErrorDescription};

pub const DEFAULT_BASE_URL: &str = "http://127.0.0.1:50021";

static CLIENT: OnceLock<VoicevoxClient> = OnceLock::new();

#[derive(Debug, Clone, PartialEq)]
pub struct ClientConfig {
    pub base_url: String,
    /// Upper bound for a whole request, including reading the body.
    pub request_timeout: Option<Duration>,
    pub connect_timeout: Option<Duration>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            request_timeout: None,
            connect_timeout: Some(Duration::from_secs(10)),
        }
    }
}

impl ClientConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Self::default()
        }
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }
}

/// Handle to a VOICEVOX engine.
///
/// Cloning is cheap: clones share one connection pool. The base URL is fixed at construction.
#[derive(Debug, Clone)]
pub struct VoicevoxClient {
    http: reqwest::Client,
    base_url: String,
}

impl VoicevoxClient {
    pub fn new(config: ClientConfig) -> Result<Self, ClientError> {
        let base_url = normalize_base_url(&config.base_url)?;

        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = config.request_timeout {
            builder = builder.timeout(timeout);
        }
        if let Some(timeout) = config.connect_timeout {
            builder = builder.connect_timeout(timeout);
        }
        let http = builder
            .build()
            .map_err(|e| ClientError::new(ClientErrorDescription::ClientBuildFailed(e)))?;

        Ok(Self { http, base_url })
    }

    /// Uses an existing `reqwest::Client`, e.g. one shared with other parts of a program.
    pub fn with_http_client(http: reqwest::Client, base_url: &str) -> Result<Self, ClientError> {
        Ok(Self {
            http,
            base_url: normalize_base_url(base_url)?,
        })
    }

    /// The client registered with [`initialize`].
    pub fn shared() -> Result<Self, ClientError> {
        CLIENT
            .get()
            .cloned()
            .ok_or(ClientError::new(ClientErrorDescription::NotInitialized))
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub(crate) fn http(&self) -> &reqwest::Client {
        &self.http
    }

    pub(crate) fn endpoint_url(&self, endpoint: &str, query: &str) -> String {
        format!("{}{}{}", self.base_url, endpoint, query)
    }
}

fn normalize_base_url(base_url: &str) -> Result<String, ClientError> {
    let trimmed = base_url.trim().trim_end_matches('/');
    let parsed = url::Url::parse(trimmed)
        .map_err(|e| ClientError::new(ClientErrorDescription::InvalidBaseUrl(format!("{}: {}", base_url, e))))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(ClientError::new(ClientErrorDescription::InvalidBaseUrl(format!(
            "{}: unsupported scheme {}",
            base_url,
            parsed.scheme()
        ))));
    }
    Ok(trimmed.to_string())
}

/// Registers the process-wide client. Meant to be called once at startup.
pub fn initialize(config: ClientConfig) -> Result<(), ClientError> {
    let client = VoicevoxClient::new(config)?;
    log::debug!("Using VOICEVOX engine at {}", client.base_url());
    CLIENT
        .set(client)
        .map_err(|_| ClientError::new(ClientErrorDescription::AlreadyInitialized))
}
