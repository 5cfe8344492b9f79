//! Configuration module for the case simulator client.
//!
//! Provides configuration management for the backend base URL, timeouts,
//! the streaming search endpoint, and auth header naming.

use std::time::Duration;

use crate::errors::{ClientError, ClientResult};

/// Default request timeout for buffered requests (60 seconds).
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Default connect timeout (10 seconds).
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Default path of the streaming image search endpoint.
pub const DEFAULT_STREAM_PATH: &str = "image-search/stream";

/// Default header carrying the refresh token.
pub const DEFAULT_REFRESH_TOKEN_HEADER: &str = "X-Refresh-Token";

/// Configuration for the case simulator client.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL for API requests, without a trailing slash.
    pub base_url: String,
    /// Timeout applied to buffered (non-streaming) requests.
    pub timeout: Duration,
    /// Connect timeout applied to every request.
    pub connect_timeout: Duration,
    /// Path of the streaming image search endpoint.
    pub stream_path: String,
    /// Name of the header carrying the refresh token.
    pub refresh_token_header: String,
    /// Custom headers to include in every request.
    pub custom_headers: Vec<(String, String)>,
}

impl ClientConfig {
    /// Creates a new configuration builder.
    pub fn builder() -> ClientConfigBuilder {
        ClientConfigBuilder::new()
    }

    /// Creates a configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `CASESIM_API_URL` (required): backend base URL
    /// - `CASESIM_TIMEOUT` (optional): buffered request timeout in seconds
    /// - `CASESIM_CONNECT_TIMEOUT` (optional): connect timeout in seconds
    /// - `CASESIM_STREAM_PATH` (optional): streaming search path
    pub fn from_env() -> ClientResult<Self> {
        let base_url = std::env::var("CASESIM_API_URL").map_err(|_| {
            ClientError::configuration("CASESIM_API_URL environment variable not set")
        })?;

        let mut builder = ClientConfigBuilder::new().base_url(base_url);

        if let Some(secs) = env_secs("CASESIM_TIMEOUT") {
            builder = builder.timeout(Duration::from_secs(secs));
        }

        if let Some(secs) = env_secs("CASESIM_CONNECT_TIMEOUT") {
            builder = builder.connect_timeout(Duration::from_secs(secs));
        }

        if let Ok(path) = std::env::var("CASESIM_STREAM_PATH") {
            builder = builder.stream_path(path);
        }

        builder.build()
    }

    /// Returns the full URL for an endpoint path.
    ///
    /// Absolute `http(s)://` targets are returned unchanged.
    pub fn endpoint_url(&self, path: &str) -> String {
        join_url(&self.base_url, path)
    }
}

pub(crate) fn join_url(base_url: &str, path: &str) -> String {
    if path.starts_with("http://") || path.starts_with("https://") {
        return path.to_string();
    }
    format!("{}/{}", base_url, path.trim_start_matches('/'))
}

fn env_secs(var: &str) -> Option<u64> {
    let raw = std::env::var(var).ok()?;
    match raw.trim().parse::<u64>() {
        Ok(secs) => Some(secs),
        Err(_) => {
            tracing::warn!(var, value = %raw, "Ignoring non-numeric timeout");
            None
        }
    }
}

/// Builder for `ClientConfig`.
#[derive(Debug, Default)]
pub struct ClientConfigBuilder {
    base_url: Option<String>,
    timeout: Option<Duration>,
    connect_timeout: Option<Duration>,
    stream_path: Option<String>,
    refresh_token_header: Option<String>,
    custom_headers: Vec<(String, String)>,
}

impl ClientConfigBuilder {
    /// Creates a new configuration builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the base URL.
    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    /// Sets the buffered request timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Sets the connect timeout.
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    /// Sets the streaming search endpoint path.
    pub fn stream_path(mut self, path: impl Into<String>) -> Self {
        self.stream_path = Some(path.into());
        self
    }

    /// Sets the refresh token header name.
    pub fn refresh_token_header(mut self, name: impl Into<String>) -> Self {
        self.refresh_token_header = Some(name.into());
        self
    }

    /// Adds a custom header.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.custom_headers.push((name.into(), value.into()));
        self
    }

    /// Builds the configuration.
    pub fn build(self) -> ClientResult<ClientConfig> {
        let base_url = self
            .base_url
            .ok_or_else(|| ClientError::configuration("Base URL is required"))?
            .trim()
            .trim_end_matches('/')
            .to_string();

        if base_url.is_empty() {
            return Err(ClientError::configuration("Base URL cannot be empty"));
        }

        let parsed = url::Url::parse(&base_url)?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(ClientError::configuration(format!(
                "Unsupported URL scheme: {}",
                parsed.scheme()
            )));
        }

        let timeout = self.timeout.unwrap_or(DEFAULT_TIMEOUT);
        let connect_timeout = self.connect_timeout.unwrap_or(DEFAULT_CONNECT_TIMEOUT);
        if timeout.is_zero() || connect_timeout.is_zero() {
            return Err(ClientError::configuration("Timeouts must be non-zero"));
        }

        let refresh_token_header = self
            .refresh_token_header
            .unwrap_or_else(|| DEFAULT_REFRESH_TOKEN_HEADER.to_string());
        if refresh_token_header.trim().is_empty() {
            return Err(ClientError::configuration(
                "Refresh token header name cannot be empty",
            ));
        }

        Ok(ClientConfig {
            base_url,
            timeout,
            connect_timeout,
            stream_path: self
                .stream_path
                .unwrap_or_else(|| DEFAULT_STREAM_PATH.to_string()),
            refresh_token_header,
            custom_headers: self.custom_headers,
        })
    }
}
