//! Case simulator API client.
//!
//! Provides the main client interface wiring configuration, transport,
//! credentials and services together.

use serde::de::DeserializeOwned;
use std::sync::Arc;

use crate::auth::{
    CredentialStore, Credentials, InMemoryCredentialStore, NoopSessionHandler,
    SessionExpiryHandler, TokenAuth,
};
use crate::config::{ClientConfig, ClientConfigBuilder};
use crate::errors::{ClientError, ClientResult};
use crate::observability::{DefaultStreamMetrics, StreamMetrics};
use crate::services::ImageSearchService;
use crate::transport::{
    ApiRequest, AuthenticatedTransport, HttpResponse, HttpTransport, HttpTransportImpl,
};

/// The main case simulator client.
///
/// # Example
///
/// ```rust,no_run
/// use case_sim_client::{BatchCallbacks, CaseSimClient, Credentials, ImageSearchParams, StreamingImageBatch};
///
/// struct Print;
///
/// impl BatchCallbacks for Print {
///     fn on_batch(&mut self, batch: StreamingImageBatch) {
///         println!("batch {} with {} images", batch.batch_number, batch.images.len());
///     }
///     fn on_complete(&mut self) {}
///     fn on_error(&mut self, message: &str) {
///         eprintln!("{message}");
///     }
/// }
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let client = CaseSimClient::builder()
///         .base_url("https://casesim.example/api")
///         .credentials(Credentials::new("access").with_refresh_token("refresh"))
///         .build()?;
///
///     let params = ImageSearchParams::new("case-7", "imaging", "Chest X-ray");
///     client.image_search().start(params, &mut Print).await;
///     Ok(())
/// }
/// ```
pub struct CaseSimClient {
    config: ClientConfig,
    transport: Arc<AuthenticatedTransport>,
    credentials: Arc<dyn CredentialStore>,
    image_search: ImageSearchService,
    metrics: Arc<dyn StreamMetrics>,
}

impl CaseSimClient {
    /// Creates a new client builder.
    pub fn builder() -> CaseSimClientBuilder {
        CaseSimClientBuilder::new()
    }

    /// Creates a client from environment variables.
    ///
    /// Reads the variables listed on [`ClientConfig::from_env`] plus
    /// `CASESIM_ACCESS_TOKEN` and `CASESIM_REFRESH_TOKEN`.
    pub fn from_env() -> ClientResult<Self> {
        let config = ClientConfig::from_env()?;
        let mut builder = CaseSimClientBuilder::from_config(config);

        if let Ok(access) = std::env::var("CASESIM_ACCESS_TOKEN") {
            let mut credentials = Credentials::new(access);
            if let Ok(refresh) = std::env::var("CASESIM_REFRESH_TOKEN") {
                credentials = credentials.with_refresh_token(refresh);
            }
            builder = builder.credentials(credentials);
        }

        builder.build()
    }

    /// Returns the streaming image search service.
    pub fn image_search(&self) -> &ImageSearchService {
        &self.image_search
    }

    /// Sends an authenticated request and returns the raw response.
    pub async fn fetch(&self, request: ApiRequest) -> ClientResult<HttpResponse> {
        self.transport.fetch(request).await
    }

    /// Sends an authenticated request and deserializes a 2xx JSON body.
    pub async fn fetch_json<T: DeserializeOwned>(&self, request: ApiRequest) -> ClientResult<T> {
        self.transport.fetch_json(request).await
    }

    /// Returns the authenticated transport shared by all services.
    pub fn transport(&self) -> &Arc<AuthenticatedTransport> {
        &self.transport
    }

    /// Returns the credential store.
    pub fn credentials(&self) -> &Arc<dyn CredentialStore> {
        &self.credentials
    }

    /// Returns the stream metrics collector.
    pub fn metrics(&self) -> &Arc<dyn StreamMetrics> {
        &self.metrics
    }

    /// Returns the configuration.
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }
}

impl std::fmt::Debug for CaseSimClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CaseSimClient")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Builder for the case simulator client.
pub struct CaseSimClientBuilder {
    config_builder: ClientConfigBuilder,
    config: Option<ClientConfig>,
    transport: Option<Arc<dyn HttpTransport>>,
    credential_store: Option<Arc<dyn CredentialStore>>,
    credentials: Option<Credentials>,
    session_handler: Option<Arc<dyn SessionExpiryHandler>>,
    metrics: Option<Arc<dyn StreamMetrics>>,
}

impl CaseSimClientBuilder {
    /// Creates a new client builder.
    pub fn new() -> Self {
        Self {
            config_builder: ClientConfigBuilder::new(),
            config: None,
            transport: None,
            credential_store: None,
            credentials: None,
            session_handler: None,
            metrics: None,
        }
    }

    /// Creates a builder from an existing configuration.
    pub fn from_config(config: ClientConfig) -> Self {
        Self {
            config: Some(config),
            ..Self::new()
        }
    }

    /// Sets the base URL.
    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.config_builder = self.config_builder.base_url(base_url);
        self
    }

    /// Sets the buffered request timeout.
    pub fn timeout(mut self, timeout: std::time::Duration) -> Self {
        self.config_builder = self.config_builder.timeout(timeout);
        self
    }

    /// Sets the streaming search endpoint path.
    pub fn stream_path(mut self, path: impl Into<String>) -> Self {
        self.config_builder = self.config_builder.stream_path(path);
        self
    }

    /// Sets the refresh token header name.
    pub fn refresh_token_header(mut self, name: impl Into<String>) -> Self {
        self.config_builder = self.config_builder.refresh_token_header(name);
        self
    }

    /// Adds a header sent with every request.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.config_builder = self.config_builder.header(name, value);
        self
    }

    /// Sets a custom transport.
    pub fn transport(mut self, transport: Arc<dyn HttpTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Sets the credential store.
    pub fn credential_store(mut self, store: Arc<dyn CredentialStore>) -> Self {
        self.credential_store = Some(store);
        self
    }

    /// Sets initial credentials, saved into the credential store on build.
    pub fn credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = Some(credentials);
        self
    }

    /// Sets the handler notified when the backend expires the session.
    pub fn session_handler(mut self, handler: Arc<dyn SessionExpiryHandler>) -> Self {
        self.session_handler = Some(handler);
        self
    }

    /// Sets a custom metrics collector.
    pub fn metrics(mut self, metrics: Arc<dyn StreamMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Builds the client.
    pub fn build(self) -> ClientResult<CaseSimClient> {
        let config = match self.config {
            Some(config) => config,
            None => self.config_builder.build()?,
        };

        let transport: Arc<dyn HttpTransport> = match self.transport {
            Some(t) => t,
            None => Arc::new(
                HttpTransportImpl::new(&config.base_url, config.timeout, config.connect_timeout)
                    .map_err(|e| ClientError::configuration(e.to_string()))?,
            ),
        };

        let credentials: Arc<dyn CredentialStore> = self
            .credential_store
            .unwrap_or_else(|| Arc::new(InMemoryCredentialStore::new()));
        if let Some(initial) = self.credentials {
            credentials.save(initial);
        }

        let auth = Arc::new(TokenAuth::with_refresh_header(
            Arc::clone(&credentials),
            config.refresh_token_header.clone(),
        ));

        let session_handler: Arc<dyn SessionExpiryHandler> = self
            .session_handler
            .unwrap_or_else(|| Arc::new(NoopSessionHandler));

        let authenticated = Arc::new(
            AuthenticatedTransport::new(transport, auth, session_handler)
                .with_default_headers(config.custom_headers.clone()),
        );

        let metrics: Arc<dyn StreamMetrics> = self
            .metrics
            .unwrap_or_else(|| Arc::new(DefaultStreamMetrics::new()));

        let image_search = ImageSearchService::new(
            Arc::clone(&authenticated),
            config.stream_path.clone(),
            Arc::clone(&metrics),
        );

        Ok(CaseSimClient {
            config,
            transport: authenticated,
            credentials,
            image_search,
            metrics,
        })
    }
}

impl Default for CaseSimClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mocks::{MockResponse, MockTransport};

    #[test]
    fn test_builder_requires_base_url() {
        let result = CaseSimClientBuilder::new().build();
        assert!(matches!(result, Err(ClientError::Configuration { .. })));
    }

    #[test]
    fn test_builder_saves_initial_credentials() {
        let client = CaseSimClient::builder()
            .base_url("https://casesim.example/api")
            .transport(Arc::new(MockTransport::new()))
            .credentials(Credentials::new("access_token_1"))
            .build()
            .unwrap();

        assert!(client.credentials().load().is_some());
        assert!(!client.image_search().is_active());
    }

    #[tokio::test]
    async fn test_custom_headers_and_refresh_header_name() {
        let transport = Arc::new(MockTransport::new());
        transport.queue(MockResponse::json(&serde_json::json!({"id": "case-1"})));

        let client = CaseSimClient::builder()
            .base_url("https://casesim.example/api")
            .transport(transport.clone())
            .header("X-Client", "case-sim")
            .refresh_token_header("X-Session-Refresh")
            .credentials(Credentials::new("a").with_refresh_token("r"))
            .build()
            .unwrap();

        let body: serde_json::Value = client.fetch_json(ApiRequest::get("cases/1")).await.unwrap();
        assert_eq!(body["id"], "case-1");

        let recorded = transport.last_request().unwrap();
        assert_eq!(recorded.headers.get("X-Client"), Some(&"case-sim".to_string()));
        assert_eq!(
            recorded.headers.get("X-Session-Refresh"),
            Some(&"r".to_string())
        );
    }
}
