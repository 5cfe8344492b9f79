//! Authenticated request layer.
//!
//! Every backend call goes through here: credentials are attached, bodies
//! are JSON encoded, and a 401 expires the session before the response is
//! handed back unconsumed.

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::instrument;

use super::{HttpMethod, HttpRequest, HttpResponse, HttpTransport, StreamingResponse};
use crate::auth::{AuthProvider, SessionExpiryHandler};
use crate::errors::{ApiErrorBody, ClientError, ClientResult};

/// A backend request before credentials are attached.
#[derive(Debug, Clone, Default)]
pub struct ApiRequest {
    /// HTTP method; GET unless set.
    pub method: HttpMethod,
    /// Path relative to the base URL, or an absolute URL.
    pub target: String,
    /// Structured body, JSON encoded on send.
    pub body: Option<serde_json::Value>,
    /// Extra headers.
    pub headers: HashMap<String, String>,
    /// Timeout override.
    pub timeout: Option<Duration>,
}

impl ApiRequest {
    /// Creates a GET request for `target`.
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            ..Self::default()
        }
    }

    /// Creates a GET request.
    pub fn get(target: impl Into<String>) -> Self {
        Self::new(target)
    }

    /// Creates a POST request.
    pub fn post(target: impl Into<String>) -> Self {
        Self::new(target).method(HttpMethod::Post)
    }

    /// Creates a PUT request.
    pub fn put(target: impl Into<String>) -> Self {
        Self::new(target).method(HttpMethod::Put)
    }

    /// Creates a PATCH request.
    pub fn patch(target: impl Into<String>) -> Self {
        Self::new(target).method(HttpMethod::Patch)
    }

    /// Creates a DELETE request.
    pub fn delete(target: impl Into<String>) -> Self {
        Self::new(target).method(HttpMethod::Delete)
    }

    /// Sets the method.
    pub fn method(mut self, method: HttpMethod) -> Self {
        self.method = method;
        self
    }

    /// Sets a structured body from any serializable value.
    pub fn json<T: Serialize + ?Sized>(mut self, body: &T) -> ClientResult<Self> {
        self.body = Some(serde_json::to_value(body)?);
        Ok(self)
    }

    /// Sets a header.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// Sets the timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// Transport wrapper that authenticates requests and expires the session on 401.
pub struct AuthenticatedTransport {
    transport: Arc<dyn HttpTransport>,
    auth: Arc<dyn AuthProvider>,
    session_handler: Arc<dyn SessionExpiryHandler>,
    default_headers: Vec<(String, String)>,
}

impl AuthenticatedTransport {
    /// Creates a new authenticated transport.
    pub fn new(
        transport: Arc<dyn HttpTransport>,
        auth: Arc<dyn AuthProvider>,
        session_handler: Arc<dyn SessionExpiryHandler>,
    ) -> Self {
        Self {
            transport,
            auth,
            session_handler,
            default_headers: Vec::new(),
        }
    }

    /// Sets headers added to every request before caller headers.
    pub fn with_default_headers(mut self, headers: Vec<(String, String)>) -> Self {
        self.default_headers = headers;
        self
    }

    /// Sends a request and returns the buffered response, whatever its status.
    #[instrument(skip(self, request), fields(method = ?request.method, target = %request.target))]
    pub async fn fetch(&self, request: ApiRequest) -> ClientResult<HttpResponse> {
        let http_request = self.prepare(request)?;
        let response = self.transport.send(http_request).await?;
        self.observe_status(response.status);
        Ok(response)
    }

    /// Sends a request and returns the response with its body unread.
    #[instrument(skip(self, request), fields(method = ?request.method, target = %request.target))]
    pub async fn fetch_streaming(&self, request: ApiRequest) -> ClientResult<StreamingResponse> {
        let http_request = self.prepare(request)?;
        let response = self.transport.send_streaming(http_request).await?;
        self.observe_status(response.status);
        Ok(response)
    }

    /// Sends a request and deserializes a 2xx JSON body.
    ///
    /// 401 maps to [`ClientError::SessionExpired`]; other non-2xx statuses map
    /// to [`ClientError::Http`] carrying the backend's error detail.
    pub async fn fetch_json<T: DeserializeOwned>(&self, request: ApiRequest) -> ClientResult<T> {
        let response = self.fetch(request).await?;

        if response.status == 401 {
            return Err(ClientError::SessionExpired);
        }
        if !response.is_success() {
            return Err(ClientError::http(
                response.status,
                ApiErrorBody::message_from(&response.body),
            ));
        }

        Ok(response.json()?)
    }

    fn prepare(&self, request: ApiRequest) -> ClientResult<HttpRequest> {
        let mut headers: HashMap<String, String> = self.default_headers.iter().cloned().collect();

        let body = match request.body {
            Some(value) => {
                headers.insert("Content-Type".to_string(), "application/json".to_string());
                Some(serde_json::to_vec(&value)?)
            }
            None => None,
        };

        headers.extend(request.headers);

        if !self.auth.apply_auth(&mut headers) {
            tracing::debug!("No stored credentials; sending request without authorization");
        }

        Ok(HttpRequest {
            method: request.method,
            path: request.target,
            headers,
            body,
            timeout: request.timeout,
        })
    }

    fn observe_status(&self, status: u16) {
        if status != 401 {
            return;
        }

        tracing::warn!("Backend rejected credentials; expiring session");
        self.auth.invalidate();

        let handler = Arc::clone(&self.session_handler);
        tokio::spawn(async move {
            handler.on_session_expired().await;
        });
    }
}

impl std::fmt::Debug for AuthenticatedTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthenticatedTransport")
            .field("auth_scheme", &self.auth.scheme())
            .field("default_headers", &self.default_headers.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{CredentialStore, Credentials, InMemoryCredentialStore, TokenAuth};
    use crate::mocks::{MockResponse, MockTransport, RecordingSessionHandler};
    use tokio::time::timeout;

    struct Fixture {
        transport: Arc<MockTransport>,
        store: Arc<InMemoryCredentialStore>,
        handler: Arc<RecordingSessionHandler>,
        client: AuthenticatedTransport,
    }

    fn fixture() -> Fixture {
        let transport = Arc::new(MockTransport::new());
        let store = Arc::new(InMemoryCredentialStore::with_credentials(
            Credentials::new("access_token_1").with_refresh_token("refresh_token_1"),
        ));
        let handler = Arc::new(RecordingSessionHandler::new());
        let client = AuthenticatedTransport::new(
            transport.clone(),
            Arc::new(TokenAuth::new(store.clone())),
            handler.clone(),
        );
        Fixture {
            transport,
            store,
            handler,
            client,
        }
    }

    #[tokio::test]
    async fn test_fetch_attaches_credentials() {
        let f = fixture();
        f.transport
            .queue(MockResponse::json(&serde_json::json!({"ok": true})));

        let response = f.client.fetch(ApiRequest::get("cases")).await.unwrap();
        assert_eq!(response.status, 200);

        let recorded = f.transport.last_request().unwrap();
        assert_eq!(recorded.method, HttpMethod::Get);
        assert_eq!(
            recorded.headers.get("Authorization"),
            Some(&"Bearer access_token_1".to_string())
        );
        assert_eq!(
            recorded.headers.get("X-Refresh-Token"),
            Some(&"refresh_token_1".to_string())
        );
        assert!(recorded.body.is_none());
    }

    #[tokio::test]
    async fn test_fetch_encodes_json_body() {
        let f = fixture();
        f.transport
            .queue(MockResponse::json(&serde_json::json!({})));

        let request = ApiRequest::post("cases/3/diagnosis")
            .json(&serde_json::json!({"diagnosis": "Sepsis"}))
            .unwrap()
            .header("X-Trace", "abc");
        f.client.fetch(request).await.unwrap();

        let recorded = f.transport.last_request().unwrap();
        assert_eq!(
            recorded.headers.get("Content-Type"),
            Some(&"application/json".to_string())
        );
        assert_eq!(recorded.headers.get("X-Trace"), Some(&"abc".to_string()));
        let body: serde_json::Value = serde_json::from_slice(&recorded.body.unwrap()).unwrap();
        assert_eq!(body["diagnosis"], "Sepsis");
    }

    #[tokio::test]
    async fn test_non_success_is_returned_not_raised() {
        let f = fixture();
        f.transport.queue_error(404, "Case not found");

        let response = f.client.fetch(ApiRequest::get("cases/9")).await.unwrap();
        assert_eq!(response.status, 404);
        assert!(f.store.load().is_some());
        assert_eq!(f.handler.count(), 0);
    }

    #[tokio::test]
    async fn test_unauthorized_expires_session() {
        let f = fixture();
        f.transport.queue_error(401, "Token expired");

        let response = f.client.fetch(ApiRequest::get("cases")).await.unwrap();
        assert_eq!(response.status, 401);
        assert!(f.store.load().is_none());

        timeout(Duration::from_secs(1), f.handler.notified())
            .await
            .unwrap();
        assert_eq!(f.handler.count(), 1);
    }

    #[tokio::test]
    async fn test_fetch_json_maps_errors() {
        let f = fixture();
        f.transport.queue_error(422, "Invalid diagnosis");
        f.transport.queue_error(401, "Token expired");

        let err = f
            .client
            .fetch_json::<serde_json::Value>(ApiRequest::get("a"))
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::Http { status: 422, ref message } if message == "Invalid diagnosis"));

        let err = f
            .client
            .fetch_json::<serde_json::Value>(ApiRequest::get("b"))
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::SessionExpired));
    }

    #[tokio::test]
    async fn test_request_without_credentials_has_no_authorization() {
        let f = fixture();
        f.store.clear();
        f.transport
            .queue(MockResponse::json(&serde_json::json!({})));

        f.client.fetch(ApiRequest::get("public/health")).await.unwrap();

        let recorded = f.transport.last_request().unwrap();
        assert!(!recorded.headers.contains_key("Authorization"));
    }
}
