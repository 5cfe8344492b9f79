//! Mock implementations for testing.
//!
//! Provides a scriptable transport (buffered, chunked and channel-fed
//! streaming bodies) and a session handler that records expiry signals.

use async_trait::async_trait;
use bytes::Bytes;
use futures::channel::mpsc;
use futures::StreamExt;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::Notify;

use crate::auth::SessionExpiryHandler;
use crate::transport::{
    ByteStream, HttpMethod, HttpRequest, HttpResponse, HttpTransport, StreamingResponse,
    TransportError,
};

/// One scripted piece of a streaming body.
#[derive(Debug, Clone)]
pub enum MockChunk {
    /// Bytes delivered as one chunk.
    Data(Bytes),
    /// Transport failure at this point of the body.
    Error(String),
}

impl MockChunk {
    /// Creates a data chunk from text.
    pub fn text(text: &str) -> Self {
        MockChunk::Data(Bytes::copy_from_slice(text.as_bytes()))
    }
}

type ChunkReceiver = mpsc::UnboundedReceiver<Result<Bytes, TransportError>>;

#[derive(Debug, Clone)]
enum MockBody {
    Buffered(Vec<u8>),
    Chunked { chunks: Vec<MockChunk>, hang: bool },
    Channel(Arc<Mutex<Option<ChunkReceiver>>>),
}

/// A mock response.
#[derive(Debug, Clone)]
pub struct MockResponse {
    /// HTTP status code.
    pub status: u16,
    /// Response headers.
    pub headers: HashMap<String, String>,
    body: MockBody,
}

impl MockResponse {
    /// Creates a successful JSON response.
    pub fn json<T: serde::Serialize>(value: &T) -> Self {
        let body = serde_json::to_vec(value).unwrap_or_default();
        let mut headers = HashMap::new();
        headers.insert("content-type".to_string(), "application/json".to_string());

        Self {
            status: 200,
            headers,
            body: MockBody::Buffered(body),
        }
    }

    /// Creates an error response with a `detail` body.
    pub fn error(status: u16, message: &str) -> Self {
        let body = serde_json::to_vec(&serde_json::json!({ "detail": message }))
            .unwrap_or_default();

        Self {
            status,
            headers: HashMap::new(),
            body: MockBody::Buffered(body),
        }
    }

    /// Creates a 200 response whose body arrives in the given chunks.
    pub fn chunked(chunks: Vec<MockChunk>) -> Self {
        Self {
            status: 200,
            headers: HashMap::new(),
            body: MockBody::Chunked {
                chunks,
                hang: false,
            },
        }
    }

    /// Creates a 200 response from text chunks.
    pub fn text_chunks(chunks: &[&str]) -> Self {
        Self::chunked(chunks.iter().map(|c| MockChunk::text(c)).collect())
    }

    /// Creates a 200 response fed by the returned sender.
    ///
    /// The body ends when the sender is dropped.
    pub fn channel() -> (Self, mpsc::UnboundedSender<Result<Bytes, TransportError>>) {
        let (tx, rx) = mpsc::unbounded();
        let response = Self {
            status: 200,
            headers: HashMap::new(),
            body: MockBody::Channel(Arc::new(Mutex::new(Some(rx)))),
        };
        (response, tx)
    }

    /// Keeps the body open after the scripted chunks instead of ending it.
    pub fn then_hang(mut self) -> Self {
        if let MockBody::Chunked { hang, .. } = &mut self.body {
            *hang = true;
        }
        self
    }

    /// Creates a response with custom status.
    pub fn with_status(mut self, status: u16) -> Self {
        self.status = status;
        self
    }

    /// Adds a header.
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.insert(name.to_string(), value.to_string());
        self
    }

    fn buffered_body(&self) -> Vec<u8> {
        match &self.body {
            MockBody::Buffered(body) => body.clone(),
            MockBody::Chunked { chunks, .. } => chunks
                .iter()
                .filter_map(|c| match c {
                    MockChunk::Data(b) => Some(b.to_vec()),
                    MockChunk::Error(_) => None,
                })
                .flatten()
                .collect(),
            MockBody::Channel(_) => Vec::new(),
        }
    }

    fn into_stream(self) -> ByteStream {
        match self.body {
            MockBody::Buffered(body) => {
                Box::pin(futures::stream::once(async move { Ok(Bytes::from(body)) }))
            }
            MockBody::Chunked { chunks, hang } => {
                let items = futures::stream::iter(chunks.into_iter().map(|c| match c {
                    MockChunk::Data(b) => Ok(b),
                    MockChunk::Error(message) => Err(TransportError::InvalidResponse { message }),
                }));
                if hang {
                    Box::pin(items.chain(futures::stream::pending()))
                } else {
                    Box::pin(items)
                }
            }
            MockBody::Channel(slot) => {
                let rx = slot.lock().unwrap_or_else(PoisonError::into_inner).take();
                match rx {
                    Some(rx) => Box::pin(rx),
                    None => Box::pin(futures::stream::empty()),
                }
            }
        }
    }
}

/// A recorded request.
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    /// HTTP method.
    pub method: HttpMethod,
    /// Request path.
    pub path: String,
    /// Request body.
    pub body: Option<Vec<u8>>,
    /// Request headers.
    pub headers: HashMap<String, String>,
    /// True if sent through the streaming entry point.
    pub streaming: bool,
}

impl RecordedRequest {
    /// Parses the recorded body as JSON.
    pub fn json_body(&self) -> Option<serde_json::Value> {
        self.body
            .as_deref()
            .and_then(|b| serde_json::from_slice(b).ok())
    }
}

/// Mock HTTP transport for testing.
pub struct MockTransport {
    responses: Mutex<Vec<MockResponse>>,
    requests: Mutex<Vec<RecordedRequest>>,
    default_response: Mutex<Option<MockResponse>>,
    connect_failure: Mutex<Option<String>>,
}

impl MockTransport {
    /// Creates a new mock transport.
    pub fn new() -> Self {
        Self {
            responses: Mutex::new(Vec::new()),
            requests: Mutex::new(Vec::new()),
            default_response: Mutex::new(None),
            connect_failure: Mutex::new(None),
        }
    }

    /// Queues a response.
    pub fn queue(&self, response: MockResponse) {
        self.responses
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(response);
    }

    /// Queues an error response.
    pub fn queue_error(&self, status: u16, message: &str) {
        self.queue(MockResponse::error(status, message));
    }

    /// Sets the default response.
    pub fn set_default(&self, response: MockResponse) {
        *self
            .default_response
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(response);
    }

    /// Makes every following request fail before a response arrives.
    pub fn fail_connections(&self, message: &str) {
        *self
            .connect_failure
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(message.to_string());
    }

    /// Gets all recorded requests.
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Gets the last recorded request.
    pub fn last_request(&self) -> Option<RecordedRequest> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .last()
            .cloned()
    }

    /// Returns the number of requests made.
    pub fn request_count(&self) -> usize {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    fn next_response(&self) -> Result<MockResponse, TransportError> {
        if let Some(message) = self
            .connect_failure
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
        {
            return Err(TransportError::Connection { message });
        }

        let mut responses = self.responses.lock().unwrap_or_else(PoisonError::into_inner);
        if responses.is_empty() {
            Ok(self
                .default_response
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clone()
                .unwrap_or_else(|| MockResponse::error(500, "No mock response configured")))
        } else {
            Ok(responses.remove(0))
        }
    }

    fn record(&self, request: &HttpRequest, streaming: bool) {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(RecordedRequest {
                method: request.method,
                path: request.path.clone(),
                body: request.body.clone(),
                headers: request.headers.clone(),
                streaming,
            });
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HttpTransport for MockTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        self.record(&request, false);

        let response = self.next_response()?;
        Ok(HttpResponse {
            status: response.status,
            body: response.buffered_body(),
            headers: response.headers,
        })
    }

    async fn send_streaming(
        &self,
        request: HttpRequest,
    ) -> Result<StreamingResponse, TransportError> {
        self.record(&request, true);

        let response = self.next_response()?;
        let status = response.status;
        let headers = response.headers.clone();

        Ok(StreamingResponse {
            status,
            headers,
            stream: response.into_stream(),
        })
    }
}

impl std::fmt::Debug for MockTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockTransport")
            .field("request_count", &self.request_count())
            .finish()
    }
}

/// Session handler that counts expiry signals.
#[derive(Debug, Default)]
pub struct RecordingSessionHandler {
    count: AtomicUsize,
    notify: Notify,
}

impl RecordingSessionHandler {
    /// Creates a new handler.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of expiry signals received.
    pub fn count(&self) -> usize {
        self.count.load(Ordering::SeqCst)
    }

    /// Waits for the next expiry signal.
    pub async fn notified(&self) {
        self.notify.notified().await;
    }
}

#[async_trait]
impl SessionExpiryHandler for RecordingSessionHandler {
    async fn on_session_expired(&self) {
        self.count.fetch_add(1, Ordering::SeqCst);
        self.notify.notify_one();
    }
}
