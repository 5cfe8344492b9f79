//! Streaming image search service.
//!
//! Drives one ingestion stream at a time and delivers its batches through
//! [`BatchCallbacks`]. Starting a stream cancels the previous one first.

use futures::StreamExt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::errors::{ClientError, ClientResult};
use crate::observability::{StreamMetrics, StreamOutcome};
use crate::transport::{ApiRequest, AuthenticatedTransport, ImageBatchStream};
use crate::types::image_search::{ImageSearchParams, StreamingImageBatch};

/// Receivers for an ingestion stream.
///
/// After `on_complete` or `on_error` no further calls are made. Neither is
/// called when the stream is cancelled.
pub trait BatchCallbacks: Send {
    /// Called once per batch, in arrival order.
    fn on_batch(&mut self, batch: StreamingImageBatch);

    /// Called once when the stream ends successfully.
    fn on_complete(&mut self);

    /// Called once when the stream fails.
    fn on_error(&mut self, message: &str);
}

#[derive(Debug)]
struct ActiveStream {
    id: u64,
    token: CancellationToken,
}

/// Streaming image search service.
pub struct ImageSearchService {
    transport: Arc<AuthenticatedTransport>,
    stream_path: String,
    metrics: Arc<dyn StreamMetrics>,
    active: Mutex<Option<ActiveStream>>,
    next_id: AtomicU64,
}

impl ImageSearchService {
    /// Creates a new image search service.
    pub fn new(
        transport: Arc<AuthenticatedTransport>,
        stream_path: impl Into<String>,
        metrics: Arc<dyn StreamMetrics>,
    ) -> Self {
        Self {
            transport,
            stream_path: stream_path.into(),
            metrics,
            active: Mutex::new(None),
            next_id: AtomicU64::new(1),
        }
    }

    /// Runs a stream to its end, delivering batches to `callbacks`.
    ///
    /// Any stream already active on this service is cancelled before the new
    /// request is sent.
    pub async fn start<C: BatchCallbacks>(
        &self,
        params: ImageSearchParams,
        callbacks: &mut C,
    ) -> StreamOutcome {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let token = CancellationToken::new();

        {
            let mut active = self.active.lock().unwrap_or_else(PoisonError::into_inner);
            if let Some(previous) = active.replace(ActiveStream {
                id,
                token: token.clone(),
            }) {
                tracing::debug!(stream_id = previous.id, "Cancelling superseded stream");
                previous.token.cancel();
            }
        }

        let span = tracing::info_span!(
            "image_search_stream",
            stream_id = id,
            case_id = %params.case_id,
            test_name = %params.test_name,
        );

        self.metrics.record_stream_started();
        let started = Instant::now();

        let (outcome, delivered, malformed) = self
            .run(&params, callbacks, &token)
            .instrument(span)
            .await;

        self.release(id);
        self.metrics.record_batches(delivered, malformed);
        self.metrics
            .record_stream_finished(outcome, started.elapsed());

        tracing::debug!(stream_id = id, ?outcome, delivered, malformed, "Stream finished");
        outcome
    }

    /// Cancels the active stream, if any.
    pub fn cancel(&self) {
        let previous = self
            .active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        if let Some(previous) = previous {
            tracing::debug!(stream_id = previous.id, "Cancelling stream");
            previous.token.cancel();
        }
    }

    /// Returns true while a stream is open.
    pub fn is_active(&self) -> bool {
        self.active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Opens a stream and returns it as a pull-based batch stream.
    ///
    /// The returned stream is independent of `start`/`cancel`; drop it to
    /// abort the transfer.
    pub async fn open_stream(&self, params: &ImageSearchParams) -> ClientResult<ImageBatchStream> {
        let response = self.transport.fetch_streaming(self.request(params)?).await?;
        if response.status == 401 {
            return Err(ClientError::SessionExpired);
        }
        ImageBatchStream::from_response(response)
    }

    fn request(&self, params: &ImageSearchParams) -> ClientResult<ApiRequest> {
        ApiRequest::post(self.stream_path.as_str())
            .header("Accept", "text/event-stream")
            .json(params)
    }

    async fn run<C: BatchCallbacks>(
        &self,
        params: &ImageSearchParams,
        callbacks: &mut C,
        token: &CancellationToken,
    ) -> (StreamOutcome, u64, u64) {
        let request = match self.request(params) {
            Ok(request) => request,
            Err(e) => return (fail(callbacks, token, &e), 0, 0),
        };

        let opened = tokio::select! {
            biased;
            () = token.cancelled() => return (StreamOutcome::Cancelled, 0, 0),
            result = self.transport.fetch_streaming(request) => result,
        };

        let response = match opened {
            Ok(response) => response,
            Err(e) => return (fail(callbacks, token, &e), 0, 0),
        };

        if !response.is_success() {
            let error = if response.status == 401 {
                ClientError::SessionExpired
            } else {
                ClientError::http(response.status, "Image search request was rejected")
            };
            return (fail(callbacks, token, &error), 0, 0);
        }

        tracing::info!("Image search stream opened");

        let mut stream = ImageBatchStream::new(response.stream);
        let mut delivered = 0u64;

        let outcome = loop {
            let item = tokio::select! {
                biased;
                () = token.cancelled() => break StreamOutcome::Cancelled,
                item = stream.next() => item,
            };

            if token.is_cancelled() {
                break StreamOutcome::Cancelled;
            }

            match item {
                Some(Ok(batch)) => {
                    let is_final = batch.is_final;
                    tracing::debug!(
                        batch_number = batch.batch_number,
                        images = batch.images.len(),
                        is_final,
                        "Delivering batch"
                    );
                    delivered += 1;
                    callbacks.on_batch(batch);
                    if is_final {
                        callbacks.on_complete();
                        break StreamOutcome::Completed;
                    }
                }
                Some(Err(e)) => break fail(callbacks, token, &e),
                None => {
                    callbacks.on_complete();
                    break StreamOutcome::Completed;
                }
            }
        };

        (outcome, delivered, stream.malformed_lines())
    }

    /// Clears the active slot if it still belongs to stream `id`.
    fn release(&self, id: u64) {
        let mut active = self.active.lock().unwrap_or_else(PoisonError::into_inner);
        if active.as_ref().is_some_and(|a| a.id == id) {
            *active = None;
        }
    }
}

fn fail<C: BatchCallbacks>(
    callbacks: &mut C,
    token: &CancellationToken,
    error: &ClientError,
) -> StreamOutcome {
    if token.is_cancelled() {
        return StreamOutcome::Cancelled;
    }
    tracing::warn!(error = %error, "Image search stream failed");
    callbacks.on_error(&error.to_string());
    StreamOutcome::Failed
}

impl std::fmt::Debug for ImageSearchService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImageSearchService")
            .field("stream_path", &self.stream_path)
            .field("active", &self.is_active())
            .finish()
    }
}
