//! Case Simulator Client Library
//!
//! An async Rust client for the clinical case simulator backend. The main
//! piece is streaming image search ingestion: a newline-delimited JSON
//! response is decoded incrementally and delivered as
//! [`StreamingImageBatch`] values while the body is still arriving.
//!
//! # Features
//!
//! - **Streaming Ingestion**: Incremental UTF-8 decoding and line framing that
//!   survives arbitrary chunk boundaries
//! - **Cancellation**: At most one active search; starting a new one or
//!   calling `cancel` silently stops the previous stream
//! - **Authentication**: Bearer and refresh token headers on every request,
//!   with session expiry handling on HTTP 401
//! - **Observability**: Structured logging via `tracing` and stream metrics
//!
//! # Callback Example
//!
//! ```rust,no_run
//! use case_sim_client::{BatchCallbacks, CaseSimClient, ImageSearchParams, StreamingImageBatch};
//!
//! #[derive(Default)]
//! struct Collect(Vec<StreamingImageBatch>);
//!
//! impl BatchCallbacks for Collect {
//!     fn on_batch(&mut self, batch: StreamingImageBatch) {
//!         self.0.push(batch);
//!     }
//!     fn on_complete(&mut self) {}
//!     fn on_error(&mut self, message: &str) {
//!         eprintln!("image search failed: {message}");
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = CaseSimClient::from_env()?;
//!     let params = ImageSearchParams::new("case-7", "imaging", "Chest X-ray")
//!         .max_results(12);
//!
//!     let mut collected = Collect::default();
//!     client.image_search().start(params, &mut collected).await;
//!     println!("received {} batches", collected.0.len());
//!     Ok(())
//! }
//! ```
//!
//! # Streaming Example
//!
//! ```rust,no_run
//! use case_sim_client::{CaseSimClient, ImageSearchParams};
//! use futures::StreamExt;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = CaseSimClient::from_env()?;
//!     let params = ImageSearchParams::new("case-7", "imaging", "Chest X-ray");
//!
//!     let mut stream = client.image_search().open_stream(&params).await?;
//!     while let Some(batch) = stream.next().await {
//!         let batch = batch?;
//!         println!("batch {}: {} images", batch.batch_number, batch.images.len());
//!     }
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod auth;
pub mod client;
pub mod config;
pub mod errors;
pub mod observability;
pub mod services;
pub mod transport;
pub mod types;

// Re-exports for convenience
pub use auth::{CredentialStore, Credentials, InMemoryCredentialStore, SessionExpiryHandler};
pub use client::{CaseSimClient, CaseSimClientBuilder};
pub use config::ClientConfig;
pub use errors::{ClientError, ClientResult};
pub use observability::{StreamMetrics, StreamOutcome};
pub use services::{BatchCallbacks, ImageSearchService};
pub use transport::{ApiRequest, ImageBatchStream};

// Type re-exports
pub use types::image_search::{ImageResult, ImageSearchParams, StreamingImageBatch};

/// Mock implementations for testing.
#[cfg(any(test, feature = "mocks"))]
pub mod mocks;
