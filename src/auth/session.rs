//! Session expiry notification.

use async_trait::async_trait;

/// Receives the out-of-band "session expired" signal raised on HTTP 401.
///
/// Invoked on a detached task after the credentials have been cleared, so
/// the request that observed the 401 never waits on it. Typical
/// implementations navigate to the login screen and show a notification.
#[async_trait]
pub trait SessionExpiryHandler: Send + Sync {
    /// Called once per 401 response.
    async fn on_session_expired(&self);
}

/// Handler that only logs the expiry.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopSessionHandler;

#[async_trait]
impl SessionExpiryHandler for NoopSessionHandler {
    async fn on_session_expired(&self) {
        tracing::info!("Session expired; no handler registered");
    }
}
