//! Authentication module for the case simulator client.
//!
//! Holds the session's access and refresh tokens and applies them to
//! outgoing requests as a bearer token plus a refresh-token header.

mod session;

pub use session::{NoopSessionHandler, SessionExpiryHandler};

use secrecy::{ExposeSecret, SecretString};
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use crate::config::DEFAULT_REFRESH_TOKEN_HEADER;

/// Session credentials issued by the backend at login.
#[derive(Clone)]
pub struct Credentials {
    access_token: SecretString,
    refresh_token: Option<SecretString>,
}

impl Credentials {
    /// Creates credentials from an access token.
    pub fn new(access_token: impl Into<String>) -> Self {
        Self {
            access_token: SecretString::new(access_token.into()),
            refresh_token: None,
        }
    }

    /// Attaches a refresh token.
    pub fn with_refresh_token(mut self, refresh_token: impl Into<String>) -> Self {
        self.refresh_token = Some(SecretString::new(refresh_token.into()));
        self
    }

    /// Returns true if a refresh token is present.
    pub fn has_refresh_token(&self) -> bool {
        self.refresh_token.is_some()
    }

    /// Gets a hint of the access token for debugging (last 4 characters).
    pub fn token_hint(&self) -> String {
        let token = self.access_token.expose_secret();
        if token.len() > 4 && token.is_char_boundary(token.len() - 4) {
            format!("...{}", &token[token.len() - 4..])
        } else {
            "****".to_string()
        }
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("access_token", &"[REDACTED]")
            .field("token_hint", &self.token_hint())
            .field("has_refresh_token", &self.has_refresh_token())
            .finish()
    }
}

/// Storage for the current session's credentials.
///
/// The embedding application owns persistence; the client only reads the
/// current value and clears it when the backend reports the session expired.
pub trait CredentialStore: Send + Sync {
    /// Returns the stored credentials, if any.
    fn load(&self) -> Option<Credentials>;

    /// Replaces the stored credentials.
    fn save(&self, credentials: Credentials);

    /// Removes the stored credentials.
    fn clear(&self);
}

/// Process-local credential store.
#[derive(Default)]
pub struct InMemoryCredentialStore {
    inner: RwLock<Option<Credentials>>,
}

impl InMemoryCredentialStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store holding the given credentials.
    pub fn with_credentials(credentials: Credentials) -> Self {
        Self {
            inner: RwLock::new(Some(credentials)),
        }
    }
}

impl CredentialStore for InMemoryCredentialStore {
    fn load(&self) -> Option<Credentials> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn save(&self, credentials: Credentials) {
        *self.inner.write().unwrap_or_else(PoisonError::into_inner) = Some(credentials);
    }

    fn clear(&self) {
        *self.inner.write().unwrap_or_else(PoisonError::into_inner) = None;
    }
}

impl std::fmt::Debug for InMemoryCredentialStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryCredentialStore")
            .field("credentials", &self.load())
            .finish()
    }
}

/// Authentication provider trait.
///
/// Implementations attach credentials to request headers and drop them
/// when the session is invalidated.
pub trait AuthProvider: Send + Sync {
    /// Apply authentication to request headers.
    ///
    /// Returns false when no credentials were available.
    fn apply_auth(&self, headers: &mut HashMap<String, String>) -> bool;

    /// Get the authentication scheme name.
    fn scheme(&self) -> &str;

    /// Discard the current credentials.
    fn invalidate(&self);
}

/// Bearer token authentication backed by a [`CredentialStore`].
pub struct TokenAuth {
    store: Arc<dyn CredentialStore>,
    refresh_header: String,
}

impl TokenAuth {
    /// Creates a provider using the default refresh-token header.
    pub fn new(store: Arc<dyn CredentialStore>) -> Self {
        Self::with_refresh_header(store, DEFAULT_REFRESH_TOKEN_HEADER)
    }

    /// Creates a provider with a custom refresh-token header name.
    pub fn with_refresh_header(
        store: Arc<dyn CredentialStore>,
        refresh_header: impl Into<String>,
    ) -> Self {
        Self {
            store,
            refresh_header: refresh_header.into(),
        }
    }

    /// Returns the underlying credential store.
    pub fn store(&self) -> &Arc<dyn CredentialStore> {
        &self.store
    }
}

impl AuthProvider for TokenAuth {
    fn apply_auth(&self, headers: &mut HashMap<String, String>) -> bool {
        let Some(credentials) = self.store.load() else {
            return false;
        };

        headers.insert(
            "Authorization".to_string(),
            format!("Bearer {}", credentials.access_token.expose_secret()),
        );

        if let Some(refresh) = &credentials.refresh_token {
            headers.insert(
                self.refresh_header.clone(),
                refresh.expose_secret().clone(),
            );
        }

        true
    }

    fn scheme(&self) -> &str {
        "Bearer"
    }

    fn invalidate(&self) {
        self.store.clear();
    }
}

impl std::fmt::Debug for TokenAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenAuth")
            .field("refresh_header", &self.refresh_header)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn auth_with(credentials: Option<Credentials>) -> TokenAuth {
        let store = match credentials {
            Some(c) => InMemoryCredentialStore::with_credentials(c),
            None => InMemoryCredentialStore::new(),
        };
        TokenAuth::new(Arc::new(store))
    }

    #[test]
    fn test_token_auth_apply_bearer_and_refresh() {
        let auth = auth_with(Some(
            Credentials::new("access_abc123").with_refresh_token("refresh_xyz"),
        ));
        let mut headers = HashMap::new();

        assert!(auth.apply_auth(&mut headers));

        assert_eq!(
            headers.get("Authorization"),
            Some(&"Bearer access_abc123".to_string())
        );
        assert_eq!(
            headers.get("X-Refresh-Token"),
            Some(&"refresh_xyz".to_string())
        );
    }

    #[test]
    fn test_token_auth_without_refresh_token() {
        let auth = auth_with(Some(Credentials::new("access_only")));
        let mut headers = HashMap::new();

        assert!(auth.apply_auth(&mut headers));
        assert_eq!(headers.len(), 1);
    }

    #[test]
    fn test_token_auth_without_credentials() {
        let auth = auth_with(None);
        let mut headers = HashMap::new();

        assert!(!auth.apply_auth(&mut headers));
        assert!(headers.is_empty());
    }

    #[test]
    fn test_invalidate_clears_store() {
        let auth = auth_with(Some(Credentials::new("access_abc123")));
        auth.invalidate();

        assert!(auth.store().load().is_none());
    }

    #[test]
    fn test_custom_refresh_header() {
        let store = Arc::new(InMemoryCredentialStore::with_credentials(
            Credentials::new("a").with_refresh_token("r"),
        ));
        let auth = TokenAuth::with_refresh_header(store, "X-Session-Refresh");
        let mut headers = HashMap::new();
        auth.apply_auth(&mut headers);

        assert_eq!(headers.get("X-Session-Refresh"), Some(&"r".to_string()));
    }

    #[test]
    fn test_token_hint() {
        assert_eq!(Credentials::new("access_abc12345").token_hint(), "...2345");
        assert_eq!(Credentials::new("abc").token_hint(), "****");
    }

    #[test]
    fn test_debug_redacts_tokens() {
        let credentials = Credentials::new("secret_access").with_refresh_token("secret_refresh");
        let debug_str = format!("{:?}", credentials);

        assert!(debug_str.contains("[REDACTED]"));
        assert!(!debug_str.contains("secret_access"));
        assert!(!debug_str.contains("secret_refresh"));
    }
}
