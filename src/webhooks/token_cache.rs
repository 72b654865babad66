//! Token Cache
//!
//! In-memory store of OAuth2 access tokens keyed by token endpoint. Shared
//! between concurrent dispatches by cloning; all clones see the same entries.
//!
//! Two dispatches that miss on the same key at the same time both fetch a
//! token and the last `put` wins.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

/// A cached access token
#[derive(Clone)]
pub struct CachedToken {
    /// Bearer token value
    pub token: String,

    /// When the token stops being served, `None` for never
    pub expires_at: Option<Instant>,
}

impl CachedToken {
    pub fn new(token: impl Into<String>, lifetime: Option<Duration>) -> Self {
        Self {
            token: token.into(),
            // A lifetime past the clock's range never expires.
            expires_at: lifetime.and_then(|lifetime| Instant::now().checked_add(lifetime)),
        }
    }

    pub fn is_expired(&self) -> bool {
        self.expires_at
            .map(|expires_at| Instant::now() >= expires_at)
            .unwrap_or(false)
    }
}

// Keep token values out of logs.
impl fmt::Debug for CachedToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CachedToken")
            .field("token", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Concurrency-safe token cache
#[derive(Debug, Clone, Default)]
pub struct TokenCache {
    tokens: Arc<RwLock<HashMap<String, CachedToken>>>,
}

impl TokenCache {
    /// Create an empty token cache
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a live token; expired entries read as absent
    pub async fn get(&self, key: &str) -> Option<String> {
        let tokens = self.tokens.read().await;
        tokens
            .get(key)
            .filter(|entry| !entry.is_expired())
            .map(|entry| entry.token.clone())
    }

    /// Insert or overwrite a token that never expires
    pub async fn put(&self, key: impl Into<String>, token: impl Into<String>) {
        self.put_with_expiry(key, token, None).await;
    }

    /// Insert or overwrite a token with an optional lifetime
    pub async fn put_with_expiry(
        &self,
        key: impl Into<String>,
        token: impl Into<String>,
        lifetime: Option<Duration>,
    ) {
        let mut tokens = self.tokens.write().await;
        tokens.insert(key.into(), CachedToken::new(token, lifetime));
    }

    /// Remove a single entry
    pub async fn remove(&self, key: &str) -> Option<CachedToken> {
        let mut tokens = self.tokens.write().await;
        tokens.remove(key)
    }

    /// Drop every entry
    pub async fn clear(&self) {
        let mut tokens = self.tokens.write().await;
        tokens.clear();
    }

    /// Number of entries, expired ones included
    pub async fn len(&self) -> usize {
        self.tokens.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.tokens.read().await.is_empty()
    }
}
