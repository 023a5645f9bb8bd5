//! Shared token cache.
//!
//! Every clone of a [`TokenCache`] shares one signed token. Readers take the
//! read lock on the fast path; when the token is missing or close to expiry a
//! single writer re-signs while the others wait and reuse its result.

use std::sync::Arc;

use chrono::{Duration, Utc};
use tokio::sync::RwLock;
use tracing::debug;

use crate::credential::{ApiToken, TokenSigner};
use crate::error::TapError;

/// Tokens are refreshed once less than this much lifetime remains.
pub const REFRESH_MARGIN: Duration = Duration::seconds(60);

#[derive(Clone)]
pub struct TokenCache {
    signer: TokenSigner,
    inner: Arc<RwLock<Option<ApiToken>>>,
}

impl TokenCache {
    /// Build the cache and sign the first token immediately, so an unusable
    /// key fails here rather than on the first request.
    pub fn new(signer: TokenSigner) -> Result<Self, TapError> {
        let token = signer.sign(Utc::now())?;
        debug!(kid = signer.key_id(), expires_at = %token.expires_at, "Signed initial API token");
        Ok(Self {
            signer,
            inner: Arc::new(RwLock::new(Some(token))),
        })
    }

    /// Cached token if it has more than [`REFRESH_MARGIN`] left.
    pub async fn get_valid(&self) -> Option<ApiToken> {
        let cache = self.inner.read().await;
        cache
            .as_ref()
            .filter(|t| t.is_valid_at(Utc::now(), REFRESH_MARGIN))
            .cloned()
    }

    /// Return a usable token, signing a new one if needed.
    pub async fn token(&self) -> Result<ApiToken, TapError> {
        if let Some(token) = self.get_valid().await {
            return Ok(token);
        }
        self.refresh().await
    }

    async fn refresh(&self) -> Result<ApiToken, TapError> {
        let mut cache = self.inner.write().await;

        // Another caller may have refreshed while we waited for the lock.
        if let Some(token) = cache.as_ref()
            && token.is_valid_at(Utc::now(), REFRESH_MARGIN)
        {
            return Ok(token.clone());
        }

        let token = self.signer.sign(Utc::now())?;
        debug!(expires_at = %token.expires_at, "Refreshed API token");
        *cache = Some(token.clone());
        Ok(token)
    }

    /// Drop the cached token, e.g. after the API answered 401.
    pub async fn invalidate(&self) {
        let mut cache = self.inner.write().await;
        debug!("Invalidating cached API token");
        *cache = None;
    }
}
