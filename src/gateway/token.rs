use std::time::{Duration, Instant};
use tokio::sync::RwLock;

/// Tokens are dropped this long before the provider says they expire.
pub const EXPIRY_MARGIN: Duration = Duration::from_secs(10 * 60);
/// Validity assumed when the token response carries no `expires_in`.
pub const DEFAULT_TOKEN_VALIDITY: Duration = Duration::from_secs(60 * 60);

struct CachedToken {
    value: String,
    expires_at: Instant,
}

/// OAuth access token cache owned by one gateway client. Concurrent
/// refreshes may race; the last one written wins.
#[derive(Default)]
pub struct TokenCache {
    slot: RwLock<Option<CachedToken>>,
}

impl TokenCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// The cached token, unless it is missing or past its usable lifetime.
    pub async fn current(&self) -> Option<String> {
        let slot = self.slot.read().await;
        slot.as_ref().filter(|t| Instant::now() < t.expires_at).map(|t| t.value.clone())
    }

    pub async fn store(&self, value: String, valid_for: Duration) {
        let expires_at = Instant::now() + valid_for.saturating_sub(EXPIRY_MARGIN);
        *self.slot.write().await = Some(CachedToken { value, expires_at });
    }

    pub async fn invalidate(&self) {
        *self.slot.write().await = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_token_reused_until_invalidated() {
        let cache = TokenCache::new();
        assert!(cache.current().await.is_none());

        cache.store("tok-1".into(), DEFAULT_TOKEN_VALIDITY).await;
        assert_eq!(cache.current().await.as_deref(), Some("tok-1"));

        cache.invalidate().await;
        assert!(cache.current().await.is_none());
    }

    #[tokio::test]
    async fn test_token_inside_margin_is_expired() {
        let cache = TokenCache::new();
        cache.store("short".into(), Duration::from_secs(5 * 60)).await;
        assert!(cache.current().await.is_none());
    }
}
