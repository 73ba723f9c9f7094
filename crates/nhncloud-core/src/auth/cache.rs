//! Cached token with a serialized refresh section.

use super::token::AccessToken;
use crate::context::CallContext;
use crate::error::Result;
use std::future::Future;
use std::sync::{Arc, PoisonError, RwLock};
use tokio::sync::Mutex;
use tracing::debug;

/// Holds the current token of one provider.
///
/// Readers take the `RwLock` only long enough to clone the `Arc`; the refresh
/// mutex is held across the exchange so at most one exchange is in flight.
#[derive(Debug, Default)]
pub(crate) struct TokenCache {
    current: RwLock<Option<Arc<AccessToken>>>,
    refresh: Mutex<()>,
}

impl TokenCache {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// The cached token if it is still usable.
    pub(crate) fn usable(&self) -> Option<Arc<AccessToken>> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .filter(|token| token.is_usable())
            .cloned()
    }

    /// Drop the cached token.
    pub(crate) fn clear(&self) {
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = None;
    }

    /// Drop the cached token only if it is still `rejected`.
    ///
    /// Returns true when the cache was cleared. A token stored by a newer
    /// refresh is kept.
    pub(crate) fn clear_if(&self, rejected: &Arc<AccessToken>) -> bool {
        let mut current = self.current.write().unwrap_or_else(PoisonError::into_inner);
        if current
            .as_ref()
            .is_some_and(|token| Arc::ptr_eq(token, rejected))
        {
            *current = None;
            true
        } else {
            false
        }
    }

    fn store(&self, token: Arc<AccessToken>) {
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = Some(token);
    }

    /// Return the cached token, or run `exchange` to replace it.
    ///
    /// Callers that waited on the refresh section re-check the cache before
    /// exchanging, so a burst of callers on an expired token causes one
    /// exchange. A failed exchange leaves the cache empty.
    pub(crate) async fn get_or_refresh<F, Fut>(
        &self,
        ctx: &CallContext,
        exchange: F,
    ) -> Result<Arc<AccessToken>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<AccessToken>>,
    {
        if let Some(token) = self.usable() {
            return Ok(token);
        }

        let _guard = ctx.run(async { Ok(self.refresh.lock().await) }).await?;

        if let Some(token) = self.usable() {
            debug!("token refreshed by a concurrent caller");
            return Ok(token);
        }

        match ctx.run(exchange()).await {
            Ok(token) => {
                let token = Arc::new(token);
                self.store(Arc::clone(&token));
                debug!(expires_at = %token.expires_at(), "token refreshed");
                Ok(token)
            }
            Err(err) => {
                self.clear();
                Err(err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::token::TokenKind;
    use crate::error::Error;
    use chrono::{Duration, Utc};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn fresh(value: &str) -> AccessToken {
        AccessToken::new(value, TokenKind::Bearer, Utc::now() + Duration::hours(1))
    }

    #[tokio::test]
    async fn test_cache_hit_skips_exchange() {
        let cache = TokenCache::new();
        let ctx = CallContext::background();
        let calls = AtomicUsize::new(0);

        for _ in 0..3 {
            let token = cache
                .get_or_refresh(&ctx, || async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(fresh("a"))
                })
                .await
                .unwrap();
            assert_eq!(token.secret(), "a");
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_clear_if_keeps_newer_token() {
        let cache = TokenCache::new();
        let ctx = CallContext::background();
        let old = cache
            .get_or_refresh(&ctx, || async { Ok(fresh("t1")) })
            .await
            .unwrap();

        cache.clear();
        let newer = cache
            .get_or_refresh(&ctx, || async { Ok(fresh("t2")) })
            .await
            .unwrap();

        assert!(!cache.clear_if(&old));
        assert_eq!(cache.usable().unwrap().secret(), "t2");

        assert!(cache.clear_if(&newer));
        assert!(cache.usable().is_none());
    }

    #[tokio::test]
    async fn test_failed_exchange_drops_stale_token() {
        let cache = TokenCache::new();
        let ctx = CallContext::background();
        cache.store(Arc::new(AccessToken::new(
            "stale",
            TokenKind::Bearer,
            Utc::now() + Duration::minutes(1),
        )));

        let err = cache
            .get_or_refresh(&ctx, || async {
                Err(Error::Authentication {
                    message: "denied".into(),
                    status: Some(401),
                    request_id: None,
                })
            })
            .await
            .unwrap_err();

        assert!(err.is_authentication());
        assert!(cache.current.read().unwrap().is_none());
    }

    #[tokio::test]
    async fn test_clear_forces_exchange() {
        let cache = TokenCache::new();
        let ctx = CallContext::background();
        let calls = AtomicUsize::new(0);
        let exchange = || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(fresh("b"))
        };

        cache.get_or_refresh(&ctx, exchange).await.unwrap();
        cache.clear();
        assert!(cache.usable().is_none());
        cache.get_or_refresh(&ctx, exchange).await.unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
