//! Shared bearer token cache for OAuth-authenticated gateways.
//!
//! M-Pesa, MTN MoMo, and Airtel Money all issue short-lived bearer tokens
//! from a credentials endpoint. Fetching one per request would double every
//! call's latency and trip provider rate limits, so each driver holds one of
//! these caches per token audience.

use std::future::Future;
use std::time::{Duration, Instant};

use secrecy::SecretString;
use tokio::sync::Mutex;

/// Seconds subtracted from the provider-reported lifetime, so a token is
/// never presented within its final moments. A 3600 second token is reused
/// for 3500.
const EXPIRY_MARGIN_SECS: u64 = 100;

/// A freshly issued token with its provider-reported lifetime.
pub struct FetchedToken {
    pub token: SecretString,
    pub expires_in_secs: u64,
}

struct CachedToken {
    token: SecretString,
    expires_at: Instant,
}

/// Single-slot cache for a gateway bearer token.
///
/// Expiry is tracked against the monotonic clock. The slot lock is held
/// across the fetch, so concurrent callers hitting a cold or expired cache
/// trigger exactly one fetch and share its result.
pub struct BearerTokenCache {
    slot: Mutex<Option<CachedToken>>,
}

impl BearerTokenCache {
    pub fn new() -> Self {
        Self {
            slot: Mutex::new(None),
        }
    }

    /// Returns the cached token, or runs `fetch` to obtain a fresh one when
    /// the slot is empty or past its margin-adjusted expiry.
    ///
    /// A fetch error leaves the slot empty, so the next call retries.
    pub async fn get<F, Fut, E>(&self, fetch: F) -> Result<SecretString, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<FetchedToken, E>>,
    {
        let mut slot = self.slot.lock().await;

        if let Some(cached) = slot.as_ref() {
            if Instant::now() < cached.expires_at {
                return Ok(cached.token.clone());
            }
        }

        *slot = None;
        let fetched = fetch().await?;

        let ttl = Duration::from_secs(fetched.expires_in_secs.saturating_sub(EXPIRY_MARGIN_SECS));
        let token = fetched.token.clone();
        *slot = Some(CachedToken {
            token: fetched.token,
            expires_at: Instant::now() + ttl,
        });

        Ok(token)
    }

    /// Drops the cached token so the next call fetches a fresh one. Called
    /// after a provider rejects what we believed was a live token.
    pub async fn invalidate(&self) {
        *self.slot.lock().await = None;
    }
}

impl Default for BearerTokenCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    use secrecy::ExposeSecret;

    fn token(value: &str, expires_in_secs: u64) -> FetchedToken {
        FetchedToken {
            token: SecretString::new(value.to_string()),
            expires_in_secs,
        }
    }

    #[tokio::test]
    async fn warm_cache_serves_without_refetch() {
        let cache = BearerTokenCache::new();
        let fetches = AtomicU32::new(0);

        for _ in 0..3 {
            let got = cache
                .get(|| async {
                    fetches.fetch_add(1, Ordering::SeqCst);
                    Ok::<_, String>(token("tok-1", 3600))
                })
                .await
                .unwrap();
            assert_eq!(got.expose_secret(), "tok-1");
        }

        assert_eq!(fetches.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn lifetime_within_margin_is_not_cached() {
        // 50 seconds is inside the 100 second margin, so the effective TTL
        // is zero and every call fetches.
        let cache = BearerTokenCache::new();
        let fetches = AtomicU32::new(0);

        for _ in 0..2 {
            cache
                .get(|| async {
                    fetches.fetch_add(1, Ordering::SeqCst);
                    Ok::<_, String>(token("short", 50))
                })
                .await
                .unwrap();
        }

        assert_eq!(fetches.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn fetch_error_propagates_and_leaves_slot_empty() {
        let cache = BearerTokenCache::new();

        let err = cache
            .get(|| async { Err::<FetchedToken, _>("auth rejected".to_string()) })
            .await
            .unwrap_err();
        assert_eq!(err, "auth rejected");

        // Recovery: the next call fetches and succeeds.
        let got = cache
            .get(|| async { Ok::<_, String>(token("tok-2", 3600)) })
            .await
            .unwrap();
        assert_eq!(got.expose_secret(), "tok-2");
    }

    #[tokio::test]
    async fn invalidate_forces_refetch() {
        let cache = BearerTokenCache::new();
        let fetches = AtomicU32::new(0);

        cache
            .get(|| async {
                fetches.fetch_add(1, Ordering::SeqCst);
                Ok::<_, String>(token("tok-1", 3600))
            })
            .await
            .unwrap();

        cache.invalidate().await;

        let got = cache
            .get(|| async {
                fetches.fetch_add(1, Ordering::SeqCst);
                Ok::<_, String>(token("tok-2", 3600))
            })
            .await
            .unwrap();

        assert_eq!(got.expose_secret(), "tok-2");
        assert_eq!(fetches.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn concurrent_cold_calls_share_one_fetch() {
        let cache = Arc::new(BearerTokenCache::new());
        let fetches = Arc::new(AtomicU32::new(0));

        let mut handles = Vec::new();
        for _ in 0..4 {
            let cache = Arc::clone(&cache);
            let fetches = Arc::clone(&fetches);
            handles.push(tokio::spawn(async move {
                cache
                    .get(|| async {
                        fetches.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(10)).await;
                        Ok::<_, String>(token("shared", 3600))
                    })
                    .await
                    .unwrap()
            }));
        }

        for handle in handles {
            let got = handle.await.unwrap();
            assert_eq!(got.expose_secret(), "shared");
        }

        assert_eq!(fetches.load(Ordering::SeqCst), 1);
    }
}
