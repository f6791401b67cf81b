use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::{debug, info};

use crate::fetcher::FetchError;

/// How long fetched content stays fresh.
pub const DEFAULT_TTL: Duration = Duration::from_secs(5 * 60);

pub struct CacheEntry {
    pub content: Vec<u8>,
    pub expires_at: Instant,
}

/// Keyed store of fetched bodies, one entry per URL.
///
/// Entries are never evicted. An expired entry stays in place until a
/// re-fetch of the same URL succeeds and overwrites it. Two callers that
/// miss on the same URL at the same time will both fetch; whichever
/// finishes last is what stays cached.
#[derive(Default)]
pub struct FetchCache {
    entries: RwLock<HashMap<String, CacheEntry>>,
}

impl FetchCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the cached body for `url` while it is fresh, otherwise runs
    /// `fetch` and stores its result for `ttl`.
    ///
    /// The lock is never held across `fetch`. A failed fetch leaves any
    /// previous entry untouched.
    pub async fn get_or_fetch<F, Fut>(
        &self,
        url: &str,
        fetch: F,
        ttl: Duration,
    ) -> Result<Vec<u8>, FetchError>
    where
        F: FnOnce(String) -> Fut,
        Fut: Future<Output = Result<Vec<u8>, FetchError>>,
    {
        {
            let entries = self.entries.read().await;
            if let Some(entry) = entries.get(url) {
                if Instant::now() < entry.expires_at {
                    debug!(url = %url, "cache hit");
                    return Ok(entry.content.clone());
                }
            }
        }

        info!(url = %url, "fetching");
        let started = Instant::now();
        let content = fetch(url.to_string()).await?;
        info!(
            url = %url,
            elapsed_ms = started.elapsed().as_millis() as u64,
            bytes = content.len(),
            "fetched"
        );

        let mut entries = self.entries.write().await;
        entries.insert(
            url.to_string(),
            CacheEntry {
                content: content.clone(),
                expires_at: Instant::now() + ttl,
            },
        );

        Ok(content)
    }

    /// Number of distinct URLs currently held, fresh or stale.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn counting_fetch(
        calls: Arc<AtomicUsize>,
        body: &'static str,
    ) -> impl FnOnce(String) -> std::future::Ready<Result<Vec<u8>, FetchError>> {
        move |_url| {
            calls.fetch_add(1, Ordering::SeqCst);
            std::future::ready(Ok(body.as_bytes().to_vec()))
        }
    }

    fn failing_fetch(url: String) -> std::future::Ready<Result<Vec<u8>, FetchError>> {
        std::future::ready(Err(FetchError::Body {
            url,
            message: "connection reset".into(),
        }))
    }

    #[tokio::test(start_paused = true)]
    async fn fresh_entry_is_served_without_fetching() {
        let cache = FetchCache::new();
        let calls = Arc::new(AtomicUsize::new(0));

        let first = cache
            .get_or_fetch("https://a.test/", counting_fetch(calls.clone(), "one"), DEFAULT_TTL)
            .await
            .unwrap();
        tokio::time::advance(Duration::from_secs(299)).await;
        let second = cache
            .get_or_fetch("https://a.test/", counting_fetch(calls.clone(), "two"), DEFAULT_TTL)
            .await
            .unwrap();

        assert_eq!(first, b"one");
        assert_eq!(second, b"one");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn expired_entry_triggers_one_refetch() {
        let cache = FetchCache::new();
        let calls = Arc::new(AtomicUsize::new(0));

        cache
            .get_or_fetch("https://a.test/", counting_fetch(calls.clone(), "old"), DEFAULT_TTL)
            .await
            .unwrap();
        tokio::time::advance(DEFAULT_TTL).await;

        let refreshed = cache
            .get_or_fetch("https://a.test/", counting_fetch(calls.clone(), "new"), DEFAULT_TTL)
            .await
            .unwrap();
        let again = cache
            .get_or_fetch("https://a.test/", counting_fetch(calls.clone(), "newer"), DEFAULT_TTL)
            .await
            .unwrap();

        assert_eq!(refreshed, b"new");
        assert_eq!(again, b"new");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_refetch_keeps_stale_entry() {
        let cache = FetchCache::new();
        let calls = Arc::new(AtomicUsize::new(0));

        cache
            .get_or_fetch("https://a.test/", counting_fetch(calls.clone(), "stale"), DEFAULT_TTL)
            .await
            .unwrap();
        tokio::time::advance(DEFAULT_TTL + Duration::from_secs(1)).await;

        let err = cache
            .get_or_fetch("https://a.test/", failing_fetch, DEFAULT_TTL)
            .await;
        assert!(err.is_err());
        assert_eq!(cache.len().await, 1);

        // still stale, so the next call fetches again
        let next = cache
            .get_or_fetch("https://a.test/", counting_fetch(calls.clone(), "fresh"), DEFAULT_TTL)
            .await
            .unwrap();
        assert_eq!(next, b"fresh");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn failures_are_not_cached() {
        let cache = FetchCache::new();
        assert!(cache
            .get_or_fetch("https://down.test/", failing_fetch, DEFAULT_TTL)
            .await
            .is_err());
        assert!(cache.is_empty().await);
    }

    #[tokio::test]
    async fn keys_are_independent() {
        let cache = FetchCache::new();
        let calls = Arc::new(AtomicUsize::new(0));

        let a = cache
            .get_or_fetch("https://a.test/", counting_fetch(calls.clone(), "a"), DEFAULT_TTL)
            .await
            .unwrap();
        let b = cache
            .get_or_fetch("https://b.test/", counting_fetch(calls.clone(), "b"), DEFAULT_TTL)
            .await
            .unwrap();

        assert_eq!(a, b"a");
        assert_eq!(b, b"b");
        assert_eq!(cache.len().await, 2);
    }
}
