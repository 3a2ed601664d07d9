//! In-memory cache for resolver responses
//!
//! `get_or_resolve` with expiry is the only compound primitive. A per-key
//! async mutex serializes factory invocations so at most one lookup runs
//! per key at a time; concurrent callers for the same key wait and then
//! read the freshly stored value.

use crate::lookup::record::ApiProcessingResult;
use log::debug;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

/// Default entry lifetime
pub const DEFAULT_EXPIRY: Duration = Duration::from_secs(30 * 60);

#[derive(Default)]
struct CacheSlot {
    value: Option<(Instant, Arc<ApiProcessingResult>)>,
}

/// Expiring cache over resolver batch results
pub struct LookupCache {
    slots: Mutex<HashMap<String, Arc<Mutex<CacheSlot>>>>,
    ttl: Duration,
}

impl LookupCache {
    /// Cache with the default 30-minute expiry
    pub fn new() -> Self {
        Self::with_ttl(DEFAULT_EXPIRY)
    }

    /// Cache with a custom expiry
    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
            ttl,
        }
    }

    /// Return the cached value for `key`, or run `factory` and store its
    /// result. Expired entries are replaced.
    pub async fn get_or_resolve<F, Fut>(&self, key: &str, factory: F) -> Arc<ApiProcessingResult>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = ApiProcessingResult>,
    {
        let slot = {
            let mut slots = self.slots.lock().await;
            Arc::clone(slots.entry(key.to_string()).or_default())
        };

        // The per-key lock is held across the factory call on purpose.
        let mut slot = slot.lock().await;

        if let Some((stored_at, value)) = &slot.value {
            if stored_at.elapsed() < self.ttl {
                debug!("lookup cache hit for key of {} chars", key.len());
                return Arc::clone(value);
            }
        }

        let value = Arc::new(factory().await);
        slot.value = Some((Instant::now(), Arc::clone(&value)));
        value
    }

    /// Number of keys currently tracked (fresh or stale)
    pub async fn len(&self) -> usize {
        self.slots.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.slots.lock().await.is_empty()
    }
}

impl Default for LookupCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn result_with_missing(id: &str) -> ApiProcessingResult {
        ApiProcessingResult {
            missing: vec![id.to_string()],
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_factory_runs_once_per_key() {
        let cache = LookupCache::new();
        let calls = AtomicUsize::new(0);

        let first = cache
            .get_or_resolve("k", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                result_with_missing("a")
            })
            .await;
        let second = cache
            .get_or_resolve("k", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                result_with_missing("b")
            })
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(cache.len().await, 1);
    }

    #[tokio::test]
    async fn test_expired_entry_is_replaced() {
        let cache = LookupCache::with_ttl(Duration::from_millis(0));

        let first = cache
            .get_or_resolve("k", || async { result_with_missing("a") })
            .await;
        let second = cache
            .get_or_resolve("k", || async { result_with_missing("b") })
            .await;

        assert_eq!(first.missing, vec!["a"]);
        assert_eq!(second.missing, vec!["b"]);
    }

    #[tokio::test]
    async fn test_concurrent_same_key_single_flight() {
        let cache = Arc::new(LookupCache::new());
        let calls = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let cache = Arc::clone(&cache);
            let calls = Arc::clone(&calls);
            handles.push(tokio::spawn(async move {
                cache
                    .get_or_resolve("shared", move || async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(10)).await;
                        result_with_missing("x")
                    })
                    .await
            }));
        }

        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
