use std::collections::hash_map::DefaultHasher;
use std::future::Future;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use cvault_models::ParsedOpinion;
use moka::future::Cache;
use serde::Serialize;

/// Hit/miss counters since the cache was built.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub entries: u64,
}

/// Short-lived cache of parsed analyst replies backed by moka.
///
/// Only successful replies are stored. Concurrent lookups of the same key
/// share a single in-flight computation.
pub struct OpinionCache {
    inner: Cache<String, ParsedOpinion>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl OpinionCache {
    pub fn new(max_capacity: u64, ttl: Duration) -> Self {
        Self {
            inner: Cache::builder()
                .max_capacity(max_capacity)
                .time_to_live(ttl)
                .build(),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// `ai:{analyst}:{ASSET}:{context hash}`
    pub fn key(analyst_id: &str, asset: &str, context: Option<&str>) -> String {
        let mut hasher = DefaultHasher::new();
        context.map(str::trim).unwrap_or_default().hash(&mut hasher);
        format!(
            "ai:{analyst_id}:{}:{:016x}",
            asset.trim().to_uppercase(),
            hasher.finish()
        )
    }

    pub async fn get(&self, key: &str) -> Option<ParsedOpinion> {
        let found = self.inner.get(key).await;
        self.count(found.is_some());
        found
    }

    pub async fn insert(&self, key: String, opinion: ParsedOpinion) {
        self.inner.insert(key, opinion).await;
    }

    /// Returns the cached opinion for `key`, or runs `init` and caches its
    /// success. The flag is true when the value came from the cache or from
    /// another caller's in-flight computation.
    pub async fn get_or_try_insert_with<F, E>(
        &self,
        key: String,
        init: F,
    ) -> Result<(ParsedOpinion, bool), Arc<E>>
    where
        F: Future<Output = Result<ParsedOpinion, E>>,
        E: Send + Sync + 'static,
    {
        let entry = self.inner.entry(key).or_try_insert_with(init).await?;
        let shared = !entry.is_fresh();
        self.count(shared);
        Ok((entry.into_value(), shared))
    }

    pub async fn invalidate(&self, key: &str) {
        self.inner.invalidate(key).await;
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            entries: self.inner.entry_count(),
        }
    }

    fn count(&self, hit: bool) {
        let counter = if hit { &self.hits } else { &self.misses };
        counter.fetch_add(1, Ordering::Relaxed);
    }
}
