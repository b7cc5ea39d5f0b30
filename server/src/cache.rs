//! Read-through cache for analytics query results.
//!
//! Backed by an in-process [`moka`] future cache. Values are cached as
//! shared JSON documents under namespaced string keys, each entry
//! carrying its own time-to-live. There is no request coalescing: two
//! concurrent misses for the same key both compute, and the later
//! insert wins, which is harmless for idempotent reads.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use moka::future::Cache;
use moka::Expiry;
use serde_json::Value;

use crate::error::{Result, ServerError};

/// Upper bound on resident entries; analytics key cardinality is low.
const MAX_ENTRIES: u64 = 10_000;

/// A cached document together with the lifetime it was stored with.
#[derive(Clone)]
struct Entry {
    value: Arc<Value>,
    ttl: Duration,
}

/// Expires each entry according to the TTL recorded in the entry itself.
struct PerEntryExpiry;

impl Expiry<String, Entry> for PerEntryExpiry {
    fn expire_after_create(
        &self,
        _key: &String,
        entry: &Entry,
        _created_at: Instant,
    ) -> Option<Duration> {
        Some(entry.ttl)
    }
}

/// Namespaced TTL cache in front of the analytics query service.
#[derive(Clone)]
pub struct QueryCache {
    cache: Cache<String, Entry>,
    prefix: String,
    default_ttl: Duration,
}

impl QueryCache {
    pub fn new(prefix: impl Into<String>, default_ttl: Duration) -> Self {
        let cache = Cache::builder()
            .max_capacity(MAX_ENTRIES)
            .expire_after(PerEntryExpiry)
            .support_invalidation_closures()
            .build();
        Self {
            cache,
            prefix: prefix.into(),
            default_ttl,
        }
    }

    /// Build a namespaced key: `prefix:part:part:...`.
    pub fn key<I, S>(&self, parts: I) -> String
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut key = self.prefix.clone();
        for part in parts {
            key.push(':');
            key.push_str(part.as_ref());
        }
        key
    }

    /// Look up a cached document.
    pub async fn get(&self, key: &str) -> Option<Arc<Value>> {
        self.cache.get(key).await.map(|entry| entry.value)
    }

    /// Store a document, overriding the default TTL if `ttl` is given.
    pub async fn set(&self, key: impl Into<String>, value: Value, ttl: Option<Duration>) {
        let entry = Entry {
            value: Arc::new(value),
            ttl: ttl.unwrap_or(self.default_ttl),
        };
        self.cache.insert(key.into(), entry).await;
    }

    /// Drop a single entry.
    pub async fn delete(&self, key: &str) {
        self.cache.invalidate(key).await;
    }

    /// Drop every entry whose key matches the glob `pattern`.
    ///
    /// Only `*` is special, matching any run of characters.
    pub fn invalidate_pattern(&self, pattern: &str) -> Result<()> {
        let pattern = pattern.to_string();
        self.cache
            .invalidate_entries_if(move |key, _entry| glob_match(&pattern, key))
            .map_err(|e| ServerError::internal(format!("cache invalidation failed: {e}")))?;
        Ok(())
    }

    /// Drop everything under this cache's prefix.
    pub fn clear_all(&self) -> Result<()> {
        self.invalidate_pattern(&format!("{}:*", self.prefix))
    }

    /// Read-through helper: return the cached document for `key`, or
    /// run `compute`, cache its output, and return it.
    ///
    /// Compute errors propagate without poisoning the cache.
    pub async fn get_or_compute<F>(
        &self,
        key: String,
        ttl: Option<Duration>,
        compute: F,
    ) -> Result<Arc<Value>>
    where
        F: Future<Output = Result<Value>>,
    {
        if let Some(hit) = self.get(&key).await {
            return Ok(hit);
        }

        let value = Arc::new(compute.await?);
        let entry = Entry {
            value: Arc::clone(&value),
            ttl: ttl.unwrap_or(self.default_ttl),
        };
        self.cache.insert(key, entry).await;
        Ok(value)
    }
}

/// Minimal glob matcher: `*` matches any (possibly empty) substring,
/// every other character matches itself.
fn glob_match(pattern: &str, text: &str) -> bool {
    let mut segments = pattern.split('*');

    // Text before the first `*` must anchor at the start.
    let first = match segments.next() {
        Some(s) => s,
        None => return text.is_empty(),
    };
    if !text.starts_with(first) {
        return false;
    }
    let mut rest = &text[first.len()..];

    let mut last_segment: Option<&str> = None;
    for segment in segments {
        if let Some(prev) = last_segment {
            match rest.find(prev) {
                Some(idx) => rest = &rest[idx + prev.len()..],
                None => return false,
            }
        }
        last_segment = Some(segment);
    }

    match last_segment {
        // Pattern had no `*`: exact match required.
        None => rest.is_empty(),
        // Text after the final `*` must anchor at the end.
        Some(last) => rest.ends_with(last),
    }
}
