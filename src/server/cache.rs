use dashmap::DashMap;
use std::fmt;
use std::future::Future;
use tokio::time::{Duration, Instant};
use tracing::debug;

/// Identifies a memoised call: the function name plus a fingerprint of its
/// arguments.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    function: &'static str,
    args: String,
}

impl CacheKey {
    pub fn new(function: &'static str, args: impl Into<String>) -> Self {
        Self {
            function,
            args: args.into(),
        }
    }

    pub fn function(&self) -> &'static str {
        self.function
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.function, self.args)
    }
}

#[derive(Debug, Clone)]
struct CacheEntry<V> {
    value: V,
    expires_at: Instant,
}

/// Results of expensive calls kept for a fixed time-to-live.
#[derive(Debug)]
pub struct TtlCache<V> {
    ttl: Duration,
    entries: DashMap<CacheKey, CacheEntry<V>>,
}

impl<V: Clone> TtlCache<V> {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: DashMap::new(),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Returns the value for `key` unless it has expired. Expired entries are
    /// evicted.
    pub fn get(&self, key: &CacheKey) -> Option<V> {
        let now = Instant::now();
        // The shard guard must be released before removing.
        let expired = match self.entries.get(key) {
            Some(entry) if entry.expires_at > now => return Some(entry.value.clone()),
            Some(_) => true,
            None => false,
        };
        if expired {
            self.entries.remove_if(key, |_, entry| entry.expires_at <= now);
            debug!(key = %key, "Evicted expired cache entry.");
        }
        None
    }

    pub fn insert(&self, key: CacheKey, value: V) {
        let expires_at = Instant::now() + self.ttl;
        self.entries.insert(key, CacheEntry { value, expires_at });
    }

    /// Returns the cached value or computes, stores and returns a new one.
    /// Failed computations are not cached.
    pub async fn get_or_try_insert_with<F, Fut, E>(&self, key: CacheKey, compute: F) -> Result<V, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
    {
        if let Some(value) = self.get(&key) {
            debug!(key = %key, "Cache hit.");
            return Ok(value);
        }
        let value = compute().await?;
        self.insert(key, value.clone());
        Ok(value)
    }

    /// Drops every expired entry, returning how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.expires_at > now);
        before.saturating_sub(self.entries.len())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&self) {
        self.entries.clear();
    }
}
