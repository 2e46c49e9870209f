//! In-memory cache implementation.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use crate::{Cache, CacheBucket};

/// Stored value with its optional expiry deadline.
struct Entry {
    value: Vec<u8>,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|deadline| now >= deadline)
    }
}

/// Writes between sweeps never drop below this many entries.
const MIN_SWEEP_LEN: usize = 64;

/// Shared map plus the size at which the next expiry sweep runs.
#[derive(Default)]
struct Store {
    map: HashMap<String, Entry>,
    sweep_at: usize,
}

impl Store {
    fn insert(&mut self, key: String, entry: Entry, now: Instant) {
        self.map.insert(key, entry);
        if self.map.len() >= self.sweep_at.max(MIN_SWEEP_LEN) {
            self.map.retain(|_, entry| !entry.is_expired(now));
            self.sweep_at = self.map.len() * 2;
        }
    }
}

type Entries = Arc<RwLock<Store>>;

/// In-process [`Cache`] backed by a shared hash map.
///
/// Every bucket handle created from the same `MemoryCache` (or its clones)
/// sees the same entries. Expired entries are swept once the map doubles in
/// size since the previous sweep, so writes stay amortized O(1).
#[derive(Clone, Default)]
pub struct MemoryCache {
    entries: Entries,
}

impl MemoryCache {
    /// Create an empty memory cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl Cache for MemoryCache {
    fn bucket(&self, name: &str) -> Box<dyn CacheBucket> {
        Box::new(MemoryCacheBucket {
            prefix: format!("{name}/"),
            entries: Arc::clone(&self.entries),
        })
    }
}

/// Bucket view over a [`MemoryCache`], namespacing keys by bucket name.
struct MemoryCacheBucket {
    prefix: String,
    entries: Entries,
}

impl MemoryCacheBucket {
    fn full_key(&self, key: &str) -> String {
        format!("{}{key}", self.prefix)
    }
}

impl CacheBucket for MemoryCacheBucket {
    fn get(&self, key: &str) -> Option<Vec<u8>> {
        let entries = self.entries.read().ok()?;
        let entry = entries.map.get(&self.full_key(key))?;
        if entry.is_expired(Instant::now()) {
            return None;
        }
        Some(entry.value.clone())
    }

    fn set(&self, key: &str, value: &[u8], ttl: Option<Duration>) {
        let now = Instant::now();
        let Ok(mut entries) = self.entries.write() else {
            tracing::warn!("memory cache lock poisoned, dropping write");
            return;
        };
        entries.insert(
            self.full_key(key),
            Entry {
                value: value.to_vec(),
                expires_at: ttl.map(|ttl| now + ttl),
            },
            now,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_bucket_set_and_get() {
        let cache = MemoryCache::new();
        let bucket = cache.bucket("fragments");

        bucket.set("welcome", b"<html>hello</html>", None);
        assert_eq!(bucket.get("welcome"), Some(b"<html>hello</html>".to_vec()));
    }

    #[test]
    fn test_memory_bucket_overwrite() {
        let cache = MemoryCache::new();
        let bucket = cache.bucket("fragments");

        bucket.set("key", b"first", None);
        bucket.set("key", b"second", None);
        assert_eq!(bucket.get("key"), Some(b"second".to_vec()));
    }

    #[test]
    fn test_memory_bucket_expired_entry_misses() {
        let cache = MemoryCache::new();
        let bucket = cache.bucket("fragments");

        bucket.set("key", b"data", Some(Duration::ZERO));
        assert_eq!(bucket.get("key"), None);
    }

    #[test]
    fn test_memory_bucket_unexpired_entry_hits() {
        let cache = MemoryCache::new();
        let bucket = cache.bucket("fragments");

        bucket.set("key", b"data", Some(Duration::from_secs(3600)));
        assert_eq!(bucket.get("key"), Some(b"data".to_vec()));
    }

    #[test]
    fn test_memory_buckets_are_isolated() {
        let cache = MemoryCache::new();
        let first = cache.bucket("first");
        let second = cache.bucket("second");

        first.set("key", b"one", None);
        assert_eq!(second.get("key"), None);
    }

    #[test]
    fn test_memory_sweep_bounds_expired_entries() {
        let cache = MemoryCache::new();
        let bucket = cache.bucket("fragments");

        for i in 0..1000 {
            bucket.set(&format!("expired-{i}"), b"data", Some(Duration::ZERO));
        }
        bucket.set("live", b"kept", None);

        let len = cache.entries.read().unwrap().map.len();
        assert!(len < MIN_SWEEP_LEN, "{len} entries left after sweeps");
        assert_eq!(bucket.get("live"), Some(b"kept".to_vec()));
    }

    #[test]
    fn test_memory_sweep_keeps_unexpired_entries() {
        let cache = MemoryCache::new();
        let bucket = cache.bucket("fragments");

        for i in 0..200 {
            bucket.set(&format!("key-{i}"), b"data", Some(Duration::from_secs(3600)));
        }

        assert_eq!(cache.entries.read().unwrap().map.len(), 200);
        assert_eq!(bucket.get("key-0"), Some(b"data".to_vec()));
    }

    #[test]
    fn test_memory_bucket_handles_share_storage() {
        let cache = MemoryCache::new();
        let writer = cache.bucket("fragments");
        let reader = cache.clone().bucket("fragments");

        writer.set("key", b"shared", None);
        assert_eq!(reader.get("key"), Some(b"shared".to_vec()));
    }
}
