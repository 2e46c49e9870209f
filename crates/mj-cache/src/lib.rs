//! Byte caches for rendered MJML fragments.
//!
//! A [`Cache`] hands out named [`CacheBucket`]s. A bucket maps string keys to
//! raw bytes, and each entry may carry a time-to-live after which reads miss.
//! Bucket operations never fail: a storage problem is logged and behaves like
//! a miss, so callers fall back to rendering.
//!
//! Backends:
//!
//! - [`NullCache`]: stores nothing
//! - [`MemoryCache`]: process-local map
//! - [`FileCache`]: one file per entry, wiped when the build version changes
//!
//! ```
//! use std::time::Duration;
//! use mj_cache::{Cache, MemoryCache};
//!
//! let cache = MemoryCache::new();
//! let fragments = cache.bucket("fragments");
//! fragments.set("welcome", b"<html></html>", Some(Duration::from_secs(60)));
//! assert_eq!(fragments.get("welcome").as_deref(), Some(&b"<html></html>"[..]));
//! ```

mod ext;
mod file;
mod memory;

use std::time::Duration;

pub use ext::CacheBucketExt;
pub use file::FileCache;
pub use memory::MemoryCache;

/// Key-value partition of a [`Cache`].
pub trait CacheBucket: Send + Sync {
    /// Stored bytes for `key`, or `None` if absent or expired.
    fn get(&self, key: &str) -> Option<Vec<u8>>;

    /// Store `value` under `key`, replacing any previous entry.
    ///
    /// With `ttl` set the entry expires that long after this call; `None`
    /// keeps it until overwritten.
    fn set(&self, key: &str, value: &[u8], ttl: Option<Duration>);
}

/// Source of named [`CacheBucket`]s.
///
/// Buckets with different names never see each other's keys. Two handles
/// opened with the same name share entries.
pub trait Cache: Send + Sync {
    /// Open the bucket called `name`, creating it on first use.
    fn bucket(&self, name: &str) -> Box<dyn CacheBucket>;
}

/// Bucket returned by [`NullCache`].
pub struct NullCacheBucket;

impl CacheBucket for NullCacheBucket {
    fn get(&self, _key: &str) -> Option<Vec<u8>> {
        None
    }

    fn set(&self, _key: &str, _value: &[u8], _ttl: Option<Duration>) {}
}

/// Cache used when caching is turned off. Every read misses.
pub struct NullCache;

impl Cache for NullCache {
    fn bucket(&self, _name: &str) -> Box<dyn CacheBucket> {
        Box::new(NullCacheBucket)
    }
}
