//! Extension trait for [`CacheBucket`] with string convenience methods.

use std::time::Duration;

use crate::CacheBucket;

/// UTF-8 string helpers for [`CacheBucket`].
///
/// Implemented as default methods on an extension trait so that
/// [`CacheBucket`] stays object-safe and implementors only handle raw bytes.
pub trait CacheBucketExt: CacheBucket {
    /// Retrieve a cached UTF-8 string.
    ///
    /// Returns `None` on cache miss, expiry, or invalid UTF-8.
    fn get_string(&self, key: &str) -> Option<String> {
        let bytes = self.get(key)?;
        String::from_utf8(bytes).ok()
    }

    /// Store a string value in the cache.
    fn set_string(&self, key: &str, value: &str, ttl: Option<Duration>) {
        self.set(key, value.as_bytes(), ttl);
    }
}

impl<B: CacheBucket + ?Sized> CacheBucketExt for B {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Cache, MemoryCache};

    #[test]
    fn test_string_round_trip_through_boxed_bucket() {
        let cache = MemoryCache::new();
        let bucket = cache.bucket("fragments");

        bucket.set_string("greeting", "Привіт 👋", None);
        assert_eq!(bucket.get_string("greeting").as_deref(), Some("Привіт 👋"));
    }

    #[test]
    fn test_get_string_invalid_utf8_is_miss() {
        let cache = MemoryCache::new();
        let bucket = cache.bucket("fragments");

        bucket.set("raw", &[0xff, 0xfe], None);
        assert_eq!(bucket.get_string("raw"), None);
    }
}
