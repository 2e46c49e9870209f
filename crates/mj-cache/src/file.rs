//! On-disk cache.
//!
//! Layout under the cache root:
//!
//! ```text
//! {root}/
//! +-- VERSION                 # build version that wrote the entries
//! +-- fragments/              # one directory per bucket
//!     +-- 9c1185a5c5e9fc54... # SHA-256 of the key, hex encoded
//! ```
//!
//! An entry file is an 8-byte little-endian expiry (unix seconds, `0` for
//! never) followed by the stored bytes. Keys are hashed so any string,
//! including ones with `/` or `..`, maps to a single flat file name.
//!
//! A root whose `VERSION` differs from the running build is wiped on open.

use std::fs::{self, File};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use sha2::{Digest, Sha256};

use crate::{Cache, CacheBucket};

const VERSION_FILE: &str = "VERSION";
const HEADER_LEN: usize = 8;
const NO_EXPIRY: u64 = 0;

/// [`Cache`] persisted as files under a root directory.
pub struct FileCache {
    root: PathBuf,
}

impl FileCache {
    /// Open the cache at `root` for the given build `version`.
    ///
    /// Entries written by another version are discarded. Failing to prepare
    /// the directory is logged, not returned: the cache then simply misses.
    #[must_use]
    pub fn new(root: PathBuf, version: &str) -> Self {
        if let Err(e) = prepare_root(&root, version) {
            tracing::warn!(root = %root.display(), "cache directory unusable: {e}");
        }
        Self { root }
    }

    /// Cache root directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl Cache for FileCache {
    fn bucket(&self, name: &str) -> Box<dyn CacheBucket> {
        Box::new(FileBucket {
            dir: self.root.join(name),
        })
    }
}

/// Make sure `root` exists and belongs to `version`.
fn prepare_root(root: &Path, version: &str) -> io::Result<()> {
    let version_path = root.join(VERSION_FILE);
    let stored = fs::read_to_string(&version_path).ok();
    if stored.as_deref() == Some(version) {
        return Ok(());
    }

    match &stored {
        Some(stored) => tracing::info!(stored, version, "cache version changed, clearing cache"),
        None => tracing::debug!(version, "initializing cache directory"),
    }
    if root.exists() {
        fs::remove_dir_all(root)?;
    }
    fs::create_dir_all(root)?;
    fs::write(version_path, version)
}

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |since| since.as_secs())
}

/// Expiry stamp for an entry written now.
///
/// A zero TTL still yields a non-zero stamp so it cannot read as "never".
fn expires_at(ttl: Option<Duration>) -> u64 {
    ttl.map_or(NO_EXPIRY, |ttl| now_secs().saturating_add(ttl.as_secs()).max(1))
}

fn entry_name(key: &str) -> String {
    hex::encode(Sha256::digest(key.as_bytes()))
}

struct FileBucket {
    dir: PathBuf,
}

impl FileBucket {
    fn read_entry(&self, key: &str) -> io::Result<Option<Vec<u8>>> {
        let mut file = match File::open(self.dir.join(entry_name(key))) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e),
        };

        let mut header = [0u8; HEADER_LEN];
        file.read_exact(&mut header)?;
        let stamp = u64::from_le_bytes(header);
        if stamp != NO_EXPIRY && now_secs() >= stamp {
            return Ok(None);
        }

        let mut value = Vec::new();
        file.read_to_end(&mut value)?;
        Ok(Some(value))
    }

    /// Write through a temporary file so readers never see a partial entry.
    fn write_entry(&self, key: &str, value: &[u8], ttl: Option<Duration>) -> io::Result<()> {
        fs::create_dir_all(&self.dir)?;
        let mut tmp = tempfile::NamedTempFile::new_in(&self.dir)?;
        tmp.write_all(&expires_at(ttl).to_le_bytes())?;
        tmp.write_all(value)?;
        tmp.persist(self.dir.join(entry_name(key)))
            .map_err(|e| e.error)?;
        Ok(())
    }
}

impl CacheBucket for FileBucket {
    fn get(&self, key: &str) -> Option<Vec<u8>> {
        self.read_entry(key).unwrap_or_else(|e| {
            tracing::debug!(key, "unreadable cache entry: {e}");
            None
        })
    }

    fn set(&self, key: &str, value: &[u8], ttl: Option<Duration>) {
        if let Err(e) = self.write_entry(key, value, ttl) {
            tracing::debug!(key, "cache write failed: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn open(tmp: &TempDir, version: &str) -> FileCache {
        FileCache::new(tmp.path().join("cache"), version)
    }

    #[test]
    fn test_round_trip() {
        let tmp = TempDir::new().unwrap();
        let bucket = open(&tmp, "v1").bucket("fragments");

        bucket.set("welcome", b"<html>hello</html>", None);
        assert_eq!(bucket.get("welcome"), Some(b"<html>hello</html>".to_vec()));
        assert_eq!(bucket.get("goodbye"), None);
    }

    #[test]
    fn test_entry_file_layout() {
        let tmp = TempDir::new().unwrap();
        let cache = open(&tmp, "v1");

        cache.bucket("fragments").set("welcome", b"abc", None);

        let raw = fs::read(cache.root().join("fragments").join(entry_name("welcome"))).unwrap();
        assert_eq!(&raw[..HEADER_LEN], &[0u8; HEADER_LEN]);
        assert_eq!(&raw[HEADER_LEN..], b"abc");
    }

    #[test]
    fn test_keys_with_path_separators_stay_in_bucket() {
        let tmp = TempDir::new().unwrap();
        let cache = open(&tmp, "v1");
        let bucket = cache.bucket("fragments");

        bucket.set("../../escape", b"data", None);
        bucket.set("emails/welcome", b"nested", None);

        assert_eq!(bucket.get("../../escape"), Some(b"data".to_vec()));
        assert_eq!(bucket.get("emails/welcome"), Some(b"nested".to_vec()));
        assert_eq!(fs::read_dir(cache.root().join("fragments")).unwrap().count(), 2);
    }

    #[test]
    fn test_overwrite_replaces_value() {
        let tmp = TempDir::new().unwrap();
        let bucket = open(&tmp, "v1").bucket("fragments");

        bucket.set("key", b"first", None);
        bucket.set("key", b"second", Some(Duration::from_secs(3600)));
        assert_eq!(bucket.get("key"), Some(b"second".to_vec()));
    }

    #[test]
    fn test_expired_entry_misses() {
        let tmp = TempDir::new().unwrap();
        let bucket = open(&tmp, "v1").bucket("fragments");

        bucket.set("key", b"data", Some(Duration::ZERO));
        assert_eq!(bucket.get("key"), None);
    }

    #[test]
    fn test_short_header_misses() {
        let tmp = TempDir::new().unwrap();
        let cache = open(&tmp, "v1");
        let dir = cache.root().join("fragments");
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join(entry_name("broken")), [1, 2, 3]).unwrap();

        assert_eq!(cache.bucket("fragments").get("broken"), None);
    }

    #[test]
    fn test_new_version_clears_entries() {
        let tmp = TempDir::new().unwrap();
        open(&tmp, "v1").bucket("fragments").set("key", b"old", None);

        let cache = open(&tmp, "v2");

        assert_eq!(cache.bucket("fragments").get("key"), None);
        assert_eq!(fs::read_to_string(cache.root().join(VERSION_FILE)).unwrap(), "v2");
    }

    #[test]
    fn test_same_version_keeps_entries() {
        let tmp = TempDir::new().unwrap();
        open(&tmp, "v1").bucket("fragments").set("key", b"kept", None);

        let cache = open(&tmp, "v1");
        assert_eq!(cache.bucket("fragments").get("key"), Some(b"kept".to_vec()));
    }

    #[test]
    fn test_buckets_are_isolated() {
        let tmp = TempDir::new().unwrap();
        let cache = open(&tmp, "v1");

        cache.bucket("a").set("key", b"from a", None);
        assert_eq!(cache.bucket("b").get("key"), None);
    }
}
