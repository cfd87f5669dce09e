// SPDX-License-Identifier: LGPL-3.0-or-later

use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use crate::error::CacheError;

/// Flat-directory, content-addressed cache under the config root. Every
/// entry's filename is `sha256(type || key)` (spec.md §5), so readers and
/// writers for distinct keys never collide and no directory listing is
/// required to find an entry.
#[derive(Clone)]
pub struct FsCache {
    root: PathBuf,
    ttl: Duration,
}

impl FsCache {
    pub fn new(root: PathBuf, ttl: Duration) -> Self {
        Self { root, ttl }
    }

    fn entry_path(&self, kind: &str, key: &str) -> PathBuf {
        let mut hasher = Sha256::new();
        hasher.update(kind.as_bytes());
        hasher.update(key.as_bytes());
        let digest = hasher.finalize();
        self.root.join(hex::encode(digest))
    }

    /// Returns the cached bytes, `CacheError::Miss` if no entry exists, or
    /// `CacheError::Expired` if the entry is older than the configured TTL
    /// (the caller decides whether to treat either as fatal; both are
    /// expected control flow per spec.md §7).
    pub async fn get(&self, kind: &str, key: &str) -> Result<Vec<u8>, CacheError> {
        let path = self.entry_path(kind, key);
        let metadata = tokio::fs::metadata(&path).await.map_err(|_| CacheError::Miss)?;
        let modified = metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH);
        if SystemTime::now()
            .duration_since(modified)
            .unwrap_or(Duration::ZERO)
            > self.ttl
        {
            return Err(CacheError::Expired);
        }
        tokio::fs::read(&path).await.map_err(|_| CacheError::Miss)
    }

    pub async fn set(&self, kind: &str, key: &str, bytes: &[u8]) -> std::io::Result<()> {
        tokio::fs::create_dir_all(&self.root).await?;
        let path = self.entry_path(kind, key);
        tokio::fs::write(path, bytes).await
    }

    /// Reads an entry regardless of its TTL. Used for HTTP revalidation
    /// layers where staleness is decided by the server's `304`, not the
    /// cache's own mtime (the on-disk entry is just where the last-known-good
    /// body and its validators live between runs).
    pub async fn get_stale(&self, kind: &str, key: &str) -> Option<Vec<u8>> {
        let path = self.entry_path(kind, key);
        tokio::fs::read(&path).await.ok()
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[tokio::test]
    async fn miss_on_empty_cache() {
        let dir = std::env::temp_dir().join(format!("bd-core-cache-test-{}", std::process::id()));
        let cache = FsCache::new(dir.clone(), Duration::from_secs(3600));
        assert_eq!(cache.get("avatar", "abc").await.unwrap_err(), CacheError::Miss);
        let _ = std::fs::remove_dir_all(dir);
    }

    #[tokio::test]
    async fn round_trips_stored_bytes_s6() {
        let dir = std::env::temp_dir().join(format!("bd-core-cache-test2-{}", std::process::id()));
        let cache = FsCache::new(dir.clone(), Duration::from_secs(3600));
        cache.set("avatar", "abc", b"bytes").await.unwrap();
        let bytes = cache.get("avatar", "abc").await.unwrap();
        assert_eq!(bytes, b"bytes");
        let _ = std::fs::remove_dir_all(dir);
    }

    #[tokio::test]
    async fn expired_entry_reports_expired_not_miss() {
        let dir = std::env::temp_dir().join(format!("bd-core-cache-test3-{}", std::process::id()));
        let cache = FsCache::new(dir.clone(), Duration::from_millis(1));
        cache.set("avatar", "abc", b"bytes").await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(cache.get("avatar", "abc").await.unwrap_err(), CacheError::Expired);
        let _ = std::fs::remove_dir_all(dir);
    }
}
