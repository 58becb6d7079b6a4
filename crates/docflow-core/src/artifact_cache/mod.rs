//! Content-addressed artifact cache (C3). Maps a fingerprint of
//! `(operation_tag, ordered_params)` to a previously produced artifact so
//! processors can skip redundant work. Sits beside the processor
//! invocation, not inside the job pipeline: a processor calls
//! `get_or_build` directly.

mod fingerprint;
mod index;
mod sweep;

pub use fingerprint::fingerprint;
pub use index::CacheEntry;

use std::collections::HashMap;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{debug, error, warn};

use crate::config::CacheConfig;

pub type ArtifactCacheResult<T> = Result<T, ArtifactCacheError>;

#[derive(Debug, thiserror::Error)]
pub enum ArtifactCacheError {
    #[error("cache io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("cache index corrupt: {0}")]
    Index(String),

    #[error("build function failed: {0}")]
    Build(String),
}

impl From<ArtifactCacheError> for crate::Error {
    fn from(err: ArtifactCacheError) -> Self {
        crate::Error::Cache(err.to_string())
    }
}

/// Single-flight key lock table: one `tokio::sync::Mutex` per in-flight
/// fingerprint, held only while the corresponding `build` runs.
type LockTable = Mutex<HashMap<String, Arc<Mutex<()>>>>;

pub struct ArtifactCache {
    directory: PathBuf,
    ttl: Duration,
    max_size_bytes: u64,
    cleanup_age: Duration,
    locks: LockTable,
}

impl ArtifactCache {
    pub async fn new(config: &CacheConfig) -> ArtifactCacheResult<Self> {
        let directory = PathBuf::from(&config.directory);
        tokio::fs::create_dir_all(&directory).await?;
        Ok(Self {
            directory,
            ttl: config.ttl,
            max_size_bytes: config.max_size_bytes,
            cleanup_age: config.cleanup_age,
            locks: Mutex::new(HashMap::new()),
        })
    }

    fn index_path(&self, key: &str) -> PathBuf {
        self.directory.join(format!("{}.json", key))
    }

    /// Returns the entry if present, unexpired, and its artifact still
    /// exists on disk; evicts and returns a miss otherwise.
    pub async fn get(&self, key: &str) -> Option<CacheEntry> {
        let entry = index::read(&self.index_path(key)).await.ok()??;

        if entry.expires_at < Utc::now() {
            debug!(key, "cache entry expired");
            let _ = self.delete(key).await;
            return None;
        }

        if tokio::fs::metadata(&entry.output_path).await.is_err() {
            warn!(key, output_path = %entry.output_path, "cache artifact missing, evicting index entry");
            let _ = self.delete(key).await;
            return None;
        }

        Some(entry)
    }

    /// Stats `artifact_path`, copies it into the cache directory, and
    /// atomically writes the index entry (tempfile + rename).
    pub async fn put(
        &self,
        key: &str,
        artifact_path: &Path,
        process_type: impl Into<String>,
        metadata: Value,
    ) -> ArtifactCacheResult<CacheEntry> {
        let meta = tokio::fs::metadata(artifact_path).await?;
        let output_path = self.directory.join(format!("{}.bin", key));
        tokio::fs::copy(artifact_path, &output_path).await?;

        let now = Utc::now();
        let entry = CacheEntry {
            key: key.to_string(),
            file_path: artifact_path.to_string_lossy().to_string(),
            output_path: output_path.to_string_lossy().to_string(),
            created_at: now,
            expires_at: now + chrono::Duration::from_std(self.ttl).unwrap_or(chrono::Duration::zero()),
            file_size: meta.len(),
            process_type: process_type.into(),
            metadata,
        };

        index::write_atomic(&self.directory, &self.index_path(key), &entry).await?;
        Ok(entry)
    }

    /// Best-effort removal of the index entry and artifact. Errors are
    /// logged, never surfaced: a cache that can't delete its own entry is
    /// a cache-degraded condition, not a caller-facing failure.
    pub async fn delete(&self, key: &str) -> ArtifactCacheResult<()> {
        if let Ok(Some(entry)) = index::read(&self.index_path(key)).await {
            if let Err(e) = tokio::fs::remove_file(&entry.output_path).await {
                if e.kind() != std::io::ErrorKind::NotFound {
                    error!(key, error = %e, "failed to remove cached artifact");
                }
            }
        }
        match tokio::fs::remove_file(self.index_path(key)).await {
            Ok(()) | Err(_) => Ok(()),
        }
    }

    /// Walks the index, evicting entries past `cleanup_age` or expired,
    /// then trims by ascending `mtime` until total size is under
    /// `max_size_bytes`. Intended to run on a 1h ticker.
    pub async fn sweep(&self) -> ArtifactCacheResult<sweep::SweepReport> {
        sweep::run(&self.directory, self.cleanup_age, self.max_size_bytes).await
    }

    /// Spawns a background task that sweeps the cache every hour until
    /// `cancel` fires. Intended to be started once alongside the worker
    /// pool at process bootstrap.
    pub fn spawn_sweeper(self: Arc<Self>, cancel: tokio_util::sync::CancellationToken) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_secs(3600));
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        match self.sweep().await {
                            Ok(report) => debug!(
                                evicted_expired = report.evicted_expired,
                                evicted_for_size = report.evicted_for_size,
                                "scheduled cache sweep ran"
                            ),
                            Err(e) => warn!(error = %e, "scheduled cache sweep failed"),
                        }
                    }
                }
            }
        })
    }

    /// Single-flight contract: on a miss, exactly one concurrent caller
    /// per key runs `build`; the rest wait for its outcome. `build`
    /// returns `(artifact_path, process_type, metadata)` for `put`.
    pub async fn get_or_build<F, Fut>(&self, key: &str, build: F) -> ArtifactCacheResult<CacheEntry>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = ArtifactCacheResult<(PathBuf, String, Value)>>,
    {
        if let Some(entry) = self.get(key).await {
            return Ok(entry);
        }

        let key_lock = {
            let mut locks = self.locks.lock().await;
            locks.entry(key.to_string()).or_insert_with(|| Arc::new(Mutex::new(()))).clone()
        };

        let _guard = key_lock.lock().await;

        // Re-check: another caller may have finished the build while we
        // were waiting for the key lock.
        if let Some(entry) = self.get(key).await {
            return Ok(entry);
        }

        let (artifact_path, process_type, metadata) = build().await?;
        let entry = self.put(key, &artifact_path, process_type, metadata).await?;

        self.locks.lock().await.remove(key);
        Ok(entry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config(dir: &Path) -> CacheConfig {
        CacheConfig {
            enabled: true,
            ttl: Duration::from_secs(3600),
            max_size_bytes: 1024 * 1024,
            cleanup_age: Duration::from_secs(7 * 24 * 3600),
            directory: dir.to_string_lossy().to_string(),
        }
    }

    #[tokio::test]
    async fn put_then_get_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ArtifactCache::new(&test_config(dir.path())).await.unwrap();

        let artifact = dir.path().join("source.bin");
        tokio::fs::write(&artifact, b"hello").await.unwrap();

        let key = fingerprint("media_processing", &["a.png".to_string(), "webp".to_string()]);
        cache.put(&key, &artifact, "media_processing", serde_json::json!({})).await.unwrap();

        let entry = cache.get(&key).await.unwrap();
        assert_eq!(entry.file_size, 5);
        assert!(tokio::fs::metadata(&entry.output_path).await.is_ok());
    }

    #[tokio::test]
    async fn get_misses_and_evicts_when_artifact_deleted() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ArtifactCache::new(&test_config(dir.path())).await.unwrap();

        let artifact = dir.path().join("source.bin");
        tokio::fs::write(&artifact, b"hello").await.unwrap();

        let key = "deadbeef".to_string();
        let entry = cache.put(&key, &artifact, "media_processing", serde_json::json!({})).await.unwrap();
        tokio::fs::remove_file(&entry.output_path).await.unwrap();

        assert!(cache.get(&key).await.is_none());
        assert!(tokio::fs::metadata(cache.index_path(&key)).await.is_err());
    }

    #[tokio::test]
    async fn get_or_build_runs_build_once_per_key() {
        let dir = tempfile::tempdir().unwrap();
        let cache = Arc::new(ArtifactCache::new(&test_config(dir.path())).await.unwrap());

        let artifact = dir.path().join("source.bin");
        tokio::fs::write(&artifact, b"hello").await.unwrap();

        let calls = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let key = "single-flight-key".to_string();

        let mut handles = Vec::new();
        for _ in 0..5 {
            let cache = cache.clone();
            let calls = calls.clone();
            let artifact = artifact.clone();
            let key = key.clone();
            handles.push(tokio::spawn(async move {
                cache
                    .get_or_build(&key, || async move {
                        calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(50)).await;
                        Ok((artifact, "media_processing".to_string(), serde_json::json!({})))
                    })
                    .await
            }));
        }

        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 1);
    }
}
