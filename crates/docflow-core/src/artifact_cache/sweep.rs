//! Background eviction: entries older than `cleanup_age` or already
//! expired are removed outright; if the directory is still over
//! `max_size_bytes`, remaining entries are removed oldest-`mtime`-first
//! until it fits.

use std::path::Path;
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, warn};

use super::index::{self, CacheEntry};
use super::ArtifactCacheResult;

#[derive(Debug, Default, Clone)]
pub struct SweepReport {
    pub evicted_expired: usize,
    pub evicted_for_size: usize,
    pub bytes_reclaimed: u64,
}

pub async fn run(directory: &Path, cleanup_age: Duration, max_size_bytes: u64) -> ArtifactCacheResult<SweepReport> {
    let mut report = SweepReport::default();
    let mut entries: Vec<(CacheEntry, std::time::SystemTime)> = Vec::new();

    let mut dir = tokio::fs::read_dir(directory).await?;
    while let Some(item) = dir.next_entry().await? {
        let path = item.path();
        if path.extension().and_then(|e| e.to_str()) != Some("json") {
            continue;
        }

        let entry = match index::read(&path).await {
            Ok(Some(entry)) => entry,
            Ok(None) => continue,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "skipping unreadable cache index entry during sweep");
                continue;
            }
        };

        let mtime = item
            .metadata()
            .await
            .and_then(|m| m.modified())
            .unwrap_or(std::time::SystemTime::UNIX_EPOCH);

        let age = mtime.elapsed().unwrap_or_default();
        if age > cleanup_age || entry.expires_at < Utc::now() {
            report.bytes_reclaimed += entry.file_size;
            report.evicted_expired += 1;
            evict(directory, &entry).await;
            continue;
        }

        entries.push((entry, mtime));
    }

    let mut total_size: u64 = entries.iter().map(|(entry, _)| entry.file_size).sum();
    if total_size > max_size_bytes {
        entries.sort_by_key(|(_, mtime)| *mtime);
        for (entry, _) in entries {
            if total_size <= max_size_bytes {
                break;
            }
            total_size = total_size.saturating_sub(entry.file_size);
            report.bytes_reclaimed += entry.file_size;
            report.evicted_for_size += 1;
            evict(directory, &entry).await;
        }
    }

    debug!(
        evicted_expired = report.evicted_expired,
        evicted_for_size = report.evicted_for_size,
        bytes_reclaimed = report.bytes_reclaimed,
        "artifact cache sweep complete"
    );

    Ok(report)
}

async fn evict(directory: &Path, entry: &CacheEntry) {
    let _ = tokio::fs::remove_file(&entry.output_path).await;
    let _ = tokio::fs::remove_file(directory.join(format!("{}.json", entry.key))).await;
}
