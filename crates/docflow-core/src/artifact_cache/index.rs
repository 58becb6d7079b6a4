//! One JSON index file per cache entry, written atomically via
//! write-to-tempfile then rename so a crash mid-write never leaves a
//! truncated index file behind.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{ArtifactCacheError, ArtifactCacheResult};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    pub key: String,
    pub file_path: String,
    pub output_path: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub file_size: u64,
    pub process_type: String,
    pub metadata: serde_json::Value,
}

/// Reads an index file. `Ok(None)` means no entry exists for this key;
/// `Err` means the file exists but couldn't be read or parsed.
pub async fn read(path: &Path) -> ArtifactCacheResult<Option<CacheEntry>> {
    match tokio::fs::read(path).await {
        Ok(data) => {
            let entry = serde_json::from_slice(&data)
                .map_err(|e| ArtifactCacheError::Index(e.to_string()))?;
            Ok(Some(entry))
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(ArtifactCacheError::Io(e)),
    }
}

pub async fn write_atomic(
    directory: &Path,
    final_path: &Path,
    entry: &CacheEntry,
) -> ArtifactCacheResult<()> {
    let tmp_path: PathBuf = directory.join(format!(".{}.tmp", Uuid::new_v4()));
    let data = serde_json::to_vec_pretty(entry).map_err(|e| ArtifactCacheError::Index(e.to_string()))?;
    tokio::fs::write(&tmp_path, &data).await?;
    tokio::fs::rename(&tmp_path, final_path).await?;
    Ok(())
}
