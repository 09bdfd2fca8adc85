//! Bounds on local rows and cached media bytes.

use std::path::{Path, PathBuf};
use std::time::SystemTime;

use crate::error::Result;
use crate::timeline::TimelineRepository;

/// Default cap on stored post rows.
pub const DEFAULT_MAX_ROWS: i64 = 4999;

/// Default cap on cached media bytes (1 GiB).
pub const DEFAULT_MAX_MEDIA_BYTES: u64 = 1024 * 1024 * 1024;

/// Caps applied after every sync: oldest post rows beyond the row limit
/// are deleted (media rows cascade), then cached media files are removed
/// oldest-first until the byte budget holds.
pub struct RetentionPolicy {
    max_rows: i64,
    max_media_bytes: u64,
    media_dir: PathBuf,
}

impl RetentionPolicy {
    /// Creates a policy with the default row and byte caps.
    #[must_use]
    pub fn new(media_dir: &Path) -> Self {
        Self::with_limits(media_dir, DEFAULT_MAX_ROWS, DEFAULT_MAX_MEDIA_BYTES)
    }

    /// Creates a policy with explicit caps.
    #[must_use]
    pub fn with_limits(media_dir: &Path, max_rows: i64, max_media_bytes: u64) -> Self {
        Self {
            max_rows,
            max_media_bytes,
            media_dir: media_dir.to_path_buf(),
        }
    }

    /// Applies both caps.
    ///
    /// File deletion is best effort: an undeletable file is logged and
    /// skipped so one stuck file cannot wedge the policy.
    ///
    /// # Errors
    ///
    /// Returns an error when a storage operation fails.
    pub async fn enforce(&self, repo: &TimelineRepository) -> Result<()> {
        repo.trim_to_limit(self.max_rows).await?;
        self.enforce_byte_budget(repo).await
    }

    async fn enforce_byte_budget(&self, repo: &TimelineRepository) -> Result<()> {
        let mut files = cached_files(&self.media_dir);
        let mut total: u64 = files.iter().map(|f| f.len).sum();
        if total <= self.max_media_bytes {
            return Ok(());
        }

        // Oldest first, by modification time.
        files.sort_by_key(|f| f.modified);
        for file in files {
            if total <= self.max_media_bytes {
                break;
            }
            let path = file.path.to_string_lossy().into_owned();
            if let Err(e) = std::fs::remove_file(&file.path) {
                tracing::warn!(path = %path, error = %e, "cannot evict cached media");
                continue;
            }
            repo.clear_local_path(&path).await?;
            total = total.saturating_sub(file.len);
            tracing::debug!(path = %path, "evicted cached media");
        }
        Ok(())
    }
}

struct CachedFile {
    path: PathBuf,
    len: u64,
    modified: SystemTime,
}

fn cached_files(dir: &Path) -> Vec<CachedFile> {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return Vec::new();
    };
    entries
        .filter_map(std::result::Result::ok)
        .filter_map(|entry| {
            let meta = entry.metadata().ok()?;
            if !meta.is_file() {
                return None;
            }
            Some(CachedFile {
                path: entry.path(),
                len: meta.len(),
                modified: meta.modified().ok()?,
            })
        })
        .collect()
}
