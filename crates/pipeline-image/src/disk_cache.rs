//! On-disk cache of encoded image bytes.
//!
//! Entries live under `<root>/<identifier>/` named by the SHA-256 of their
//! key. Writes go to a temporary file first and are renamed into place so a
//! reader never sees a partial entry. Pruning removes the least recently
//! touched files first.

use sha2::{Digest, Sha256};
use std::{
    io::ErrorKind,
    path::{Path, PathBuf},
    sync::atomic::{AtomicU64, Ordering},
    time::SystemTime,
};
use thiserror::Error;

const TEMP_SUFFIX: &str = ".partial";

#[derive(Debug, Error)]
pub enum DiskCacheError {
    #[error("Disk cache IO error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> DiskCacheError + '_ {
    move |source| DiskCacheError::Io {
        path: path.to_path_buf(),
        source,
    }
}

#[derive(Debug)]
pub struct DiskCache {
    dir: PathBuf,
    max_bytes: u64,
    temp_counter: AtomicU64,
}

impl DiskCache {
    pub fn new(root: impl AsRef<Path>, identifier: &str, max_bytes: u64) -> Self {
        Self {
            dir: root.as_ref().join(identifier),
            max_bytes,
            temp_counter: AtomicU64::new(0),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn max_bytes(&self) -> u64 {
        self.max_bytes
    }

    pub fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{:x}", Sha256::digest(key.as_bytes())))
    }

    pub async fn read(&self, key: &str) -> Result<Option<Vec<u8>>, DiskCacheError> {
        let path = self.path_for(key);

        match tokio::fs::read(&path).await {
            Ok(data) => {
                touch(path).await;
                Ok(Some(data))
            }
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(io_error(&path)(err)),
        }
    }

    pub async fn contains(&self, key: &str) -> bool {
        tokio::fs::try_exists(self.path_for(key))
            .await
            .unwrap_or(false)
    }

    /// Stores `data` under `key`, then prunes if the directory went over
    /// its byte limit.
    pub async fn write(&self, key: &str, data: &[u8]) -> Result<(), DiskCacheError> {
        if data.len() as u64 > self.max_bytes {
            tracing::debug!("Skipping disk cache for {key}: larger than cache");
            return Ok(());
        }

        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(io_error(&self.dir))?;

        let path = self.path_for(key);
        let temp = self.temp_path(&path);

        tokio::fs::write(&temp, data).await.map_err(io_error(&temp))?;
        if let Err(err) = tokio::fs::rename(&temp, &path).await {
            let _ = tokio::fs::remove_file(&temp).await;
            return Err(io_error(&path)(err));
        }

        if self.size_on_disk().await? > self.max_bytes {
            self.prune(self.max_bytes).await?;
        }

        Ok(())
    }

    pub async fn remove(&self, key: &str) -> Result<bool, DiskCacheError> {
        let path = self.path_for(key);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(true),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(false),
            Err(err) => Err(io_error(&path)(err)),
        }
    }

    pub async fn clear(&self) -> Result<(), DiskCacheError> {
        match tokio::fs::remove_dir_all(&self.dir).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(io_error(&self.dir)(err)),
        }
    }

    pub async fn size_on_disk(&self) -> Result<u64, DiskCacheError> {
        Ok(self.entries().await?.iter().map(|entry| entry.len).sum())
    }

    /// Deletes the least recently touched entries until at most `max_bytes`
    /// remain. Returns how many entries were removed.
    pub async fn prune(&self, max_bytes: u64) -> Result<usize, DiskCacheError> {
        let mut entries = self.entries().await?;
        let mut total: u64 = entries.iter().map(|entry| entry.len).sum();
        entries.sort_by_key(|entry| entry.modified);

        let mut removed = 0;
        for entry in entries {
            if total <= max_bytes {
                break;
            }

            match tokio::fs::remove_file(&entry.path).await {
                Ok(()) => {}
                // Raced with another remover
                Err(err) if err.kind() == ErrorKind::NotFound => {}
                Err(err) => return Err(io_error(&entry.path)(err)),
            }

            total = total.saturating_sub(entry.len);
            removed += 1;
        }

        if removed > 0 {
            tracing::debug!("Pruned {removed} entries from {}", self.dir.display());
        }

        Ok(removed)
    }

    async fn entries(&self) -> Result<Vec<DiskEntry>, DiskCacheError> {
        let mut dir = match tokio::fs::read_dir(&self.dir).await {
            Ok(dir) => dir,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(io_error(&self.dir)(err)),
        };

        let mut entries = Vec::new();
        while let Some(entry) = dir.next_entry().await.map_err(io_error(&self.dir))? {
            let path = entry.path();
            if path.to_string_lossy().ends_with(TEMP_SUFFIX) {
                continue;
            }

            let Ok(metadata) = entry.metadata().await else {
                continue;
            };
            if !metadata.is_file() {
                continue;
            }

            entries.push(DiskEntry {
                path,
                len: metadata.len(),
                modified: metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH),
            });
        }

        Ok(entries)
    }

    fn temp_path(&self, path: &Path) -> PathBuf {
        let n = self.temp_counter.fetch_add(1, Ordering::Relaxed);
        let mut name = path.as_os_str().to_os_string();
        name.push(format!(".{}-{n}{TEMP_SUFFIX}", std::process::id()));
        PathBuf::from(name)
    }
}

struct DiskEntry {
    path: PathBuf,
    len: u64,
    modified: SystemTime,
}

/// Bumps the modification time so pruning treats the entry as recently used.
async fn touch(path: PathBuf) {
    let result = tokio::task::spawn_blocking(move || {
        std::fs::OpenOptions::new()
            .append(true)
            .open(&path)
            .and_then(|file| file.set_modified(SystemTime::now()))
    })
    .await;

    if let Ok(Err(err)) = result {
        tracing::debug!("Failed to touch disk cache entry: {err}");
    }
}
