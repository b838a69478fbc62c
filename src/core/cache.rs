// src/core/cache.rs

//! Last-known-good storage: one JSON snapshot per target, overwritten on every
//! successful scan.

use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use tokio::fs;
use tracing::{debug, info};

use crate::core::error::CacheError;
use crate::core::models::ScanSnapshot;

const SNAPSHOT_EXTENSION: &str = "json";
const TARGET_DIGEST_LEN: usize = 16;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultCache {
    dir: PathBuf,
}

impl ResultCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File a target's snapshot lives in: the target with anything outside
    /// `[A-Za-z0-9._-]` replaced, so `fe80::1` or `10.0.0.0/24` stay inside the cache
    /// dir, followed by a digest of the raw target so that no two targets share a file.
    pub fn path_for(&self, target: &str) -> PathBuf {
        let readable: String = target
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                    c
                } else {
                    '_'
                }
            })
            .collect();

        let mut hasher = Sha256::new();
        hasher.update(target.as_bytes());
        let digest = hex::encode(hasher.finalize());

        self.dir.join(format!(
            "{readable}-{}.{SNAPSHOT_EXTENSION}",
            &digest[..TARGET_DIGEST_LEN]
        ))
    }

    /// Reads the latest snapshot for `target`; `Ok(None)` when none was ever stored.
    pub async fn load(&self, target: &str) -> Result<Option<ScanSnapshot>, CacheError> {
        let path = self.path_for(target);
        let bytes = match fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(target, path = %path.display(), "No cached snapshot.");
                return Ok(None);
            }
            Err(source) => return Err(CacheError::Io { path, source }),
        };
        let snapshot = serde_json::from_slice(&bytes)
            .map_err(|source| CacheError::Serialization { path, source })?;
        Ok(Some(snapshot))
    }

    /// Persists `snapshot`, replacing the previous one for the same target.
    ///
    /// The file is written next to its final location and renamed over it, so a
    /// reader never sees a half-written snapshot.
    pub async fn store(&self, snapshot: &ScanSnapshot) -> Result<PathBuf, CacheError> {
        let path = self.path_for(&snapshot.target);

        fs::create_dir_all(&self.dir)
            .await
            .map_err(io_error(&self.dir))?;

        let json = serde_json::to_vec_pretty(snapshot).map_err(|source| {
            CacheError::Serialization {
                path: path.clone(),
                source,
            }
        })?;

        let staging = path.with_extension(format!("{SNAPSHOT_EXTENSION}.tmp"));
        fs::write(&staging, json).await.map_err(io_error(&staging))?;
        fs::rename(&staging, &path).await.map_err(io_error(&path))?;

        info!(target = %snapshot.target, path = %path.display(), "Stored scan snapshot.");
        Ok(path)
    }
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> CacheError {
    let path = path.to_path_buf();
    move |source| CacheError::Io { path, source }
}
