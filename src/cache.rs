//! Artifact stores backed by the local filesystem.
//!
//! `DirectoryStore` serves a local mirror of the artifact tree.
//! `ArtifactCache` wraps any store and keeps fetched blobs on disk, indexed
//! by URL in `artifact_cache.json`.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::dfu::{sha256_hex, DfuError, DfuResult};
use crate::settings::InstallerSettings;
use crate::traits::ArtifactStore;

const FILE_SCHEME: &str = "file://";

/// Serves `firmwares/{version}/{model}/{filename}` from a directory.
pub struct DirectoryStore {
    root: PathBuf,
}

impl DirectoryStore {
    pub fn new(root: &Path) -> Self {
        Self {
            root: root.to_path_buf(),
        }
    }
}

impl ArtifactStore for DirectoryStore {
    fn download_url(&self, path: &str) -> DfuResult<String> {
        let file = self.root.join(path);
        if !file.is_file() {
            return Err(DfuError::Artifact {
                path: path.to_string(),
                reason: "no such file in local mirror".to_string(),
            });
        }
        Ok(format!("{}{}", FILE_SCHEME, file.to_string_lossy()))
    }

    fn fetch(&self, url: &str) -> DfuResult<Vec<u8>> {
        let file = url.strip_prefix(FILE_SCHEME).ok_or_else(|| DfuError::Artifact {
            path: url.to_string(),
            reason: "unsupported URL scheme".to_string(),
        })?;

        fs::read(file).map_err(|e| DfuError::Artifact {
            path: url.to_string(),
            reason: e.to_string(),
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CachedArtifact {
    pub url: String,
    /// Location of the cached blob on disk.
    pub path: String,
    pub sha256: String,
    pub file_size: u64,
    /// RFC 3339 timestamp.
    pub downloaded_at: String,
}

pub type ArtifactCacheIndex = HashMap<String, CachedArtifact>;

/// Caching decorator around an [`ArtifactStore`].
///
/// A cached blob is served only while its file exists and still hashes to
/// the recorded digest; otherwise the entry is dropped and the blob fetched
/// again.
pub struct ArtifactCache<S> {
    inner: S,
    blob_dir: PathBuf,
    cache_file_path: PathBuf,
}

impl<S: ArtifactStore> ArtifactCache<S> {
    pub fn new(inner: S, app_data_dir: &Path) -> Self {
        Self {
            inner,
            blob_dir: app_data_dir.join("artifacts"),
            cache_file_path: app_data_dir.join("artifact_cache.json"),
        }
    }

    /// Calculate SHA256 hash of a file
    pub fn calculate_sha256(file_path: &Path) -> DfuResult<String> {
        let mut file = fs::File::open(file_path)?;

        let mut hasher = Sha256::new();
        let mut buffer = [0u8; 8192];

        loop {
            let bytes_read = file.read(&mut buffer)?;
            if bytes_read == 0 {
                break;
            }
            hasher.update(&buffer[..bytes_read]);
        }

        Ok(format!("{:x}", hasher.finalize()))
    }

    /// Load the cache index from disk
    pub fn load_index(&self) -> DfuResult<ArtifactCacheIndex> {
        if !self.cache_file_path.exists() {
            return Ok(HashMap::new());
        }

        let contents = fs::read_to_string(&self.cache_file_path)?;
        Ok(serde_json::from_str(&contents)?)
    }

    /// Save the cache index to disk
    pub fn save_index(&self, index: &ArtifactCacheIndex) -> DfuResult<()> {
        let contents = serde_json::to_string_pretty(index)?;

        if let Some(parent) = self.cache_file_path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.cache_file_path, contents)?;
        Ok(())
    }

    pub fn get_entry(&self, url: &str) -> DfuResult<Option<CachedArtifact>> {
        Ok(self.load_index()?.get(url).cloned())
    }

    /// Remove an entry and its blob.
    pub fn remove_entry(&self, url: &str) -> DfuResult<()> {
        let mut index = self.load_index()?;
        if let Some(entry) = index.remove(url) {
            let _ = fs::remove_file(&entry.path);
        }
        self.save_index(&index)
    }

    /// Remove every entry and blob.
    pub fn clear(&self) -> DfuResult<()> {
        for entry in self.load_index()?.values() {
            let _ = fs::remove_file(&entry.path);
        }
        self.save_index(&HashMap::new())
    }

    /// URLs whose blob is missing or no longer matches its digest.
    pub fn verify_integrity(&self) -> DfuResult<Vec<String>> {
        let mut broken = Vec::new();

        for (url, entry) in self.load_index()?.iter() {
            let path = Path::new(&entry.path);
            let intact = path.exists()
                && Self::calculate_sha256(path).is_ok_and(|hash| hash == entry.sha256);
            if !intact {
                broken.push(url.clone());
            }
        }

        broken.sort();
        Ok(broken)
    }

    fn blob_path(&self, url: &str) -> PathBuf {
        self.blob_dir.join(format!("{}.bin", sha256_hex(url.as_bytes())))
    }

    fn cached_blob(&self, url: &str) -> DfuResult<Option<Vec<u8>>> {
        let Some(entry) = self.get_entry(url)? else {
            return Ok(None);
        };

        if let Ok(blob) = fs::read(&entry.path) {
            if sha256_hex(&blob) == entry.sha256 {
                log::debug!("Cache hit for {}", url);
                return Ok(Some(blob));
            }
        }

        log::warn!("Discarding stale cache entry for {}", url);
        self.remove_entry(url)?;
        Ok(None)
    }

    fn store_blob(&self, url: &str, blob: &[u8]) -> DfuResult<()> {
        fs::create_dir_all(&self.blob_dir)?;
        let path = self.blob_path(url);
        fs::write(&path, blob)?;

        let mut index = self.load_index()?;
        index.insert(
            url.to_string(),
            CachedArtifact {
                url: url.to_string(),
                path: path.to_string_lossy().to_string(),
                sha256: sha256_hex(blob),
                file_size: blob.len() as u64,
                downloaded_at: chrono::Utc::now().to_rfc3339(),
            },
        );
        self.save_index(&index)
    }
}

impl<S: ArtifactStore> ArtifactStore for ArtifactCache<S> {
    fn download_url(&self, path: &str) -> DfuResult<String> {
        self.inner.download_url(path)
    }

    fn fetch(&self, url: &str) -> DfuResult<Vec<u8>> {
        match self.cached_blob(url) {
            Ok(Some(blob)) => return Ok(blob),
            Ok(None) => {}
            Err(e) => log::warn!("Artifact cache unreadable: {}", e),
        }

        let blob = self.inner.fetch(url)?;
        if let Err(e) = self.store_blob(url, &blob) {
            log::warn!("Failed to cache {}: {}", url, e);
        }
        Ok(blob)
    }
}

/// Build the store an installer fetches from, cached on disk when
/// `cache_enabled` is set.
pub fn artifact_store<S: ArtifactStore + 'static>(
    inner: S,
    settings: &InstallerSettings,
    app_data_dir: &Path,
) -> Arc<dyn ArtifactStore> {
    if settings.cache_enabled {
        Arc::new(ArtifactCache::new(inner, app_data_dir))
    } else {
        log::debug!("Artifact cache disabled");
        Arc::new(inner)
    }
}
