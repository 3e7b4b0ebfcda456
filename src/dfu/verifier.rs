//! Firmware artifact download and checksum verification.

use std::sync::Arc;

use sha2::{Digest, Sha256};

use super::config::{artifact_path, CHECKSUM_SUFFIX};
use super::error::{DfuError, DfuResult};
use crate::traits::ArtifactStore;

/// Compute the lowercase hex SHA-256 digest of `data`.
pub fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    format!("{:x}", hasher.finalize())
}

/// Extract the digest from a checksum file (`"<hex> <filename>"`).
pub fn parse_checksum(content: &str) -> &str {
    content.split(' ').next().unwrap_or_default().trim_end()
}

/// Result of a verified download.
#[derive(Debug, Clone)]
pub struct VerifiedArtifact {
    pub filename: String,
    pub blob: Vec<u8>,
    pub expected: String,
    pub actual: String,
}

impl VerifiedArtifact {
    pub fn is_valid(&self) -> bool {
        self.expected == self.actual
    }

    /// The mismatch as an error, for reporting.
    pub fn mismatch(&self) -> Option<DfuError> {
        (!self.is_valid()).then(|| DfuError::ChecksumMismatch {
            filename: self.filename.clone(),
            expected: self.expected.clone(),
            actual: self.actual.clone(),
        })
    }
}

/// Fetches firmware images and checks them against their published digest.
pub struct ArtifactVerifier {
    store: Arc<dyn ArtifactStore>,
}

impl ArtifactVerifier {
    pub fn new(store: Arc<dyn ArtifactStore>) -> Self {
        Self { store }
    }

    fn fetch_path(&self, path: &str) -> DfuResult<Vec<u8>> {
        let url = self.store.download_url(path)?;
        log::info!("[DOWNLOAD] {}", url);
        self.store.fetch(&url)
    }

    /// Download one artifact.
    pub fn fetch(&self, model: &str, version: &str, filename: &str) -> DfuResult<Vec<u8>> {
        self.fetch_path(&artifact_path(version, model, filename))
    }

    /// Download an artifact and its checksum file and compare digests.
    ///
    /// A mismatch is not an error here; callers decide what to do with it.
    pub fn verify(&self, model: &str, version: &str, filename: &str) -> DfuResult<VerifiedArtifact> {
        let path = artifact_path(version, model, filename);
        let blob = self.fetch_path(&path)?;
        let checksum = self.fetch_path(&format!("{}{}", path, CHECKSUM_SUFFIX))?;

        let expected = parse_checksum(&String::from_utf8_lossy(&checksum)).to_string();
        let actual = sha256_hex(&blob);

        if expected == actual {
            log::debug!("Checksum OK for {}: {}", filename, actual);
        } else {
            log::warn!(
                "Checksum mismatch for {}: expected {}, got {}",
                filename,
                expected,
                actual
            );
        }

        Ok(VerifiedArtifact {
            filename: filename.to_string(),
            blob,
            expected,
            actual,
        })
    }
}
