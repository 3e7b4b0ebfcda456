use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

use crate::dfu::config::{artifact_path, CHECKSUM_SUFFIX};
use crate::dfu::sha256_hex;

/// Test context with temporary directory management.
/// Automatically cleans up when dropped.
pub struct TestContext {
    temp_dir: TempDir,
}

impl TestContext {
    /// Create a new test context with a fresh temporary directory
    pub fn new() -> Self {
        Self {
            temp_dir: TempDir::new().expect("Failed to create temp dir"),
        }
    }

    /// Get the root path of the temporary directory
    pub fn root(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Create a file with content at the given relative path
    pub fn create_file(&self, relative_path: &str, content: &str) -> PathBuf {
        let path = self.root().join(relative_path);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("Failed to create parent dirs");
        }
        fs::write(&path, content).expect("Failed to write file");
        path
    }

    /// Create a file with binary content at the given relative path
    pub fn create_file_bytes(&self, relative_path: &str, content: &[u8]) -> PathBuf {
        let path = self.root().join(relative_path);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("Failed to create parent dirs");
        }
        fs::write(&path, content).expect("Failed to write file");
        path
    }

    /// Publish a firmware artifact and its checksum file in the mirror layout.
    pub fn create_artifact(&self, version: &str, model: &str, filename: &str, blob: &[u8]) -> PathBuf {
        let path = artifact_path(version, model, filename);
        self.create_file(
            &format!("{}{}", path, CHECKSUM_SUFFIX),
            &format!("{} {}\n", sha256_hex(blob), filename),
        );
        self.create_file_bytes(&path, blob)
    }

    /// Check if a relative path exists
    pub fn exists(&self, relative: &str) -> bool {
        self.root().join(relative).exists()
    }
}

impl Default for TestContext {
    fn default() -> Self {
        Self::new()
    }
}
