use crate::dfu::DfuResult;

#[cfg(test)]
use mockall::automock;

/// Key-value blob store holding firmware artifacts.
///
/// Paths look like `firmwares/{version}/{model}/{filename}`.
#[cfg_attr(test, automock)]
pub trait ArtifactStore: Send + Sync {
    /// Resolve a store path to a downloadable URL.
    fn download_url(&self, path: &str) -> DfuResult<String>;

    /// Retrieve the bytes behind a URL.
    fn fetch(&self, url: &str) -> DfuResult<Vec<u8>>;
}
