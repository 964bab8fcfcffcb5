use async_trait::async_trait;
use batchward_core::AppResult;

/// Path-addressable content store shared by every runner instance.
///
/// Paths are `/`-separated relative keys such as `leases/nightly-export.lease`.
#[async_trait]
pub trait ContentStore: Send + Sync {
    /// Returns whether content exists at the path.
    async fn exists(&self, path: &str) -> AppResult<bool>;

    /// Reads the content at the path, or `None` when absent.
    async fn read(&self, path: &str) -> AppResult<Option<String>>;

    /// Writes content at the path, replacing existing content.
    async fn write(&self, path: &str, content: &str) -> AppResult<()>;

    /// Deletes the content at the path and returns whether it existed.
    async fn delete(&self, path: &str) -> AppResult<bool>;
}
