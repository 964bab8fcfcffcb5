use async_trait::async_trait;
use batchward_core::AppResult;
use batchward_domain::StoreScope;
use serde_json::Value;

/// Paged record source a job reads from.
#[async_trait]
pub trait DataSource: Send + Sync {
    /// Lists the store ids that per-store partitioning iterates over.
    async fn store_ids(&self) -> AppResult<Vec<u32>>;

    /// Counts records visible in one scope.
    async fn count(&self, scope: StoreScope) -> AppResult<u64>;

    /// Fetches at most `limit` records starting at `offset`, in stable order.
    async fn fetch(&self, scope: StoreScope, offset: u64, limit: u64) -> AppResult<Vec<Value>>;
}
