use async_trait::async_trait;
use batchward_application::DataSource;
use batchward_core::AppResult;
use batchward_domain::StoreScope;
use serde_json::Value;

const STORE_ID_FIELD: &str = "store_id";

/// Data source over records held in memory.
///
/// A record belongs to the store named by its numeric `store_id` field.
/// Records without one are only visible through [`StoreScope::All`].
#[derive(Debug, Clone, Default)]
pub struct InMemoryDataSource {
    records: Vec<(Option<u32>, Value)>,
}

impl InMemoryDataSource {
    /// Creates a data source from records in source order.
    #[must_use]
    pub fn from_records(records: Vec<Value>) -> Self {
        Self {
            records: records
                .into_iter()
                .map(|record| (store_id_of(&record), record))
                .collect(),
        }
    }

    /// Returns the number of records across all stores.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Returns whether no records are held.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    fn scoped(&self, scope: StoreScope) -> impl Iterator<Item = &Value> {
        self.records
            .iter()
            .filter(move |(store_id, _)| match scope {
                StoreScope::All => true,
                StoreScope::Store(scope_id) => *store_id == Some(scope_id),
            })
            .map(|(_, record)| record)
    }
}

#[async_trait]
impl DataSource for InMemoryDataSource {
    async fn store_ids(&self) -> AppResult<Vec<u32>> {
        let mut store_ids: Vec<u32> = self
            .records
            .iter()
            .filter_map(|(store_id, _)| *store_id)
            .collect();
        store_ids.sort_unstable();
        store_ids.dedup();
        Ok(store_ids)
    }

    async fn count(&self, scope: StoreScope) -> AppResult<u64> {
        Ok(self.scoped(scope).count() as u64)
    }

    async fn fetch(&self, scope: StoreScope, offset: u64, limit: u64) -> AppResult<Vec<Value>> {
        let offset = usize::try_from(offset).unwrap_or(usize::MAX);
        let limit = usize::try_from(limit).unwrap_or(usize::MAX);

        Ok(self.scoped(scope).skip(offset).take(limit).cloned().collect())
    }
}

fn store_id_of(record: &Value) -> Option<u32> {
    record
        .get(STORE_ID_FIELD)
        .and_then(Value::as_u64)
        .and_then(|store_id| u32::try_from(store_id).ok())
}

#[cfg(test)]
mod tests {
    use batchward_application::DataSource;
    use batchward_domain::StoreScope;
    use serde_json::json;

    use super::InMemoryDataSource;

    fn source() -> InMemoryDataSource {
        InMemoryDataSource::from_records(vec![
            json!({"sku": "a", "store_id": 2}),
            json!({"sku": "b", "store_id": 1}),
            json!({"sku": "c"}),
            json!({"sku": "d", "store_id": 2}),
        ])
    }

    #[tokio::test]
    async fn scopes_filter_by_store_id() {
        let source = source();

        assert_eq!(source.store_ids().await.unwrap_or_default(), vec![1, 2]);
        assert_eq!(source.count(StoreScope::All).await.unwrap_or_default(), 4);
        assert_eq!(source.count(StoreScope::Store(2)).await.unwrap_or_default(), 2);
    }

    #[tokio::test]
    async fn fetch_pages_within_scope() {
        let source = source();

        let page = source
            .fetch(StoreScope::Store(2), 1, 10)
            .await
            .unwrap_or_default();
        assert_eq!(page, vec![json!({"sku": "d", "store_id": 2})]);

        let page = source.fetch(StoreScope::All, 1, 2).await.unwrap_or_default();
        assert_eq!(page.len(), 2);
        assert_eq!(page[0]["sku"], json!("b"));
    }
}
