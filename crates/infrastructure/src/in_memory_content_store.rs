use std::collections::HashMap;

use async_trait::async_trait;
use batchward_application::ContentStore;
use batchward_core::AppResult;
use tokio::sync::RwLock;

/// Process-local content store.
///
/// Only suitable when every runner shares the same process, e.g. tests or a
/// single embedded scheduler.
#[derive(Default)]
pub struct InMemoryContentStore {
    entries: RwLock<HashMap<String, String>>,
}

impl InMemoryContentStore {
    /// Creates an empty in-memory content store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ContentStore for InMemoryContentStore {
    async fn exists(&self, path: &str) -> AppResult<bool> {
        Ok(self.entries.read().await.contains_key(path))
    }

    async fn read(&self, path: &str) -> AppResult<Option<String>> {
        Ok(self.entries.read().await.get(path).cloned())
    }

    async fn write(&self, path: &str, content: &str) -> AppResult<()> {
        self.entries
            .write()
            .await
            .insert(path.to_owned(), content.to_owned());
        Ok(())
    }

    async fn delete(&self, path: &str) -> AppResult<bool> {
        Ok(self.entries.write().await.remove(path).is_some())
    }
}
