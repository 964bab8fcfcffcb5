//! Redis-backed content store for multi-host deployments.

use async_trait::async_trait;
use batchward_application::ContentStore;
use batchward_core::{AppError, AppResult};
use redis::AsyncCommands;
use redis::aio::MultiplexedConnection;

/// Redis implementation of the content store port.
///
/// Every path maps to one string key below the configured prefix.
#[derive(Clone)]
pub struct RedisContentStore {
    client: redis::Client,
    key_prefix: String,
}

impl RedisContentStore {
    /// Creates a store adapter with a configured Redis client and key prefix.
    #[must_use]
    pub fn new(client: redis::Client, key_prefix: impl Into<String>) -> Self {
        Self {
            client,
            key_prefix: key_prefix.into(),
        }
    }

    fn key_for(&self, path: &str) -> String {
        format!("{}:{path}", self.key_prefix)
    }

    async fn connection(&self) -> AppResult<MultiplexedConnection> {
        self.client
            .get_multiplexed_async_connection()
            .await
            .map_err(|error| AppError::Storage(format!("failed to connect to redis: {error}")))
    }
}

#[async_trait]
impl ContentStore for RedisContentStore {
    async fn exists(&self, path: &str) -> AppResult<bool> {
        let mut connection = self.connection().await?;
        connection
            .exists(self.key_for(path))
            .await
            .map_err(|error| {
                AppError::Storage(format!("failed to check content '{path}': {error}"))
            })
    }

    async fn read(&self, path: &str) -> AppResult<Option<String>> {
        let mut connection = self.connection().await?;
        connection.get(self.key_for(path)).await.map_err(|error| {
            AppError::Storage(format!("failed to read content '{path}': {error}"))
        })
    }

    async fn write(&self, path: &str, content: &str) -> AppResult<()> {
        let mut connection = self.connection().await?;
        connection
            .set(self.key_for(path), content)
            .await
            .map_err(|error| {
                AppError::Storage(format!("failed to write content '{path}': {error}"))
            })
    }

    async fn delete(&self, path: &str) -> AppResult<bool> {
        let mut connection = self.connection().await?;
        let removed: i64 = connection.del(self.key_for(path)).await.map_err(|error| {
            AppError::Storage(format!("failed to delete content '{path}': {error}"))
        })?;

        Ok(removed > 0)
    }
}
