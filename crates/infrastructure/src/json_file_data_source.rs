use std::path::{Path, PathBuf};

use async_trait::async_trait;
use batchward_application::DataSource;
use batchward_core::{AppError, AppResult};
use batchward_domain::StoreScope;
use serde_json::Value;
use tracing::info;

use crate::InMemoryDataSource;

/// Data source reading records from a JSON file.
///
/// The file holds either one JSON array of records or one record per line.
#[derive(Debug, Clone)]
pub struct JsonFileDataSource {
    path: PathBuf,
    records: InMemoryDataSource,
}

impl JsonFileDataSource {
    /// Loads every record of the file into memory.
    pub async fn open(path: impl Into<PathBuf>) -> AppResult<Self> {
        let path = path.into();
        let content = tokio::fs::read_to_string(&path).await.map_err(|error| {
            AppError::Storage(format!(
                "failed to read source file '{}': {error}",
                path.display()
            ))
        })?;

        let records = parse_records(content.as_str()).map_err(|error| {
            AppError::Validation(format!(
                "invalid source file '{}': {error}",
                path.display()
            ))
        })?;
        info!(path = %path.display(), records = records.len(), "source file loaded");

        Ok(Self {
            path,
            records: InMemoryDataSource::from_records(records),
        })
    }

    /// Returns the source file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        self.path.as_path()
    }
}

#[async_trait]
impl DataSource for JsonFileDataSource {
    async fn store_ids(&self) -> AppResult<Vec<u32>> {
        self.records.store_ids().await
    }

    async fn count(&self, scope: StoreScope) -> AppResult<u64> {
        self.records.count(scope).await
    }

    async fn fetch(&self, scope: StoreScope, offset: u64, limit: u64) -> AppResult<Vec<Value>> {
        self.records.fetch(scope, offset, limit).await
    }
}

fn parse_records(content: &str) -> Result<Vec<Value>, String> {
    if content.trim_start().starts_with('[') {
        return serde_json::from_str(content).map_err(|error| error.to_string());
    }

    content
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(index, line)| {
            serde_json::from_str(line).map_err(|error| format!("line {}: {error}", index + 1))
        })
        .collect()
}
