//! Filesystem-backed content store for leases on shared volumes.

use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use batchward_application::ContentStore;
use batchward_core::{AppError, AppResult};
use tokio::fs;
use uuid::Uuid;

/// Content store rooted at one directory, e.g. an NFS mount shared by hosts.
#[derive(Debug, Clone)]
pub struct FileSystemContentStore {
    root: PathBuf,
}

impl FileSystemContentStore {
    /// Creates a store rooted at `root`; the directory is created on first write.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Returns the root directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        self.root.as_path()
    }

    fn resolve(&self, path: &str) -> AppResult<PathBuf> {
        let relative = Path::new(path);
        let is_plain = !path.trim().is_empty()
            && relative
                .components()
                .all(|component| matches!(component, Component::Normal(_)));

        if !is_plain {
            return Err(AppError::Validation(format!(
                "content path '{path}' must be relative and must not traverse directories"
            )));
        }

        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl ContentStore for FileSystemContentStore {
    async fn exists(&self, path: &str) -> AppResult<bool> {
        let full_path = self.resolve(path)?;
        fs::try_exists(&full_path).await.map_err(|error| {
            AppError::Storage(format!(
                "failed to check '{}': {error}",
                full_path.display()
            ))
        })
    }

    async fn read(&self, path: &str) -> AppResult<Option<String>> {
        let full_path = self.resolve(path)?;
        match fs::read_to_string(&full_path).await {
            Ok(content) => Ok(Some(content)),
            Err(error) if error.kind() == ErrorKind::NotFound => Ok(None),
            Err(error) => Err(AppError::Storage(format!(
                "failed to read '{}': {error}",
                full_path.display()
            ))),
        }
    }

    async fn write(&self, path: &str, content: &str) -> AppResult<()> {
        let full_path = self.resolve(path)?;
        if let Some(parent) = full_path.parent() {
            fs::create_dir_all(parent).await.map_err(|error| {
                AppError::Storage(format!(
                    "failed to create directory '{}': {error}",
                    parent.display()
                ))
            })?;
        }

        // Write to a sibling file and rename so readers never see partial content.
        let staging_path = full_path.with_extension(format!("{}.tmp", Uuid::new_v4().simple()));
        fs::write(&staging_path, content).await.map_err(|error| {
            AppError::Storage(format!(
                "failed to write '{}': {error}",
                staging_path.display()
            ))
        })?;

        if let Err(error) = fs::rename(&staging_path, &full_path).await {
            let _ = fs::remove_file(&staging_path).await;
            return Err(AppError::Storage(format!(
                "failed to replace '{}': {error}",
                full_path.display()
            )));
        }

        Ok(())
    }

    async fn delete(&self, path: &str) -> AppResult<bool> {
        let full_path = self.resolve(path)?;
        match fs::remove_file(&full_path).await {
            Ok(()) => Ok(true),
            Err(error) if error.kind() == ErrorKind::NotFound => Ok(false),
            Err(error) => Err(AppError::Storage(format!(
                "failed to delete '{}': {error}",
                full_path.display()
            ))),
        }
    }
}
