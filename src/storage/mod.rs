use async_trait::async_trait;
use std::path::{Component, Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Invalid object key: {0}")]
    InvalidKey(String),

    #[error("Object not found: {0}")]
    NotFound(String),

    #[error("I/O error for {key}: {source}")]
    Io {
        key: String,
        #[source]
        source: std::io::Error,
    },
}

/// Binary blob store for uploaded documents. Keys are forward-slash paths
/// such as `documents/<uuid>.pdf`.
#[async_trait]
pub trait ObjectStorage: Send + Sync {
    async fn put(&self, key: &str, bytes: &[u8]) -> Result<(), StorageError>;

    async fn delete(&self, key: &str) -> Result<(), StorageError>;
}

/// Filesystem-backed object store rooted at a configured directory.
pub struct FsObjectStorage {
    root: PathBuf,
}

impl FsObjectStorage {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Rejects absolute keys and any traversal components before joining
    /// under the root.
    fn resolve(&self, key: &str) -> Result<PathBuf, StorageError> {
        let path = Path::new(key);
        if key.is_empty()
            || path.is_absolute()
            || path
                .components()
                .any(|c| !matches!(c, Component::Normal(_)))
        {
            return Err(StorageError::InvalidKey(key.to_string()));
        }
        Ok(self.root.join(path))
    }
}

#[async_trait]
impl ObjectStorage for FsObjectStorage {
    async fn put(&self, key: &str, bytes: &[u8]) -> Result<(), StorageError> {
        let path = self.resolve(key)?;

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|source| StorageError::Io {
                    key: key.to_string(),
                    source,
                })?;
        }

        tokio::fs::write(&path, bytes)
            .await
            .map_err(|source| StorageError::Io {
                key: key.to_string(),
                source,
            })
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        let path = self.resolve(key)?;

        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StorageError::NotFound(key.to_string()))
            }
            Err(source) => Err(StorageError::Io {
                key: key.to_string(),
                source,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_root() -> PathBuf {
        std::env::temp_dir().join(format!("medivault-storage-{}", uuid::Uuid::new_v4()))
    }

    #[tokio::test]
    async fn test_put_and_delete() {
        let root = temp_root();
        let storage = FsObjectStorage::new(&root);

        storage
            .put("documents/test.pdf", b"hello")
            .await
            .expect("put should succeed");

        let on_disk = tokio::fs::read(root.join("documents/test.pdf"))
            .await
            .expect("file should exist");
        assert_eq!(on_disk, b"hello");

        storage
            .delete("documents/test.pdf")
            .await
            .expect("delete should succeed");

        assert!(matches!(
            storage.delete("documents/test.pdf").await,
            Err(StorageError::NotFound(_))
        ));

        tokio::fs::remove_dir_all(&root).await.ok();
    }

    #[tokio::test]
    async fn test_rejects_traversal_keys() {
        let storage = FsObjectStorage::new(temp_root());

        assert!(matches!(
            storage.put("../escape.pdf", b"x").await,
            Err(StorageError::InvalidKey(_))
        ));
        assert!(matches!(
            storage.put("/absolute.pdf", b"x").await,
            Err(StorageError::InvalidKey(_))
        ));
        assert!(matches!(
            storage.put("", b"x").await,
            Err(StorageError::InvalidKey(_))
        ));
    }
}
