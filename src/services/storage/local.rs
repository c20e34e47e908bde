/// Blob store backed by a directory on the local filesystem
use std::path::{Component, Path, PathBuf};

use super::{BlobStore, StorageError};

#[derive(Debug, Clone)]
pub struct LocalBlobStore {
    root: PathBuf,
}

impl LocalBlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Resolves `key` under the root; only plain relative components are accepted
    fn path_for(&self, key: &str) -> Result<PathBuf, StorageError> {
        let relative = Path::new(key);
        let plain = relative
            .components()
            .all(|c| matches!(c, Component::Normal(_)));
        if key.is_empty() || !plain {
            return Err(StorageError::InvalidKey(key.to_string()));
        }
        Ok(self.root.join(relative))
    }
}

#[async_trait::async_trait]
impl BlobStore for LocalBlobStore {
    async fn get(&self, key: &str) -> Result<Vec<u8>, StorageError> {
        match tokio::fs::read(self.path_for(key)?).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StorageError::NotFound(key.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn put(&self, key: &str, bytes: Vec<u8>) -> Result<(), StorageError> {
        let path = self.path_for(key)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let tmp = path.with_extension("tmp");
        tokio::fs::write(&tmp, bytes).await?;
        tokio::fs::rename(&tmp, &path).await?;
        Ok(())
    }

    fn name(&self) -> &'static str {
        "local"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::{assert_err, assert_ok};

    #[test]
    fn test_put_then_get() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalBlobStore::new(dir.path());

        tokio_test::block_on(async {
            assert_ok!(store.put("snapshots/model.bin", vec![1, 2, 3]).await);
            let bytes = store.get("snapshots/model.bin").await.unwrap();
            assert_eq!(bytes, vec![1, 2, 3]);
        });
    }

    #[test]
    fn test_missing_object() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalBlobStore::new(dir.path());

        let result = tokio_test::block_on(store.get("absent.bin"));
        let err = assert_err!(result);
        assert!(matches!(err, StorageError::NotFound(_)));
    }

    #[test]
    fn test_keys_cannot_escape_root() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("secret.txt"), b"outside").unwrap();
        let store = LocalBlobStore::new(dir.path().join("snapshots"));

        tokio_test::block_on(async {
            for key in ["../secret.txt", "a/../../secret.txt", "/etc/passwd", "./model.bin", ""] {
                let err = assert_err!(store.get(key).await);
                assert!(matches!(err, StorageError::InvalidKey(_)), "{}", key);
            }
            let err = assert_err!(store.put("../escaped.bin", vec![1]).await);
            assert!(matches!(err, StorageError::InvalidKey(_)));
        });
        assert!(!dir.path().join("escaped.bin").exists());
    }
}
