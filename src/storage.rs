use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::debug;
use uuid::Uuid;

use crate::error::{RelingoError, Result};

/// Document holding the persisted settings
pub const SETTINGS_DOCUMENT: &str = "settings.json";
/// Document holding the translation history
pub const HISTORY_DOCUMENT: &str = "history.json";
/// Document holding the translation cache
pub const CACHE_DOCUMENT: &str = "cache.json";

/// Durable key/value store for the engine's JSON documents.
///
/// A document that was never written reads as `None`.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Storage: Send + Sync {
    async fn read(&self, name: &str) -> Result<Option<String>>;

    async fn write(&self, name: &str, contents: &str) -> Result<()>;

    async fn exists(&self, name: &str) -> Result<bool>;
}

/// Stores each document as a file in one directory.
///
/// Writes to the same document are serialized; the last write wins.
pub struct FileStorage {
    dir: PathBuf,
    write_locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl FileStorage {
    pub fn new<P: AsRef<Path>>(dir: P) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
            write_locks: Mutex::new(HashMap::new()),
        }
    }

    fn write_lock(&self, name: &str) -> Arc<tokio::sync::Mutex<()>> {
        self.write_locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(name.to_string())
            .or_default()
            .clone()
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path(&self, name: &str) -> Result<PathBuf> {
        if name.is_empty() || name.contains('/') || name.contains('\\') || name.starts_with('.') {
            return Err(RelingoError::Storage(format!("Invalid document name: '{}'", name)));
        }
        Ok(self.dir.join(name))
    }
}

#[async_trait]
impl Storage for FileStorage {
    async fn read(&self, name: &str) -> Result<Option<String>> {
        let path = self.path(name)?;
        match tokio::fs::read_to_string(&path).await {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("Document {} not found, starting empty", path.display());
                Ok(None)
            }
            Err(e) => Err(RelingoError::Storage(format!(
                "Failed to read {}: {}",
                path.display(),
                e
            ))),
        }
    }

    async fn write(&self, name: &str, contents: &str) -> Result<()> {
        let path = self.path(name)?;
        let lock = self.write_lock(name);
        let _guard = lock.lock().await;

        tokio::fs::create_dir_all(&self.dir).await?;

        // Write to a sibling file first so readers never see a partial document
        let tmp = self.dir.join(format!(".{}.{}.tmp", name, Uuid::new_v4().simple()));
        if let Err(e) = tokio::fs::write(&tmp, contents).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(e.into());
        }
        tokio::fs::rename(&tmp, &path).await?;
        Ok(())
    }

    async fn exists(&self, name: &str) -> Result<bool> {
        let path = self.path(name)?;
        Ok(tokio::fs::try_exists(&path).await?)
    }
}

/// In-process storage, used when nothing needs to survive a restart
#[derive(Default)]
pub struct MemoryStorage {
    documents: Mutex<HashMap<String, String>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    fn documents(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, String>>> {
        self.documents
            .lock()
            .map_err(|_| RelingoError::Storage("Memory storage lock poisoned".to_string()))
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn read(&self, name: &str) -> Result<Option<String>> {
        Ok(self.documents()?.get(name).cloned())
    }

    async fn write(&self, name: &str, contents: &str) -> Result<()> {
        self.documents()?.insert(name.to_string(), contents.to_string());
        Ok(())
    }

    async fn exists(&self, name: &str) -> Result<bool> {
        Ok(self.documents()?.contains_key(name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_file_storage_missing_document_reads_none() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FileStorage::new(dir.path().join("data"));

        assert_eq!(storage.read(HISTORY_DOCUMENT).await.unwrap(), None);
        assert!(!storage.exists(HISTORY_DOCUMENT).await.unwrap());
    }

    #[tokio::test]
    async fn test_file_storage_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FileStorage::new(dir.path().join("nested").join("data"));

        storage.write(CACHE_DOCUMENT, "[]").await.unwrap();
        assert!(storage.exists(CACHE_DOCUMENT).await.unwrap());
        assert_eq!(storage.read(CACHE_DOCUMENT).await.unwrap().as_deref(), Some("[]"));

        storage.write(CACHE_DOCUMENT, "[1]").await.unwrap();
        assert_eq!(storage.read(CACHE_DOCUMENT).await.unwrap().as_deref(), Some("[1]"));
    }

    #[tokio::test]
    async fn test_file_storage_concurrent_writes_leave_one_whole_document() {
        let dir = tempfile::tempdir().unwrap();
        let storage = Arc::new(FileStorage::new(dir.path().join("data")));

        let handles: Vec<_> = (0..64)
            .map(|i| {
                let storage = storage.clone();
                tokio::spawn(async move {
                    let doc = serde_json::to_string(&vec![i; i + 1]).unwrap();
                    storage.write(CACHE_DOCUMENT, &doc).await
                })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let content = storage.read(CACHE_DOCUMENT).await.unwrap().unwrap();
        let values: Vec<usize> = serde_json::from_str(&content).unwrap();
        assert_eq!(values.len(), values[0] + 1);
        assert!(values.iter().all(|v| *v == values[0]));

        let leftovers = std::fs::read_dir(dir.path().join("data")).unwrap().count();
        assert_eq!(leftovers, 1);
    }

    #[tokio::test]
    async fn test_file_storage_rejects_path_names() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FileStorage::new(dir.path());
        assert!(matches!(
            storage.read("../etc/passwd").await,
            Err(RelingoError::Storage(_))
        ));
    }

    #[test]
    fn test_memory_storage() {
        let storage = MemoryStorage::new();
        tokio_test::block_on(async {
            assert!(!storage.exists(SETTINGS_DOCUMENT).await.unwrap());
            tokio_test::assert_ok!(storage.write(SETTINGS_DOCUMENT, "{}").await);
            assert_eq!(storage.read(SETTINGS_DOCUMENT).await.unwrap().as_deref(), Some("{}"));
        });
    }
}
