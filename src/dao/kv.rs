//! String key-value persistence used for resume snapshots, played sets and filters.

use std::{
    collections::{BTreeMap, HashMap},
    io::ErrorKind,
    path::PathBuf,
    sync::Arc,
};

use futures::future::BoxFuture;
use tokio::sync::{Mutex, RwLock};

use super::storage::{StorageError, StorageResult};

/// Durable string store; values are opaque to the store.
pub trait KvStore: Send + Sync {
    /// Value under `key`, if any.
    fn get(&self, key: &str) -> BoxFuture<'static, StorageResult<Option<String>>>;
    /// Store `value` under `key`, replacing any previous value.
    fn set(&self, key: &str, value: String) -> BoxFuture<'static, StorageResult<()>>;
    /// Delete `key`; missing keys are not an error.
    fn remove(&self, key: &str) -> BoxFuture<'static, StorageResult<()>>;
}

/// Process-local store. Clones share the same entries, which lets tests
/// simulate a reload by building a second engine over the same store.
#[derive(Debug, Clone, Default)]
pub struct MemoryKvStore {
    entries: Arc<RwLock<HashMap<String, String>>>,
}

impl MemoryKvStore {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

impl KvStore for MemoryKvStore {
    fn get(&self, key: &str) -> BoxFuture<'static, StorageResult<Option<String>>> {
        let entries = self.entries.clone();
        let key = key.to_string();
        Box::pin(async move { Ok(entries.read().await.get(&key).cloned()) })
    }

    fn set(&self, key: &str, value: String) -> BoxFuture<'static, StorageResult<()>> {
        let entries = self.entries.clone();
        let key = key.to_string();
        Box::pin(async move {
            entries.write().await.insert(key, value);
            Ok(())
        })
    }

    fn remove(&self, key: &str) -> BoxFuture<'static, StorageResult<()>> {
        let entries = self.entries.clone();
        let key = key.to_string();
        Box::pin(async move {
            entries.write().await.remove(&key);
            Ok(())
        })
    }
}

/// Store keeping every entry in a single JSON object on disk.
///
/// Writes go through a temporary file renamed over the target so a crash
/// never leaves a truncated file behind.
#[derive(Debug, Clone)]
pub struct FileKvStore {
    path: Arc<PathBuf>,
    lock: Arc<Mutex<()>>,
}

impl FileKvStore {
    /// Store backed by the JSON object file at `path`, created on first write.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Arc::new(path.into()),
            lock: Arc::new(Mutex::new(())),
        }
    }

    async fn read_all(&self) -> StorageResult<BTreeMap<String, String>> {
        match tokio::fs::read_to_string(self.path.as_ref()).await {
            Ok(contents) if contents.trim().is_empty() => Ok(BTreeMap::new()),
            Ok(contents) => serde_json::from_str(&contents).map_err(|err| {
                StorageError::unavailable(format!("corrupt store {}", self.path.display()), err)
            }),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(err) => Err(StorageError::unavailable(
                format!("failed to read {}", self.path.display()),
                err,
            )),
        }
    }

    async fn write_all(&self, entries: &BTreeMap<String, String>) -> StorageResult<()> {
        let payload = serde_json::to_string_pretty(entries).map_err(|err| {
            StorageError::unavailable("failed to encode store".to_string(), err)
        })?;

        if let Some(parent) = self.path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.map_err(|err| {
                StorageError::unavailable(format!("failed to create {}", parent.display()), err)
            })?;
        }

        let tmp = self.path.with_extension("tmp");
        tokio::fs::write(&tmp, payload).await.map_err(|err| {
            StorageError::unavailable(format!("failed to write {}", tmp.display()), err)
        })?;
        tokio::fs::rename(&tmp, self.path.as_ref())
            .await
            .map_err(|err| {
                StorageError::unavailable(format!("failed to replace {}", self.path.display()), err)
            })
    }
}

impl KvStore for FileKvStore {
    fn get(&self, key: &str) -> BoxFuture<'static, StorageResult<Option<String>>> {
        let store = self.clone();
        let key = key.to_string();
        Box::pin(async move {
            let _guard = store.lock.lock().await;
            Ok(store.read_all().await?.remove(&key))
        })
    }

    fn set(&self, key: &str, value: String) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        let key = key.to_string();
        Box::pin(async move {
            let _guard = store.lock.lock().await;
            let mut entries = store.read_all().await?;
            entries.insert(key, value);
            store.write_all(&entries).await
        })
    }

    fn remove(&self, key: &str) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        let key = key.to_string();
        Box::pin(async move {
            let _guard = store.lock.lock().await;
            let mut entries = store.read_all().await?;
            if entries.remove(&key).is_some() {
                store.write_all(&entries).await?;
            }
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn memory_store_clones_share_entries() {
        let store = MemoryKvStore::new();
        let other = store.clone();
        store.set("image.filter", "[1,2]".into()).await.unwrap();
        assert_eq!(
            other.get("image.filter").await.unwrap().as_deref(),
            Some("[1,2]")
        );
        other.remove("image.filter").await.unwrap();
        assert_eq!(store.get("image.filter").await.unwrap(), None);
    }

    #[tokio::test]
    async fn file_store_persists_across_instances() {
        let path = std::env::temp_dir()
            .join(format!("showrunner-{}", uuid::Uuid::new_v4()))
            .join("state.json");

        let store = FileKvStore::new(&path);
        assert_eq!(store.get("missing").await.unwrap(), None);
        store.set("word.played", "[3,1]".into()).await.unwrap();
        store.set("word.filter", "[]".into()).await.unwrap();
        store.remove("word.filter").await.unwrap();

        let reopened = FileKvStore::new(&path);
        assert_eq!(
            reopened.get("word.played").await.unwrap().as_deref(),
            Some("[3,1]")
        );
        assert_eq!(reopened.get("word.filter").await.unwrap(), None);

        if let Some(dir) = path.parent() {
            let _ = tokio::fs::remove_dir_all(dir).await;
        }
    }

    #[tokio::test]
    async fn corrupt_file_reports_unavailable() {
        let path = std::env::temp_dir().join(format!("showrunner-{}.json", uuid::Uuid::new_v4()));
        tokio::fs::write(&path, "not json").await.unwrap();
        let store = FileKvStore::new(&path);
        assert!(matches!(
            store.get("any").await,
            Err(StorageError::Unavailable { .. })
        ));
        let _ = tokio::fs::remove_file(&path).await;
    }
}
