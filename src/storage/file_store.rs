use std::{
    collections::BTreeMap,
    io::ErrorKind,
    path::{Path, PathBuf},
};

use anyhow::Result;
use async_trait::async_trait;
use fs4::tokio::AsyncFileExt;
use serde_json::Value;
use tokio::{
    fs::File,
    io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt},
    sync::{broadcast, Mutex},
};
use tracing::{debug, warn};

use super::{ChangeFeed, KeyValueStore, StorageChange};

pub const STORE_FILE_NAME: &str = "storage.json";

/// The main realization of [KeyValueStore]. All values live in memory and every write rewrites
/// a single JSON object on disk while holding an exclusive lock, so readers such as the `stats`
/// command never observe a half written file.
pub struct JsonFileStore {
    path: PathBuf,
    values: Mutex<BTreeMap<String, Value>>,
    changes: ChangeFeed,
}

impl JsonFileStore {
    pub async fn open(path: PathBuf) -> Result<Self> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let values = load_values(&path).await?;
        debug!("Opened store {path:?} with {} keys", values.len());
        Ok(Self {
            path,
            values: Mutex::new(values),
            changes: ChangeFeed::new(),
        })
    }

    pub async fn open_in(dir: &Path) -> Result<Self> {
        Self::open(dir.join(STORE_FILE_NAME)).await
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

async fn read_locked(path: &Path) -> std::io::Result<Option<Vec<u8>>> {
    let mut file = match File::open(path).await {
        Ok(file) => file,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e),
    };
    file.lock_shared()?;
    let mut buffer = Vec::new();
    let result = file.read_to_end(&mut buffer).await;
    file.unlock_async().await?;
    result?;
    Ok(Some(buffer))
}

async fn load_values(path: &Path) -> Result<BTreeMap<String, Value>> {
    let Some(bytes) = read_locked(path).await? else {
        return Ok(BTreeMap::new());
    };
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Ok(BTreeMap::new());
    }
    match serde_json::from_slice::<BTreeMap<String, Value>>(&bytes) {
        Ok(values) => Ok(values),
        Err(e) => {
            // Might happen after a crash in the middle of a write. Keep the broken file around
            // for inspection and start over.
            let mut corrupt = path.as_os_str().to_owned();
            corrupt.push(".corrupt");
            warn!("Store {path:?} is corrupted, moving it to {corrupt:?}: {e}");
            tokio::fs::rename(path, &corrupt).await?;
            Ok(BTreeMap::new())
        }
    }
}

async fn write_locked(path: &Path, values: &BTreeMap<String, Value>) -> Result<()> {
    let buffer = serde_json::to_vec(values)?;
    let mut file = File::options()
        .write(true)
        .create(true)
        .read(true)
        .truncate(false)
        .open(path)
        .await?;

    // Semi-safe acquire-release for a file
    file.lock_exclusive()?;
    let result = async {
        file.set_len(0).await?;
        file.rewind().await?;
        file.write_all(&buffer).await?;
        file.flush().await?;
        file.sync_data().await
    }
    .await;
    file.unlock_async().await?;
    result?;
    Ok(())
}

#[async_trait]
impl KeyValueStore for JsonFileStore {
    async fn get(&self, key: &str) -> Result<Option<Value>> {
        Ok(self.values.lock().await.get(key).cloned())
    }

    async fn get_all(&self) -> Result<BTreeMap<String, Value>> {
        Ok(self.values.lock().await.clone())
    }

    async fn set(&self, entries: Vec<(String, Value)>) -> Result<()> {
        let mut values = self.values.lock().await;
        let mut updated = values.clone();
        for (key, value) in &entries {
            updated.insert(key.clone(), value.clone());
        }
        // Nothing is applied in memory unless the file write went through.
        write_locked(&self.path, &updated).await?;
        *values = updated;
        drop(values);

        for (key, value) in entries {
            self.changes.publish(StorageChange {
                key,
                new_value: Some(value),
            });
        }
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        let mut values = self.values.lock().await;
        if !values.contains_key(key) {
            return Ok(());
        }
        let mut updated = values.clone();
        updated.remove(key);
        write_locked(&self.path, &updated).await?;
        *values = updated;
        drop(values);

        self.changes.publish(StorageChange {
            key: key.to_string(),
            new_value: None,
        });
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<StorageChange> {
        self.changes.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use anyhow::Result;
    use serde_json::json;
    use tempfile::tempdir;

    use crate::storage::{KeyValueStore, StorageChange, StoreExt};

    use super::{JsonFileStore, STORE_FILE_NAME};

    #[tokio::test]
    async fn values_survive_reopening() -> Result<()> {
        let dir = tempdir()?;
        {
            let store = JsonFileStore::open_in(dir.path()).await?;
            store
                .set(vec![
                    ("stats_2018-07-04".into(), json!({ "docs.rs": 12.5 })),
                    ("timers".into(), json!([])),
                ])
                .await?;
            store.remove("timers").await?;
        }

        let store = JsonFileStore::open_in(dir.path()).await?;
        assert_eq!(
            store.get("stats_2018-07-04").await?,
            Some(json!({ "docs.rs": 12.5 }))
        );
        assert_eq!(store.get("timers").await?, None);
        Ok(())
    }

    #[tokio::test]
    async fn corrupt_file_is_moved_aside() -> Result<()> {
        let dir = tempdir()?;
        std::fs::write(dir.path().join(STORE_FILE_NAME), b"{\"timers\": [")?;

        let store = JsonFileStore::open_in(dir.path()).await?;
        assert!(store.get_all().await?.is_empty());
        assert!(dir.path().join("storage.json.corrupt").exists());

        store.set_typed("hydrate_active", &true).await?;
        assert_eq!(store.get_typed::<bool>("hydrate_active").await?, Some(true));
        Ok(())
    }

    #[tokio::test]
    async fn writes_are_published() -> Result<()> {
        let dir = tempdir()?;
        let store = JsonFileStore::open_in(dir.path()).await?;
        let mut changes = store.subscribe();

        store.set_typed("eyeblink_active", &false).await?;
        store.remove("eyeblink_active").await?;
        store.remove("never_written").await?;

        assert_eq!(
            changes.recv().await?,
            StorageChange {
                key: "eyeblink_active".into(),
                new_value: Some(json!(false)),
            }
        );
        assert_eq!(
            changes.recv().await?,
            StorageChange {
                key: "eyeblink_active".into(),
                new_value: None,
            }
        );
        assert!(changes.try_recv().is_err());
        Ok(())
    }
}
