use std::collections::BTreeMap;

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::{broadcast, Mutex};

use super::{ChangeFeed, KeyValueStore, StorageChange};

/// Store that lives only as long as the process.
pub struct MemoryStore {
    values: Mutex<BTreeMap<String, Value>>,
    changes: ChangeFeed,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::with_values(BTreeMap::new())
    }

    pub fn with_values(values: BTreeMap<String, Value>) -> Self {
        Self {
            values: Mutex::new(values),
            changes: ChangeFeed::new(),
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<Value>> {
        Ok(self.values.lock().await.get(key).cloned())
    }

    async fn get_all(&self) -> Result<BTreeMap<String, Value>> {
        Ok(self.values.lock().await.clone())
    }

    async fn set(&self, entries: Vec<(String, Value)>) -> Result<()> {
        let mut values = self.values.lock().await;
        for (key, value) in entries {
            values.insert(key.clone(), value.clone());
            self.changes.publish(StorageChange {
                key,
                new_value: Some(value),
            });
        }
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        if self.values.lock().await.remove(key).is_some() {
            self.changes.publish(StorageChange {
                key: key.to_string(),
                new_value: None,
            });
        }
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<StorageChange> {
        self.changes.subscribe()
    }
}
