//! Storage is organized as a flat key-value store holding JSON values, shared with the extension
//! front-ends through `storageChanged` notifications. The basic idea is:
//!  - Every day has its own `stats_<YYYY-MM-DD>` bucket mapping domains to seconds.
//!  - `trackingState` mirrors the activity clock so a restart can resume it.
//!  - `timers` holds the whole timer list, rewritten on every change.
//!
//! [file_store::JsonFileStore] keeps everything in a single file in the application directory.

pub mod entities;
pub mod file_store;
pub mod memory;

use std::{collections::BTreeMap, future::Future};

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use tokio::sync::broadcast;

pub const TRACKING_STATE_KEY: &str = "trackingState";
pub const TIMERS_KEY: &str = "timers";
pub const STATS_PREFIX: &str = "stats_";
pub const SCHEDULED_TIMERS_KEY: &str = "scheduled_timers";
pub const HYDRATE_SETTINGS_KEY: &str = "hydrate_settings";
pub const HYDRATE_ACTIVE_KEY: &str = "hydrate_active";
pub const EYEBLINK_ACTIVE_KEY: &str = "eyeblink_active";

/// Keys written only by the host itself. Front-ends may read them but not change them.
pub fn is_host_managed(key: &str) -> bool {
    key == TRACKING_STATE_KEY || key == TIMERS_KEY || key.starts_with(STATS_PREFIX)
}

/// Capacity of the change feed. Slow subscribers miss older changes rather than block writers.
const CHANGE_FEED_CAPACITY: usize = 64;

/// A single key that was written or removed.
#[derive(Debug, Clone, PartialEq)]
pub struct StorageChange {
    pub key: String,
    pub new_value: Option<Value>,
}

/// Interface for abstracting the persistent key-value store.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Value>>;

    /// Every stored key with its value.
    async fn get_all(&self) -> Result<BTreeMap<String, Value>>;

    /// Writes all entries in one round trip.
    async fn set(&self, entries: Vec<(String, Value)>) -> Result<()>;

    async fn remove(&self, key: &str) -> Result<()>;

    /// Subscribes to changes made after this call.
    fn subscribe(&self) -> broadcast::Receiver<StorageChange>;
}

/// Typed access on top of [KeyValueStore].
pub trait StoreExt {
    fn get_typed<T: DeserializeOwned>(
        &self,
        key: &str,
    ) -> impl Future<Output = Result<Option<T>>> + Send;

    fn set_typed<T: Serialize + Sync>(
        &self,
        key: &str,
        value: &T,
    ) -> impl Future<Output = Result<()>> + Send;
}

impl<S: KeyValueStore + ?Sized> StoreExt for S {
    async fn get_typed<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        match self.get(key).await? {
            Some(value) => Ok(Some(
                serde_json::from_value(value).with_context(|| format!("Malformed value in {key}"))?,
            )),
            None => Ok(None),
        }
    }

    async fn set_typed<T: Serialize + Sync>(&self, key: &str, value: &T) -> Result<()> {
        self.set(vec![(key.to_string(), serde_json::to_value(value)?)])
            .await
    }
}

/// Sender side of the change feed, shared by store implementations.
pub(crate) struct ChangeFeed {
    sender: broadcast::Sender<StorageChange>,
}

impl ChangeFeed {
    pub(crate) fn new() -> Self {
        let (sender, _) = broadcast::channel(CHANGE_FEED_CAPACITY);
        Self { sender }
    }

    pub(crate) fn publish(&self, change: StorageChange) {
        // No subscribers is fine.
        let _ = self.sender.send(change);
    }

    pub(crate) fn subscribe(&self) -> broadcast::Receiver<StorageChange> {
        self.sender.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::is_host_managed;

    #[test]
    fn front_end_keys_are_not_host_managed() {
        assert!(is_host_managed("timers"));
        assert!(is_host_managed("trackingState"));
        assert!(is_host_managed("stats_2025-03-15"));
        assert!(!is_host_managed("hydrate_active"));
        assert!(!is_host_managed("scheduled_timers"));
    }
}
