use std::path::Path;

use anyhow::{bail, Context, Result};
use chrono::Duration;
use serde::{Deserialize, Serialize};
use tracing::debug;

pub const CONFIG_FILE_NAME: &str = "config.json";

/// Tunables of the host. Every field is optional in `config.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct HostConfig {
    /// Persisted tracking older than this is not resumed on startup.
    pub staleness_secs: u64,
    pub heartbeat_secs: u64,
    /// How often the badge is refreshed while a timer runs.
    pub tick_secs: u64,
    /// Seconds without input before the browser reports the user as idle.
    pub idle_detection_secs: u64,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            staleness_secs: 5 * 60,
            heartbeat_secs: 15,
            tick_secs: 6,
            idle_detection_secs: 60,
        }
    }
}

impl HostConfig {
    /// Reads `<dir>/config.json`, falling back to defaults when it doesn't exist.
    pub fn load(dir: &Path) -> Result<Self> {
        let path = dir.join(CONFIG_FILE_NAME);
        let content = match std::fs::read(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No {path:?}, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(e).with_context(|| format!("Failed to read {path:?}")),
        };
        let config: Self = serde_json::from_slice(&content)
            .with_context(|| format!("Malformed config {path:?}"))?;
        config.validate()?;
        Ok(config)
    }

    /// Periodic alarms need a non-zero period.
    fn validate(&self) -> Result<()> {
        if self.heartbeat_secs == 0 {
            bail!("heartbeatSecs must be at least 1");
        }
        if self.tick_secs == 0 {
            bail!("tickSecs must be at least 1");
        }
        Ok(())
    }

    pub fn staleness(&self) -> Duration {
        seconds(self.staleness_secs)
    }

    pub fn heartbeat(&self) -> Duration {
        seconds(self.heartbeat_secs)
    }

    pub fn tick(&self) -> Duration {
        seconds(self.tick_secs)
    }
}

fn seconds(value: u64) -> Duration {
    Duration::seconds(value.min(i64::MAX as u64 / 1000) as i64)
}
