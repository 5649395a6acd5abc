use std::collections::BTreeMap;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::{domain::Domain, utils::time::date_to_record_name};

use super::STATS_PREFIX;

/// Seconds spent per domain during one local calendar day.
pub type DailyStats = BTreeMap<String, f64>;

pub fn stats_key(date: NaiveDate) -> String {
    format!("{STATS_PREFIX}{}", date_to_record_name(date))
}

/// Inverse of [stats_key]. Returns `None` for keys that aren't daily buckets.
pub fn parse_stats_key(key: &str) -> Option<NaiveDate> {
    let date = key.strip_prefix(STATS_PREFIX)?;
    NaiveDate::parse_from_str(date, "%Y-%m-%d").ok()
}

/// Persisted mirror of the activity clock.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackingState {
    #[serde(default)]
    pub current_domain: Option<Domain>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub start_time: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimerStatus {
    Running,
    Paused,
}

/// A countdown timer. The field layout is shared with the popup and the page overlay, which read
/// the `timers` key directly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Timer {
    pub id: String,
    pub status: TimerStatus,
    /// Set iff the timer is running.
    #[serde(default, with = "chrono::serde::ts_milliseconds_option")]
    pub end_time: Option<DateTime<Utc>>,
    /// Seconds requested when the timer was started.
    pub duration: u64,
    /// Seconds shown in the completion message.
    pub original_duration: u64,
    /// Set iff the timer is paused. Stored in milliseconds.
    #[serde(
        default,
        with = "millis_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub remaining_on_pause: Option<Duration>,
}

impl Timer {
    pub fn is_running(&self) -> bool {
        self.status == TimerStatus::Running
    }

    pub fn is_paused(&self) -> bool {
        self.status == TimerStatus::Paused
    }

    /// Time left before the timer fires. Never negative.
    pub fn remaining(&self, now: DateTime<Utc>) -> Duration {
        let remaining = match (self.status, self.end_time) {
            (TimerStatus::Running, Some(end)) => end - now,
            (TimerStatus::Paused, _) => self.remaining_on_pause.unwrap_or_else(Duration::zero),
            (TimerStatus::Running, None) => Duration::zero(),
        };
        remaining.max(Duration::zero())
    }
}

/// A timer the schedule planner asked to start at a later time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduledTimer {
    pub activity_id: i64,
    pub duration_minutes: u64,
    pub activity_name: String,
}

/// Daily window in which hydration reminders are shown. Times are `HH:MM` in local time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HydrateSettings {
    #[serde(default = "default_hydrate_start")]
    pub start: String,
    #[serde(default = "default_hydrate_end")]
    pub end: String,
}

impl Default for HydrateSettings {
    fn default() -> Self {
        Self {
            start: default_hydrate_start(),
            end: default_hydrate_end(),
        }
    }
}

fn default_hydrate_start() -> String {
    "09:00".into()
}

fn default_hydrate_end() -> String {
    "18:00".into()
}

mod millis_option {
    use chrono::Duration;
    use serde::{self, Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(duration: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match duration {
            Some(duration) => serializer.serialize_i64(duration.num_milliseconds()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        // Older front-ends may have stored fractional milliseconds.
        let millis = Option::<f64>::deserialize(deserializer)?;
        Ok(millis.map(|v| Duration::milliseconds(v.max(0.) as i64)))
    }
}
