use std::sync::Arc;

use anyhow::{bail, Result};
use tracing::{debug, info, warn};

use crate::{
    browser::{Browser, WindowTarget},
    storage::{
        entities::{HydrateSettings, ScheduledTimer},
        KeyValueStore, StoreExt, EYEBLINK_ACTIVE_KEY, HYDRATE_ACTIVE_KEY, HYDRATE_SETTINGS_KEY,
        SCHEDULED_TIMERS_KEY,
    },
    surface::{Notification, Surface},
    timers::registry::TimerRegistry,
    utils::{clock::Clock, time::local_minute_of_day},
};

const HYDRATE_TITLE: &str = "💧 Time to Hydrate!";
const HYDRATE_MESSAGE: &str = "Take a moment to drink some water. Stay healthy!";

/// Reminder features configured from the popup: hydration notifications, the eye-break overlay
/// and timers planned ahead in the schedule.
pub struct Reminders {
    store: Arc<dyn KeyValueStore>,
    clock: Arc<dyn Clock>,
    browser: Arc<dyn Browser>,
    surface: Arc<dyn Surface>,
    timers: Arc<TimerRegistry>,
}

impl Reminders {
    pub fn new(
        store: Arc<dyn KeyValueStore>,
        clock: Arc<dyn Clock>,
        browser: Arc<dyn Browser>,
        surface: Arc<dyn Surface>,
        timers: Arc<TimerRegistry>,
    ) -> Self {
        Self {
            store,
            clock,
            browser,
            surface,
            timers,
        }
    }

    /// Starts the planned timer for the activity and forgets the plan.
    pub async fn start_scheduled(&self, activity_id: i64) -> Result<()> {
        let mut scheduled: Vec<ScheduledTimer> = self
            .store
            .get_typed(SCHEDULED_TIMERS_KEY)
            .await?
            .unwrap_or_default();
        let Some(index) = scheduled
            .iter()
            .position(|entry| entry.activity_id == activity_id)
        else {
            debug!("Activity {activity_id} is no longer scheduled");
            return Ok(());
        };
        let entry = scheduled.remove(index);
        self.store
            .set_typed(SCHEDULED_TIMERS_KEY, &scheduled)
            .await?;

        self.timers
            .start(entry.duration_minutes.saturating_mul(60))
            .await?;
        info!("Started scheduled timer for {}", entry.activity_name);
        self.surface
            .notify(Notification {
                id: format!("scheduledTimer_{activity_id}_{}", self.now_millis()),
                title: "Scheduled Timer Started".into(),
                message: format!(
                    "Timer started for \"{}\" ({}m)",
                    entry.activity_name, entry.duration_minutes
                ),
            })
            .await?;
        Ok(())
    }

    /// Reminds to drink water, but only within the configured daily window.
    pub async fn hydrate(&self) -> Result<()> {
        if !self.flag(HYDRATE_ACTIVE_KEY).await? {
            return Ok(());
        }
        let settings: HydrateSettings = self
            .store
            .get_typed(HYDRATE_SETTINGS_KEY)
            .await?
            .unwrap_or_default();
        let (Some(start), Some(end)) = (
            parse_time_of_day(&settings.start),
            parse_time_of_day(&settings.end),
        ) else {
            warn!("Ignoring malformed hydration window {settings:?}");
            return Ok(());
        };

        let now = local_minute_of_day(self.clock.time());
        if (start..=end).contains(&now) {
            self.notify_hydrate("hydrateNotification").await?;
        }
        Ok(())
    }

    /// Sends the hydration notification regardless of settings. Returns the notification id.
    pub async fn test_hydrate(&self) -> Result<String> {
        self.notify_hydrate("hydrateTest").await
    }

    pub async fn eye_blink(&self) -> Result<()> {
        if self.flag(EYEBLINK_ACTIVE_KEY).await? {
            self.show_eye_blink().await?;
        }
        Ok(())
    }

    /// Shows the eye-break overlay in the active tab of the current window. Pages the overlay
    /// can't be injected into are skipped.
    pub async fn show_eye_blink(&self) -> Result<()> {
        let Some(tab) = self.browser.active_tab(WindowTarget::Current).await? else {
            bail!("No active tab to show the overlay in");
        };
        match tab.url.as_deref() {
            Some(url) if url.starts_with("http") || url.starts_with("file") => {
                self.surface.show_eye_blink_overlay(tab.id).await;
            }
            url => debug!("Can't show the overlay on {url:?}"),
        }
        Ok(())
    }

    async fn notify_hydrate(&self, prefix: &str) -> Result<String> {
        self.surface
            .notify(Notification {
                id: format!("{prefix}_{}", self.now_millis()),
                title: HYDRATE_TITLE.into(),
                message: HYDRATE_MESSAGE.into(),
            })
            .await
    }

    async fn flag(&self, key: &str) -> Result<bool> {
        Ok(self.store.get_typed::<bool>(key).await?.unwrap_or(false))
    }

    fn now_millis(&self) -> i64 {
        self.clock.time().timestamp_millis()
    }
}

/// Minutes since midnight for `HH:MM`.
fn parse_time_of_day(value: &str) -> Option<u32> {
    let (hours, minutes) = value.split_once(':')?;
    let hours: u32 = hours.trim().parse().ok()?;
    let minutes: u32 = minutes.trim().parse().ok()?;
    (hours < 24 && minutes < 60).then_some(hours * 60 + minutes)
}
