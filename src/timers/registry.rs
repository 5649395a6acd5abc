use std::sync::{Arc, Mutex, MutexGuard};

use anyhow::{bail, Result};
use chrono::Duration;
use serde::Serialize;
use tracing::{debug, error, info, instrument, warn};

use crate::{
    alarms::{AlarmName, AlarmSchedule, AlarmScheduler, TIMER_UPDATE},
    storage::{
        entities::{Timer, TimerStatus},
        KeyValueStore, StoreExt, TIMERS_KEY,
    },
    surface::{Notification, Surface},
    utils::clock::Clock,
};

use super::{
    badge::{badge_view, BadgeView},
    format_rounded, generate_timer_id,
};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Started {
    pub timers: Vec<Timer>,
    pub new_timer: Timer,
}

/// Owns the list of countdown timers.
///
/// The in-memory list is the source of truth. Every operation changes it before its first
/// suspension point and only then persists, so concurrent operations never work on a stale copy.
/// Writes are ordered by a gate and each one stores the list as it is when the write starts,
/// which means the last write always carries the latest list.
pub struct TimerRegistry {
    timers: Mutex<Vec<Timer>>,
    write_gate: tokio::sync::Mutex<()>,
    store: Arc<dyn KeyValueStore>,
    clock: Arc<dyn Clock>,
    alarms: Arc<dyn AlarmScheduler>,
    surface: Arc<dyn Surface>,
    tick_period: Duration,
}

impl TimerRegistry {
    /// Loads the persisted list. Timers that ran out while nothing was running are dropped
    /// without a notification, the rest get their wake alarms back.
    pub async fn load(
        store: Arc<dyn KeyValueStore>,
        clock: Arc<dyn Clock>,
        alarms: Arc<dyn AlarmScheduler>,
        surface: Arc<dyn Surface>,
        tick_period: Duration,
    ) -> Self {
        let persisted = store
            .get_typed::<Vec<Timer>>(TIMERS_KEY)
            .await
            .inspect_err(|e| error!("Failed to read timers {e:?}"))
            .ok()
            .flatten()
            .unwrap_or_default();

        let now = clock.time();
        let total = persisted.len();
        let timers: Vec<Timer> = persisted
            .into_iter()
            .filter(|timer| match timer.status {
                TimerStatus::Running => timer.end_time.is_some_and(|end| end > now),
                TimerStatus::Paused => true,
            })
            .collect();
        if timers.len() < total {
            info!("Dropped {} timers that expired", total - timers.len());
        }

        let registry = Self {
            timers: Mutex::new(timers),
            write_gate: tokio::sync::Mutex::new(()),
            store,
            clock,
            alarms,
            surface,
            tick_period,
        };

        {
            let timers = registry.lock();
            for timer in timers.iter() {
                registry.schedule_end(timer);
            }
            registry.sync_tick(&timers);
        }
        registry.persist().await;
        registry.refresh_badge().await;
        registry
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Timer>> {
        self.timers.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn list(&self) -> Vec<Timer> {
        self.lock().clone()
    }

    /// The oldest timer. Kept for front-ends that only know a single timer.
    pub fn first(&self) -> Option<Timer> {
        self.lock().first().cloned()
    }

    /// Starts a countdown. Fails for durations that would end beyond the representable time.
    #[instrument(skip(self))]
    pub async fn start(&self, duration_secs: u64) -> Result<Started> {
        let now = self.clock.time();
        let Some(end_time) = i64::try_from(duration_secs)
            .ok()
            .and_then(Duration::try_seconds)
            .and_then(|duration| now.checked_add_signed(duration))
        else {
            bail!("Timer of {duration_secs}s is too long");
        };
        let timer = Timer {
            id: generate_timer_id(now),
            status: TimerStatus::Running,
            end_time: Some(end_time),
            duration: duration_secs,
            original_duration: duration_secs,
            remaining_on_pause: None,
        };
        let timers = {
            let mut timers = self.lock();
            timers.push(timer.clone());
            self.schedule_end(&timer);
            self.sync_tick(&timers);
            timers.clone()
        };
        debug!("Started timer {}", timer.id);

        self.persist().await;
        self.refresh_badge().await;
        Ok(Started {
            timers,
            new_timer: timer,
        })
    }

    /// Removes the timer. A `finished` timer also notifies the user. Unknown ids are ignored.
    #[instrument(skip(self))]
    pub async fn stop(&self, timer_id: &str, finished: bool) -> Vec<Timer> {
        self.remove(timer_id, finished).await;
        self.refresh_badge().await;
        self.list()
    }

    #[instrument(skip(self))]
    pub async fn pause(&self, timer_id: &str) -> Vec<Timer> {
        let now = self.clock.time();
        let changed = {
            let mut timers = self.lock();
            let paused = timers
                .iter_mut()
                .find(|timer| timer.id == timer_id && timer.is_running())
                .map(|timer| {
                    timer.remaining_on_pause = Some(timer.remaining(now));
                    timer.status = TimerStatus::Paused;
                    timer.end_time = None;
                })
                .is_some();
            if paused {
                self.alarms.clear(&AlarmName::timer_end(timer_id));
                self.sync_tick(&timers);
            }
            paused
        };
        if changed {
            debug!("Paused timer {timer_id}");
            self.persist().await;
            self.refresh_badge().await;
        }
        self.list()
    }

    #[instrument(skip(self))]
    pub async fn resume(&self, timer_id: &str) -> Vec<Timer> {
        let now = self.clock.time();
        let changed = {
            let mut timers = self.lock();
            let resumed = timers
                .iter_mut()
                .find(|timer| timer.id == timer_id && timer.is_paused())
                .and_then(|timer| {
                    let remaining = timer.remaining_on_pause.unwrap_or_else(Duration::zero);
                    let Some(end_time) = now.checked_add_signed(remaining) else {
                        warn!("Timer {timer_id} can't resume with {remaining} left");
                        return None;
                    };
                    timer.remaining_on_pause = None;
                    timer.status = TimerStatus::Running;
                    timer.end_time = Some(end_time);
                    Some(timer.clone())
                });
            if let Some(timer) = &resumed {
                self.schedule_end(timer);
                self.sync_tick(&timers);
            }
            resumed.is_some()
        };
        if changed {
            debug!("Resumed timer {timer_id}");
            self.persist().await;
            self.refresh_badge().await;
        }
        self.list()
    }

    /// Publishes the badge for the current list. A timer that should already have ended is
    /// finished first, which also covers wake alarms that never fired.
    pub async fn refresh_badge(&self) {
        loop {
            let view = badge_view(&self.lock(), self.clock.time());
            match view {
                BadgeView::Show(badge) => {
                    self.surface.set_badge(badge).await;
                    return;
                }
                BadgeView::Expired(timer_id) => {
                    debug!("Timer {timer_id} ran out without its alarm");
                    self.remove(&timer_id, true).await;
                }
            }
        }
    }

    async fn remove(&self, timer_id: &str, finished: bool) {
        let removed = {
            let mut timers = self.lock();
            let Some(index) = timers.iter().position(|timer| timer.id == timer_id) else {
                return;
            };
            let removed = timers.remove(index);
            self.alarms.clear(&AlarmName::timer_end(timer_id));
            self.sync_tick(&timers);
            removed
        };
        debug!("Removed timer {timer_id}, finished: {finished}");
        self.persist().await;

        if finished {
            let notification = Notification {
                id: format!("timerDone_{}", removed.id),
                title: "Timer Done!".into(),
                message: format!(
                    "Your {} timer is up.",
                    format_rounded(removed.original_duration)
                ),
            };
            if let Err(e) = self.surface.notify(notification).await {
                warn!("Failed to notify about timer {timer_id} {e:?}");
            }
            self.surface.play_sound().await;
        }
    }

    fn schedule_end(&self, timer: &Timer) {
        if let (TimerStatus::Running, Some(end)) = (timer.status, timer.end_time) {
            self.alarms
                .create(&AlarmName::timer_end(&timer.id), AlarmSchedule::At(end));
        }
    }

    /// The tick alarm exists iff at least one timer is running.
    fn sync_tick(&self, timers: &[Timer]) {
        if timers.iter().any(Timer::is_running) {
            if !self.alarms.exists(TIMER_UPDATE) {
                self.alarms
                    .create(TIMER_UPDATE, AlarmSchedule::every(self.tick_period));
            }
        } else {
            self.alarms.clear(TIMER_UPDATE);
        }
    }

    async fn persist(&self) {
        let _gate = self.write_gate.lock().await;
        let timers = self.list();
        if let Err(e) = self.store.set_typed(TIMERS_KEY, &timers).await {
            error!("Failed to persist timers {e:?}");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use anyhow::Result;
    use chrono::Duration;

    use crate::{
        alarms::{testing::FakeAlarms, AlarmName, AlarmSchedule, AlarmScheduler, TIMER_UPDATE},
        storage::{
            entities::{Timer, TimerStatus},
            memory::MemoryStore,
            KeyValueStore, StoreExt, TIMERS_KEY,
        },
        surface::{testing::RecordingSurface, Badge, RUNNING_BADGE_COLOR},
        utils::{
            clock::{testing::ManualClock, Clock},
            logging::TEST_LOGGING,
        },
    };

    use super::TimerRegistry;

    struct Fixture {
        store: Arc<MemoryStore>,
        clock: ManualClock,
        alarms: Arc<FakeAlarms>,
        surface: Arc<RecordingSurface>,
    }

    impl Fixture {
        fn new() -> Self {
            *TEST_LOGGING;
            Self {
                store: Arc::new(MemoryStore::new()),
                clock: ManualClock::new(),
                alarms: Arc::default(),
                surface: Arc::default(),
            }
        }

        async fn registry(&self) -> TimerRegistry {
            TimerRegistry::load(
                self.store.clone(),
                Arc::new(self.clock.clone()),
                self.alarms.clone(),
                self.surface.clone(),
                Duration::seconds(6),
            )
            .await
        }

        async fn persisted(&self) -> Vec<Timer> {
            self.store
                .get_typed(TIMERS_KEY)
                .await
                .unwrap()
                .unwrap_or_default()
        }
    }

    #[tokio::test]
    async fn pause_and_resume_keep_remaining_time() -> Result<()> {
        let fixture = Fixture::new();
        let registry = fixture.registry().await;

        let started = registry.start(60).await?;
        let id = started.new_timer.id.clone();
        assert_eq!(started.timers, vec![started.new_timer.clone()]);
        assert!(fixture.alarms.exists(&AlarmName::timer_end(&id)));

        let timers = registry.pause(&id).await;
        assert_eq!(timers[0].status, TimerStatus::Paused);
        assert_eq!(timers[0].end_time, None);
        assert!(!fixture.alarms.exists(&AlarmName::timer_end(&id)));

        fixture.clock.advance_secs(600);
        let timers = registry.resume(&id).await;
        assert_eq!(timers[0].remaining_on_pause, None);
        assert_eq!(
            timers[0].remaining(fixture.clock.time()),
            Duration::seconds(60)
        );
        assert_eq!(
            fixture.alarms.schedule(&AlarmName::timer_end(&id)),
            Some(AlarmSchedule::At(fixture.clock.time() + Duration::seconds(60)))
        );

        let timers = registry.stop(&id, false).await;
        assert!(timers.is_empty());
        assert!(fixture.alarms.names().is_empty());
        assert!(fixture.persisted().await.is_empty());
        assert!(fixture.surface.notifications().is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn pausing_records_time_left() -> Result<()> {
        let fixture = Fixture::new();
        let registry = fixture.registry().await;
        let id = registry.start(300).await?.new_timer.id;

        fixture.clock.advance(Duration::milliseconds(100_500));
        registry.pause(&id).await;
        let persisted = fixture.persisted().await;
        assert_eq!(
            persisted[0].remaining_on_pause,
            Some(Duration::milliseconds(199_500))
        );

        // Pausing twice changes nothing.
        fixture.clock.advance_secs(30);
        assert_eq!(registry.pause(&id).await, persisted);
        Ok(())
    }

    #[tokio::test]
    async fn tick_alarm_follows_running_timers() -> Result<()> {
        let fixture = Fixture::new();
        let registry = fixture.registry().await;
        assert!(!fixture.alarms.exists(TIMER_UPDATE));

        let a = registry.start(60).await?.new_timer.id;
        let b = registry.start(120).await?.new_timer.id;
        assert!(fixture.alarms.exists(TIMER_UPDATE));

        registry.pause(&a).await;
        assert!(fixture.alarms.exists(TIMER_UPDATE));
        registry.pause(&b).await;
        assert!(!fixture.alarms.exists(TIMER_UPDATE));
        registry.resume(&a).await;
        assert!(fixture.alarms.exists(TIMER_UPDATE));
        registry.stop(&a, false).await;
        assert!(!fixture.alarms.exists(TIMER_UPDATE));
        registry.stop(&b, false).await;
        assert!(!fixture.alarms.exists(TIMER_UPDATE));
        Ok(())
    }

    #[tokio::test]
    async fn unknown_ids_are_ignored() -> Result<()> {
        let fixture = Fixture::new();
        let registry = fixture.registry().await;
        let started = registry.start(60).await?;

        assert_eq!(registry.stop("nope", true).await, started.timers);
        assert_eq!(registry.pause("nope").await, started.timers);
        assert_eq!(registry.resume(&started.new_timer.id).await, started.timers);
        assert!(fixture.surface.notifications().is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn expired_timer_finishes_once() -> Result<()> {
        let fixture = Fixture::new();
        let registry = fixture.registry().await;
        registry.start(1500).await?;
        let keep = registry.start(4000).await?.new_timer.id;
        assert_eq!(
            fixture.surface.last_badge(),
            Some(Badge {
                text: "2·25m".into(),
                color: Some(RUNNING_BADGE_COLOR),
            })
        );

        fixture.clock.advance_secs(1501);
        registry.refresh_badge().await;
        registry.refresh_badge().await;

        let notifications = fixture.surface.notifications();
        assert_eq!(notifications.len(), 1);
        assert_eq!(notifications[0].title, "Timer Done!");
        assert_eq!(notifications[0].message, "Your 25m timer is up.");
        assert_eq!(fixture.surface.sounds(), 1);
        assert_eq!(registry.list().len(), 1);
        assert_eq!(registry.first().map(|t| t.id), Some(keep));
        assert_eq!(
            fixture.surface.last_badge().map(|b| b.text),
            Some("42m".into())
        );
        Ok(())
    }

    #[tokio::test]
    async fn concurrent_finishes_notify_once() -> Result<()> {
        let fixture = Fixture::new();
        let registry = fixture.registry().await;
        let id = registry.start(10).await?.new_timer.id;

        fixture.clock.advance_secs(10);
        tokio::join!(
            registry.stop(&id, true),
            registry.refresh_badge(),
            registry.stop(&id, true),
        );
        assert_eq!(fixture.surface.notifications().len(), 1);
        assert_eq!(fixture.surface.last_badge(), Some(Badge::cleared()));
        Ok(())
    }

    #[tokio::test]
    async fn concurrent_starts_are_all_persisted() -> Result<()> {
        let fixture = Fixture::new();
        let registry = fixture.registry().await;
        let (a, b, c) = tokio::join!(registry.start(10), registry.start(20), registry.start(30));
        a?;
        b?;
        c?;

        let persisted = fixture.persisted().await;
        assert_eq!(persisted.len(), 3);
        assert_eq!(persisted, registry.list());
        Ok(())
    }

    #[tokio::test]
    async fn out_of_range_durations_are_rejected() -> Result<()> {
        let fixture = Fixture::new();
        let registry = fixture.registry().await;

        assert!(registry.start(599_999_999_999_940).await.is_err());
        assert!(registry.start(u64::MAX).await.is_err());
        assert!(registry.list().is_empty());
        assert!(fixture.alarms.names().is_empty());

        registry.start(60).await?;
        assert_eq!(registry.list().len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn startup_drops_timers_that_expired_while_down() -> Result<()> {
        let fixture = Fixture::new();
        {
            let registry = fixture.registry().await;
            registry.start(60).await?;
            let paused = registry.start(30).await?.new_timer.id;
            registry.pause(&paused).await;
            registry.start(3600).await?;
        }
        let before: Vec<Timer> = fixture.persisted().await;

        fixture.clock.advance_secs(120);
        let alarms = Arc::new(FakeAlarms::default());
        let registry = TimerRegistry::load(
            fixture.store.clone(),
            Arc::new(fixture.clock.clone()),
            alarms.clone(),
            fixture.surface.clone(),
            Duration::seconds(6),
        )
        .await;

        let timers = registry.list();
        assert_eq!(timers, before[1..].to_vec());
        assert_eq!(fixture.persisted().await, timers);
        assert!(fixture.surface.notifications().is_empty());
        assert_eq!(
            alarms.names(),
            vec![AlarmName::timer_end(&timers[1].id), TIMER_UPDATE.to_string()]
        );
        assert_eq!(
            fixture.surface.last_badge().map(|b| b.text),
            Some("2·58m".into())
        );
        Ok(())
    }

    #[tokio::test]
    async fn startup_without_timers_keeps_badge_clear() -> Result<()> {
        let fixture = Fixture::new();
        fixture.store.set_typed(TIMERS_KEY, &Vec::<Timer>::new()).await?;
        let registry = fixture.registry().await;

        assert!(registry.first().is_none());
        assert!(fixture.alarms.names().is_empty());
        assert_eq!(fixture.surface.last_badge(), Some(Badge::cleared()));
        assert!(fixture.store.get(TIMERS_KEY).await?.is_some());
        Ok(())
    }
}
