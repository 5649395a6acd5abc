use std::sync::Arc;

use anyhow::Result;
use tracing::{instrument, warn};

use crate::{timers::registry::TimerRegistry, tracking::router::EventRouter};

use super::{reminders::Reminders, AlarmFired, AlarmName};

/// Routes fired alarms to whoever registered them.
pub struct AlarmDispatcher {
    timers: Arc<TimerRegistry>,
    router: EventRouter,
    reminders: Arc<Reminders>,
}

impl AlarmDispatcher {
    pub fn new(timers: Arc<TimerRegistry>, router: EventRouter, reminders: Arc<Reminders>) -> Self {
        Self {
            timers,
            router,
            reminders,
        }
    }

    #[instrument(skip(self))]
    pub async fn dispatch(&self, fired: AlarmFired) -> Result<()> {
        match AlarmName::parse(&fired.name) {
            AlarmName::TimerEnd(timer_id) => {
                self.timers.stop(&timer_id, true).await;
            }
            AlarmName::TimerUpdate => self.timers.refresh_badge().await,
            AlarmName::Heartbeat => self.router.heartbeat().await?,
            AlarmName::ScheduledTimer(activity_id) => {
                self.reminders.start_scheduled(activity_id).await?
            }
            AlarmName::HydrateReminder => self.reminders.hydrate().await?,
            AlarmName::EyeblinkReminder => self.reminders.eye_blink().await?,
            AlarmName::Unknown(name) => warn!("Ignoring unknown alarm {name}"),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use anyhow::Result;
    use chrono::Duration;

    use crate::{
        alarms::{
            reminders::Reminders, testing::FakeAlarms, AlarmFired, AlarmName, AlarmScheduler,
        },
        browser::MockBrowser,
        domain::Domain,
        storage::memory::MemoryStore,
        surface::{testing::RecordingSurface, Badge},
        timers::registry::TimerRegistry,
        tracking::{clock::ActivityClock, router::EventRouter},
        utils::{clock::testing::ManualClock, logging::TEST_LOGGING},
    };

    use super::AlarmDispatcher;

    fn fired(name: &str) -> AlarmFired {
        AlarmFired { name: name.into() }
    }

    #[tokio::test]
    async fn routes_alarms_to_their_owners() -> Result<()> {
        *TEST_LOGGING;
        let store = Arc::new(MemoryStore::new());
        let clock = ManualClock::new();
        let alarms = Arc::new(FakeAlarms::default());
        let surface = Arc::new(RecordingSurface::default());
        let mut browser = MockBrowser::new();
        browser.expect_focused_window().times(1).returning(|| Ok(None));
        let browser = Arc::new(browser);

        let (activity, handle) = ActivityClock::restore(
            store.clone(),
            Arc::new(clock.clone()),
            Duration::minutes(5),
        )
        .await;
        tokio::spawn(activity.run());
        let flushed = handle.flush().await?;
        handle.set_context(flushed, Domain::new("docs.rs")).await?;

        let timers = Arc::new(
            TimerRegistry::load(
                store.clone(),
                Arc::new(clock.clone()),
                alarms.clone(),
                surface.clone(),
                Duration::seconds(6),
            )
            .await,
        );
        let reminders = Arc::new(Reminders::new(
            store.clone(),
            Arc::new(clock.clone()),
            browser.clone(),
            surface.clone(),
            timers.clone(),
        ));
        let dispatcher = AlarmDispatcher::new(
            timers.clone(),
            EventRouter::new(handle.clone(), browser),
            reminders,
        );

        let id = timers.start(120).await?.new_timer.id;
        clock.advance_secs(50);
        dispatcher.dispatch(fired("timerUpdate")).await?;
        assert_eq!(surface.last_badge().map(|b| b.text), Some("2m".into()));

        dispatcher
            .dispatch(fired(&AlarmName::timer_end(&id)))
            .await?;
        assert!(timers.list().is_empty());
        assert_eq!(surface.notifications().len(), 1);
        assert_eq!(surface.last_badge(), Some(Badge::cleared()));
        assert!(alarms.names().is_empty());

        dispatcher.dispatch(fired("heartbeat")).await?;
        assert_eq!(handle.snapshot().await?.current_domain, None);

        dispatcher.dispatch(fired("somethingElse")).await?;
        dispatcher.dispatch(fired("scheduledTimer_3")).await?;
        assert!(timers.list().is_empty());
        assert!(!alarms.exists("timerUpdate"));
        Ok(())
    }
}
