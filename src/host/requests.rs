use std::{collections::BTreeMap, sync::Arc};

use anyhow::{bail, Result};
use chrono::{DateTime, Duration, Utc};
use serde_json::{json, Value};
use tracing::{instrument, warn};

use crate::{
    alarms::{reminders::Reminders, AlarmSchedule, AlarmScheduler},
    storage::{is_host_managed, KeyValueStore},
    timers::registry::TimerRegistry,
    utils::clock::Clock,
};

use super::protocol::{ActionRequest, PopupMessage, StorageKeys, TestRequest};

/// Answers popup requests. Every request gets a JSON body back, failures included.
pub struct RequestHandler {
    timers: Arc<TimerRegistry>,
    alarms: Arc<dyn AlarmScheduler>,
    reminders: Arc<Reminders>,
    store: Arc<dyn KeyValueStore>,
    clock: Arc<dyn Clock>,
}

impl RequestHandler {
    pub fn new(
        timers: Arc<TimerRegistry>,
        alarms: Arc<dyn AlarmScheduler>,
        reminders: Arc<Reminders>,
        store: Arc<dyn KeyValueStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            timers,
            alarms,
            reminders,
            store,
            clock,
        }
    }

    /// Answers a message as it came off the wire. Messages that aren't a known request are
    /// answered with an error body.
    pub async fn handle(&self, message: Value) -> Value {
        match serde_json::from_value::<PopupMessage>(message) {
            Ok(message) => self.answer(message).await,
            Err(e) => {
                warn!("Unsupported request {e}");
                failure(format!("Unsupported request: {e}"))
            }
        }
    }

    #[instrument(skip(self))]
    pub async fn answer(&self, message: PopupMessage) -> Value {
        let result = match message {
            PopupMessage::Action(action) => self.handle_action(action).await,
            PopupMessage::Test(test) => Ok(self.handle_test(test).await),
        };
        result.unwrap_or_else(|e| {
            warn!("Request failed {e:?}");
            failure(e)
        })
    }

    async fn handle_action(&self, action: ActionRequest) -> Result<Value> {
        let body = match action {
            ActionRequest::GetTimers => serde_json::to_value(self.timers.list())?,
            ActionRequest::StartTimer { duration } => {
                serde_json::to_value(self.timers.start(duration).await?)?
            }
            ActionRequest::StopTimer { timer_id } => {
                serde_json::to_value(self.timers.stop(&timer_id, false).await)?
            }
            ActionRequest::PauseTimer { timer_id } => {
                serde_json::to_value(self.timers.pause(&timer_id).await)?
            }
            ActionRequest::ResumeTimer { timer_id } => {
                serde_json::to_value(self.timers.resume(&timer_id).await)?
            }
            ActionRequest::GetTimer => match self.timers.first() {
                Some(timer) => serde_json::to_value(timer)?,
                None => json!({ "status": "stopped" }),
            },
            ActionRequest::CreateAlarm {
                name,
                when,
                delay_in_minutes,
                period_in_minutes,
            } => {
                let schedule = self.schedule(when, delay_in_minutes, period_in_minutes)?;
                self.alarms.create(&name, schedule);
                json!({ "success": true })
            }
            ActionRequest::ClearAlarm { name } => json!({ "success": self.alarms.clear(&name) }),
            ActionRequest::GetAlarm { name } => json!({ "exists": self.alarms.exists(&name) }),
            ActionRequest::GetStorage { keys } => serde_json::to_value(self.read(keys).await?)?,
            ActionRequest::SetStorage { items } => {
                if let Some(key) = items.keys().find(|key| is_host_managed(key)) {
                    bail!("{key} is managed by the host");
                }
                self.store.set(items.into_iter().collect()).await?;
                json!({ "success": true })
            }
            ActionRequest::RemoveStorage { keys } => {
                let keys = keys.into_vec();
                if let Some(key) = keys.iter().find(|key| is_host_managed(key)) {
                    bail!("{key} is managed by the host");
                }
                for key in keys {
                    self.store.remove(&key).await?;
                }
                json!({ "success": true })
            }
        };
        Ok(body)
    }

    async fn handle_test(&self, test: TestRequest) -> Value {
        match test {
            TestRequest::TestHydrateNotification => match self.reminders.test_hydrate().await {
                Ok(id) => json!({ "success": true, "id": id }),
                Err(e) => failure(e),
            },
            TestRequest::TestEyeBlinkNotification => match self.reminders.show_eye_blink().await
            {
                Ok(()) => json!({ "success": true }),
                Err(e) => failure(e),
            },
        }
    }

    /// Missing keys are left out of the result.
    async fn read(&self, keys: Option<StorageKeys>) -> Result<BTreeMap<String, Value>> {
        let Some(keys) = keys else {
            return self.store.get_all().await;
        };
        let mut values = BTreeMap::new();
        for key in keys.into_vec() {
            if let Some(value) = self.store.get(&key).await? {
                values.insert(key, value);
            }
        }
        Ok(values)
    }

    fn schedule(
        &self,
        when: Option<f64>,
        delay_in_minutes: Option<f64>,
        period_in_minutes: Option<f64>,
    ) -> Result<AlarmSchedule> {
        let now = self.clock.time();
        let schedule = match (when, delay_in_minutes, period_in_minutes) {
            (_, delay, Some(period)) => {
                let period = minutes(period)?;
                AlarmSchedule::Every {
                    delay: delay.map(minutes).transpose()?.unwrap_or(period),
                    period,
                }
            }
            (Some(when), _, None) => AlarmSchedule::At(epoch_millis(when)?),
            (None, Some(delay), None) => match now.checked_add_signed(minutes(delay)?) {
                Some(when) => AlarmSchedule::At(when),
                None => bail!("Alarm delay of {delay} minutes is out of range"),
            },
            (None, None, None) => bail!("Alarm needs a time, a delay or a period"),
        };
        Ok(schedule)
    }
}

fn failure(error: impl std::fmt::Display) -> Value {
    json!({ "success": false, "error": error.to_string() })
}

fn minutes(value: f64) -> Result<Duration> {
    if !value.is_finite() || value <= 0. {
        bail!("{value} is not a valid number of minutes");
    }
    let millis = value * 60_000.;
    if millis >= i64::MAX as f64 {
        bail!("{value} minutes is out of range");
    }
    match Duration::try_milliseconds(millis as i64) {
        Some(duration) => Ok(duration),
        None => bail!("{value} minutes is out of range"),
    }
}

fn epoch_millis(value: f64) -> Result<DateTime<Utc>> {
    if !value.is_finite() {
        bail!("Alarm time {value} is not a number");
    }
    let rounded = value.round();
    if rounded.abs() >= i64::MAX as f64 {
        bail!("Alarm time {value} is out of range");
    }
    match DateTime::from_timestamp_millis(rounded as i64) {
        Some(when) => Ok(when),
        None => bail!("Alarm time {value} is out of range"),
    }
}
