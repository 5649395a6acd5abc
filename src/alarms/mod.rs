//! Wake alarms. Timers, the heartbeat and the reminder features never sleep themselves: they
//! register a named alarm and react when [AlarmFired] comes back through the host event loop.

pub mod dispatcher;
pub mod reminders;

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use chrono::{DateTime, Duration, Utc};
use tokio::{sync::mpsc, task::JoinHandle};
use tracing::{debug, trace};

use crate::utils::clock::Clock;

pub const TIMER_END_PREFIX: &str = "timerEnd_";
pub const TIMER_UPDATE: &str = "timerUpdate";
pub const HEARTBEAT: &str = "heartbeat";
pub const SCHEDULED_TIMER_PREFIX: &str = "scheduledTimer_";
pub const HYDRATE_REMINDER: &str = "hydrateReminder";
pub const EYEBLINK_REMINDER: &str = "eyeblinkReminder";

/// Every alarm name the host knows how to react to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AlarmName {
    TimerEnd(String),
    TimerUpdate,
    Heartbeat,
    ScheduledTimer(i64),
    HydrateReminder,
    EyeblinkReminder,
    Unknown(String),
}

impl AlarmName {
    pub fn parse(name: &str) -> Self {
        if let Some(id) = name.strip_prefix(TIMER_END_PREFIX) {
            return Self::TimerEnd(id.to_string());
        }
        if let Some(activity_id) = name
            .strip_prefix(SCHEDULED_TIMER_PREFIX)
            .and_then(|id| id.parse().ok())
        {
            return Self::ScheduledTimer(activity_id);
        }
        match name {
            TIMER_UPDATE => Self::TimerUpdate,
            HEARTBEAT => Self::Heartbeat,
            HYDRATE_REMINDER => Self::HydrateReminder,
            EYEBLINK_REMINDER => Self::EyeblinkReminder,
            other => Self::Unknown(other.to_string()),
        }
    }

    pub fn timer_end(timer_id: &str) -> String {
        format!("{TIMER_END_PREFIX}{timer_id}")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlarmSchedule {
    /// Fires once, then removes itself.
    At(DateTime<Utc>),
    /// Fires after `delay` and then every `period`.
    Every { delay: Duration, period: Duration },
}

impl AlarmSchedule {
    /// Periodic alarm whose first firing is one period away.
    pub fn every(period: Duration) -> Self {
        Self::Every {
            delay: period,
            period,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlarmFired {
    pub name: String,
}

/// Interface for abstracting named wake alarms.
pub trait AlarmScheduler: Send + Sync {
    /// Replaces any alarm with the same name.
    fn create(&self, name: &str, schedule: AlarmSchedule);

    /// Returns whether an alarm was removed.
    fn clear(&self, name: &str) -> bool;

    fn exists(&self, name: &str) -> bool;
}

struct AlarmEntry {
    generation: u64,
    task: JoinHandle<()>,
}

#[derive(Default)]
struct AlarmTable {
    entries: HashMap<String, AlarmEntry>,
    next_generation: u64,
}

/// Alarms backed by tokio tasks. Each alarm is one task sleeping on the injected [Clock] and
/// reporting to the channel handed out by [TokioAlarms::new].
pub struct TokioAlarms {
    clock: Arc<dyn Clock>,
    sender: mpsc::Sender<AlarmFired>,
    table: Arc<Mutex<AlarmTable>>,
}

impl TokioAlarms {
    pub fn new(clock: Arc<dyn Clock>, capacity: usize) -> (Self, mpsc::Receiver<AlarmFired>) {
        let (sender, receiver) = mpsc::channel(capacity);
        (
            Self {
                clock,
                sender,
                table: Arc::default(),
            },
            receiver,
        )
    }

    fn spawn(&self, name: String, schedule: AlarmSchedule, generation: u64) -> JoinHandle<()> {
        let clock = self.clock.clone();
        let sender = self.sender.clone();
        let table = self.table.clone();
        tokio::spawn(async move {
            match schedule {
                AlarmSchedule::At(when) => {
                    clock.sleep(non_negative(when - clock.time())).await;
                    {
                        let mut table = lock(&table);
                        if table
                            .entries
                            .get(&name)
                            .is_some_and(|entry| entry.generation == generation)
                        {
                            table.entries.remove(&name);
                        }
                    }
                    trace!("Alarm {name} fired");
                    let _ = sender.send(AlarmFired { name }).await;
                }
                AlarmSchedule::Every { delay, period } => {
                    clock.sleep(non_negative(delay)).await;
                    loop {
                        trace!("Alarm {name} fired");
                        if sender.send(AlarmFired { name: name.clone() }).await.is_err() {
                            break;
                        }
                        clock.sleep(non_negative(period)).await;
                    }
                }
            }
        })
    }
}

fn lock(table: &Mutex<AlarmTable>) -> std::sync::MutexGuard<'_, AlarmTable> {
    table.lock().unwrap_or_else(|e| e.into_inner())
}

fn non_negative(duration: Duration) -> std::time::Duration {
    duration.to_std().unwrap_or_default()
}

impl AlarmScheduler for TokioAlarms {
    fn create(&self, name: &str, schedule: AlarmSchedule) {
        let mut table = lock(&self.table);
        table.next_generation += 1;
        let generation = table.next_generation;
        let task = self.spawn(name.to_string(), schedule, generation);
        if let Some(previous) = table
            .entries
            .insert(name.to_string(), AlarmEntry { generation, task })
        {
            previous.task.abort();
        }
        debug!("Created alarm {name} {schedule:?}");
    }

    fn clear(&self, name: &str) -> bool {
        match lock(&self.table).entries.remove(name) {
            Some(entry) => {
                entry.task.abort();
                debug!("Cleared alarm {name}");
                true
            }
            None => false,
        }
    }

    fn exists(&self, name: &str) -> bool {
        lock(&self.table).entries.contains_key(name)
    }
}

impl Drop for TokioAlarms {
    fn drop(&mut self) {
        for (_, entry) in lock(&self.table).entries.drain() {
            entry.task.abort();
        }
    }
}
