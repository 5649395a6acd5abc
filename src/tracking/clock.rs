use std::sync::Arc;

use anyhow::{anyhow, Result};
use chrono::{DateTime, Duration, Utc};
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

use crate::{
    domain::{is_sentinel, Domain},
    storage::{
        entities::{stats_key, DailyStats, TrackingState},
        KeyValueStore, StoreExt, TRACKING_STATE_KEY,
    },
    utils::{clock::Clock, time::local_date},
};

const COMMAND_QUEUE_SIZE: usize = 32;

/// Proof that the interval before it was flushed. The only way to switch the tracked domain is
/// to hand one of these to [ActivityClockHandle::set_context], so time can never be attributed
/// to the wrong domain by skipping a flush.
#[derive(Debug)]
pub struct Flushed {
    _private: (),
}

enum ClockCommand {
    Flush(oneshot::Sender<()>),
    SetContext(Option<Domain>, oneshot::Sender<()>),
    Snapshot(oneshot::Sender<TrackingState>),
}

/// Owns the currently tracked domain and the moment it started being tracked. Commands are
/// consumed one at a time from a single queue, so every read-modify-write of a daily bucket
/// finishes before the next one starts.
pub struct ActivityClock {
    receiver: mpsc::Receiver<ClockCommand>,
    store: Arc<dyn KeyValueStore>,
    clock: Arc<dyn Clock>,
    current_domain: Option<Domain>,
    start_time: DateTime<Utc>,
}

/// Cheap handle used by event handlers to talk to the [ActivityClock].
#[derive(Clone)]
pub struct ActivityClockHandle {
    sender: mpsc::Sender<ClockCommand>,
}

impl ActivityClock {
    /// Restores tracking from the persisted state. State older than `staleness` is discarded
    /// because nothing is known about what happened in between.
    pub async fn restore(
        store: Arc<dyn KeyValueStore>,
        clock: Arc<dyn Clock>,
        staleness: Duration,
    ) -> (Self, ActivityClockHandle) {
        let now = clock.time();
        let persisted = store
            .get_typed::<TrackingState>(TRACKING_STATE_KEY)
            .await
            .inspect_err(|e| error!("Failed to read tracking state {e:?}"))
            .ok()
            .flatten();

        let (current_domain, start_time) = match persisted {
            Some(state) if now - state.start_time > staleness => {
                info!(
                    "Discarding stale tracking state from {}",
                    state.start_time
                );
                (None, now)
            }
            Some(state) if state.start_time > now => {
                warn!("Tracking state starts in the future, restarting interval");
                (state.current_domain, now)
            }
            Some(state) => (state.current_domain, state.start_time),
            None => (None, now),
        };
        let current_domain = current_domain.filter(|domain| !is_sentinel(domain));
        debug!("Restored tracking of {current_domain:?} since {start_time}");

        let (sender, receiver) = mpsc::channel(COMMAND_QUEUE_SIZE);
        (
            Self {
                receiver,
                store,
                clock,
                current_domain,
                start_time,
            },
            ActivityClockHandle { sender },
        )
    }

    /// Executes the command loop. Finishes once every handle is dropped, flushing one last time.
    pub async fn run(mut self) -> Result<()> {
        while let Some(command) = self.receiver.recv().await {
            match command {
                ClockCommand::Flush(done) => {
                    self.flush().await;
                    let _ = done.send(());
                }
                ClockCommand::SetContext(domain, done) => {
                    if domain != self.current_domain {
                        debug!("Switching context {:?} -> {domain:?}", self.current_domain);
                    }
                    self.current_domain = domain;
                    self.persist_state().await;
                    let _ = done.send(());
                }
                ClockCommand::Snapshot(reply) => {
                    let _ = reply.send(self.state());
                }
            }
        }

        self.flush().await;
        info!("Activity clock stopped");
        Ok(())
    }

    fn state(&self) -> TrackingState {
        TrackingState {
            current_domain: self.current_domain.clone(),
            start_time: self.start_time,
        }
    }

    async fn flush(&mut self) {
        let now = self.clock.time();
        let elapsed = (now - self.start_time).num_milliseconds() as f64 / 1000.;

        let mut entries = Vec::with_capacity(2);
        if let Some(domain) = self.current_domain.clone() {
            if elapsed > 0. {
                match self.accumulate(&domain, now, elapsed).await {
                    Ok(entry) => entries.push(entry),
                    Err(e) => error!("Dropping {elapsed}s of {domain}: {e:?}"),
                }
            }
        }

        self.start_time = now;
        match serde_json::to_value(self.state()) {
            Ok(state) => entries.push((TRACKING_STATE_KEY.to_string(), state)),
            Err(e) => error!("Failed to serialize tracking state {e:?}"),
        }

        if let Err(e) = self.store.set(entries).await {
            error!("Failed to persist flush {e:?}");
        }
    }

    async fn accumulate(
        &self,
        domain: &Domain,
        now: DateTime<Utc>,
        elapsed: f64,
    ) -> Result<(String, Value)> {
        let key = stats_key(local_date(now));
        let mut stats = self
            .store
            .get_typed::<DailyStats>(&key)
            .await?
            .unwrap_or_default();
        *stats.entry(domain.to_string()).or_insert(0.) += elapsed;
        debug!("Added {elapsed}s to {domain} in {key}");
        Ok((key, serde_json::to_value(stats)?))
    }

    async fn persist_state(&self) {
        if let Err(e) = self.store.set_typed(TRACKING_STATE_KEY, &self.state()).await {
            error!("Failed to persist tracking state {e:?}");
        }
    }
}

impl ActivityClockHandle {
    /// Accumulates the time since the last flush into today's bucket and restarts the interval.
    pub async fn flush(&self) -> Result<Flushed> {
        let (done, wait) = oneshot::channel();
        self.send(ClockCommand::Flush(done)).await?;
        wait.await?;
        Ok(Flushed { _private: () })
    }

    pub async fn set_context(&self, _flushed: Flushed, domain: Option<Domain>) -> Result<()> {
        let (done, wait) = oneshot::channel();
        self.send(ClockCommand::SetContext(domain, done)).await?;
        wait.await?;
        Ok(())
    }

    pub async fn snapshot(&self) -> Result<TrackingState> {
        let (reply, wait) = oneshot::channel();
        self.send(ClockCommand::Snapshot(reply)).await?;
        Ok(wait.await?)
    }

    async fn send(&self, command: ClockCommand) -> Result<()> {
        self.sender
            .send(command)
            .await
            .map_err(|_| anyhow!("Activity clock is not running"))
    }
}
