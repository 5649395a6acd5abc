//! The native messaging host. The browser starts it when the extension connects and talks to it
//! over stdin/stdout until the extension disconnects.

pub mod args;
pub mod config;
pub mod framing;
pub mod output;
pub mod protocol;
pub mod requests;
pub mod shutdown;

use std::{path::PathBuf, sync::Arc};

use anyhow::Result;
use config::HostConfig;
use framing::read_frame;
use output::{write_outbound, HostOutput};
use protocol::{Inbound, Outbound, Request};
use requests::RequestHandler;
use tokio::{
    io::{AsyncRead, AsyncWrite},
    sync::{broadcast, mpsc},
    task::JoinSet,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::{
    alarms::{
        dispatcher::AlarmDispatcher, reminders::Reminders, AlarmSchedule, AlarmScheduler,
        TokioAlarms, HEARTBEAT,
    },
    browser::mirror::BrowserMirror,
    storage::{file_store::JsonFileStore, KeyValueStore, StorageChange},
    timers::registry::TimerRegistry,
    tracking::{clock::ActivityClock, router::EventRouter},
    utils::clock::{Clock, DefaultClock},
};

const INBOUND_QUEUE_SIZE: usize = 32;
const OUTBOUND_QUEUE_SIZE: usize = 64;
const ALARM_QUEUE_SIZE: usize = 16;

/// Represents the starting point for the host.
pub async fn start_host(dir: PathBuf, config: HostConfig) -> Result<()> {
    let store = Arc::new(JsonFileStore::open_in(&dir).await?);
    info!("Using store {:?}", store.path());

    let shutdown_token = CancellationToken::new();
    let (_, result) = tokio::join!(
        shutdown::detect_shutdown(shutdown_token.clone()),
        async {
            let result = run_host(
                tokio::io::stdin(),
                tokio::io::stdout(),
                store,
                Arc::new(DefaultClock),
                config,
                shutdown_token.clone(),
            )
            .await;
            shutdown_token.cancel();
            result
        },
    );
    result
}

/// Runs the host until `input` closes or `shutdown` is cancelled. In-flight work is drained
/// before returning, and the activity clock gets a final flush.
pub async fn run_host<R, W>(
    input: R,
    output: W,
    store: Arc<dyn KeyValueStore>,
    clock: Arc<dyn Clock>,
    config: HostConfig,
    shutdown: CancellationToken,
) -> Result<()>
where
    R: AsyncRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (outbound, outbound_receiver) = mpsc::channel(OUTBOUND_QUEUE_SIZE);
    let writer = tokio::spawn(write_outbound(outbound_receiver, output));
    let surface = Arc::new(HostOutput::new(outbound));
    surface
        .send(Outbound::Configure {
            idle_detection_interval: config.idle_detection_secs,
        })
        .await?;

    let (alarms, mut fired) = TokioAlarms::new(clock.clone(), ALARM_QUEUE_SIZE);
    let alarms: Arc<dyn AlarmScheduler> = Arc::new(alarms);
    let mirror = Arc::new(BrowserMirror::new());

    let timers = Arc::new(
        TimerRegistry::load(
            store.clone(),
            clock.clone(),
            alarms.clone(),
            surface.clone(),
            config.tick(),
        )
        .await,
    );
    let (activity, handle) =
        ActivityClock::restore(store.clone(), clock.clone(), config.staleness()).await;
    let activity = tokio::spawn(activity.run());
    // The active tab is re-verified once the extension sends its first tab snapshot.
    let router = EventRouter::new(handle, mirror.clone());
    alarms.create(HEARTBEAT, AlarmSchedule::every(config.heartbeat()));

    let reminders = Arc::new(Reminders::new(
        store.clone(),
        clock.clone(),
        mirror.clone(),
        surface.clone(),
        timers.clone(),
    ));
    let dispatcher = Arc::new(AlarmDispatcher::new(
        timers.clone(),
        router.clone(),
        reminders.clone(),
    ));
    let requests = Arc::new(RequestHandler::new(
        timers,
        alarms.clone(),
        reminders,
        store.clone(),
        clock,
    ));

    let (inbound, mut inbound_receiver) = mpsc::channel(INBOUND_QUEUE_SIZE);
    let reader = tokio::spawn(read_inbound(input, inbound));
    let forwarder = tokio::spawn(forward_changes(store.subscribe(), HostOutput::clone(&surface)));
    info!("Host started");

    let mut tasks = JoinSet::new();
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            message = inbound_receiver.recv() => match message {
                None => {
                    info!("Extension disconnected");
                    break;
                }
                Some(Inbound::Event(event)) => {
                    // Applied in arrival order, before any handler can query it.
                    mirror.apply(&event);
                    let router = router.clone();
                    tasks.spawn(async move {
                        if let Err(e) = router.handle(event).await {
                            error!("Failed to handle browser event {e:?}");
                        }
                    });
                }
                Some(Inbound::Request(Request { request_id, message })) => {
                    let requests = requests.clone();
                    let surface = surface.clone();
                    tasks.spawn(async move {
                        let body = requests.handle(message).await;
                        if let Err(e) = surface.send(Outbound::Response { request_id, body }).await {
                            warn!("Failed to answer request {request_id} {e:?}");
                        }
                    });
                }
            },
            Some(alarm) = fired.recv() => {
                let dispatcher = dispatcher.clone();
                tasks.spawn(async move {
                    if let Err(e) = dispatcher.dispatch(alarm).await {
                        error!("Failed to handle alarm {e:?}");
                    }
                });
            },
            Some(result) = tasks.join_next() => {
                if let Err(e) = result {
                    error!("Task failed {e:?}");
                }
            },
        }
    }

    debug!("Draining {} tasks", tasks.len());
    while let Some(result) = tasks.join_next().await {
        if let Err(e) = result {
            error!("Task failed {e:?}");
        }
    }
    reader.abort();
    drop(alarms);
    drop(requests);
    // Dropping the last clock handles lets the activity clock flush one last time.
    drop(dispatcher);
    drop(router);
    if let Err(e) = activity.await? {
        error!("Activity clock failed {e:?}");
    }

    forwarder.abort();
    drop(surface);
    if let Err(e) = writer.await? {
        warn!("Failed to write to the extension {e:?}");
    }
    info!("Host stopped");
    Ok(())
}

async fn read_inbound<R: AsyncRead + Unpin>(mut input: R, inbound: mpsc::Sender<Inbound>) {
    loop {
        let frame = match read_frame(&mut input).await {
            Ok(Some(frame)) => frame,
            Ok(None) => return,
            Err(e) => {
                error!("Failed to read from the extension {e:?}");
                return;
            }
        };
        match serde_json::from_slice::<Inbound>(&frame) {
            Ok(message) => {
                if inbound.send(message).await.is_err() {
                    return;
                }
            }
            Err(e) => warn!(
                "Skipping malformed message {}: {e}",
                String::from_utf8_lossy(&frame)
            ),
        }
    }
}

/// Mirrors store changes to the extension so its pages can react to them.
async fn forward_changes(mut changes: broadcast::Receiver<StorageChange>, output: HostOutput) {
    loop {
        match changes.recv().await {
            Ok(StorageChange { key, new_value }) => {
                if output
                    .send(Outbound::StorageChanged { key, new_value })
                    .await
                    .is_err()
                {
                    return;
                }
            }
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!("Extension missed {skipped} storage changes");
            }
            Err(broadcast::error::RecvError::Closed) => return,
        }
    }
}
