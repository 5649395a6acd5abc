use anyhow::{anyhow, Result};
use async_trait::async_trait;
use tokio::{io::AsyncWrite, sync::mpsc};
use tracing::{error, trace, warn};

use crate::{
    browser::TabId,
    surface::{Badge, Notification, Surface},
};

use super::{
    framing::{write_frame, MAX_OUTBOUND_FRAME},
    protocol::Outbound,
};

/// Queues messages for the extension. Every side effect the host produces leaves through here.
#[derive(Clone)]
pub struct HostOutput {
    sender: mpsc::Sender<Outbound>,
}

impl HostOutput {
    pub fn new(sender: mpsc::Sender<Outbound>) -> Self {
        Self { sender }
    }

    pub async fn send(&self, message: Outbound) -> Result<()> {
        self.sender
            .send(message)
            .await
            .map_err(|_| anyhow!("Extension output is closed"))
    }

    async fn send_logged(&self, message: Outbound) {
        if let Err(e) = self.send(message).await {
            warn!("Dropping message {e:?}");
        }
    }
}

#[async_trait]
impl Surface for HostOutput {
    async fn set_badge(&self, badge: Badge) {
        self.send_logged(Outbound::Badge {
            text: badge.text,
            color: badge.color.map(String::from),
        })
        .await;
    }

    async fn notify(&self, notification: Notification) -> Result<String> {
        let id = notification.id.clone();
        self.send(Outbound::Notification {
            id: notification.id,
            title: notification.title,
            message: notification.message,
        })
        .await?;
        Ok(id)
    }

    async fn play_sound(&self) {
        self.send_logged(Outbound::PlaySound).await;
    }

    async fn show_eye_blink_overlay(&self, tab_id: TabId) {
        self.send_logged(Outbound::ShowEyeBlinkOverlay { tab_id })
            .await;
    }
}

/// Writes queued messages as frames until every [HostOutput] is dropped. Messages that can't be
/// framed are skipped; a broken pipe ends the loop.
pub async fn write_outbound<W: AsyncWrite + Unpin>(
    mut receiver: mpsc::Receiver<Outbound>,
    mut writer: W,
) -> Result<()> {
    while let Some(message) = receiver.recv().await {
        trace!("Sending {message:?}");
        let payload = match serde_json::to_vec(&message) {
            Ok(payload) => payload,
            Err(e) => {
                error!("Failed to serialize {message:?}: {e:?}");
                continue;
            }
        };
        if let Err(e) = write_frame(&mut writer, &payload).await {
            if payload.len() > MAX_OUTBOUND_FRAME {
                error!("Skipping message {e:?}");
                continue;
            }
            receiver.close();
            return Err(e);
        }
    }
    Ok(())
}
