use std::sync::Arc;

use anyhow::Result;
use tracing::{debug, instrument, warn};

use crate::{
    browser::{focused_window, Browser, BrowserEvent, IdleState, TabId, WindowId, WindowTarget},
    domain::{resolve, Domain},
};

use super::clock::ActivityClockHandle;

/// Translates browser signals into activity clock transitions. Every transition flushes first:
/// the clock only accepts a new context together with the receipt of that flush.
#[derive(Clone)]
pub struct EventRouter {
    clock: ActivityClockHandle,
    browser: Arc<dyn Browser>,
}

impl EventRouter {
    pub fn new(clock: ActivityClockHandle, browser: Arc<dyn Browser>) -> Self {
        Self { clock, browser }
    }

    #[instrument(skip(self))]
    pub async fn handle(&self, event: BrowserEvent) -> Result<()> {
        match event {
            BrowserEvent::TabActivated { tab_id, .. } => self.on_tab_activated(tab_id).await,
            BrowserEvent::TabUpdated {
                tab_id,
                url: Some(url),
                ..
            } => self.on_tab_url_changed(tab_id, &url).await,
            BrowserEvent::TabUpdated { url: None, .. } | BrowserEvent::TabRemoved { .. } => Ok(()),
            BrowserEvent::WindowFocusChanged { window_id } => {
                self.on_focus_changed(focused_window(window_id)).await
            }
            BrowserEvent::IdleStateChanged { state } => self.on_idle_state_changed(state).await,
            BrowserEvent::TabsSnapshot { .. } => self.verify_active_tab().await,
        }
    }

    async fn on_tab_activated(&self, tab_id: TabId) -> Result<()> {
        let flushed = self.clock.flush().await?;
        let domain = match self.browser.tab(tab_id).await {
            Ok(tab) => tab.url.as_deref().and_then(resolve),
            Err(e) => {
                warn!("Activated tab {tab_id} is unknown, not tracking it: {e:?}");
                None
            }
        };
        self.clock.set_context(flushed, domain).await
    }

    async fn on_tab_url_changed(&self, tab_id: TabId, url: &str) -> Result<()> {
        let active = self.browser.active_tab(WindowTarget::Current).await?;
        if active.map(|tab| tab.id) != Some(tab_id) {
            debug!("Ignoring navigation in background tab {tab_id}");
            return Ok(());
        }
        let flushed = self.clock.flush().await?;
        self.clock.set_context(flushed, resolve(url)).await
    }

    async fn on_focus_changed(&self, window_id: Option<WindowId>) -> Result<()> {
        let flushed = self.clock.flush().await?;
        let domain = match window_id {
            None => None,
            Some(window_id) => self.active_domain(WindowTarget::Id(window_id)).await?,
        };
        self.clock.set_context(flushed, domain).await
    }

    /// Idle transitions take effect at the moment the event is delivered.
    async fn on_idle_state_changed(&self, state: IdleState) -> Result<()> {
        let flushed = self.clock.flush().await?;
        let domain = match state {
            IdleState::Active => self.active_domain(WindowTarget::Current).await?,
            IdleState::Idle | IdleState::Locked => None,
        };
        self.clock.set_context(flushed, domain).await
    }

    /// Periodic fallback for when no discrete event fires. Also catches focus loss that the
    /// focus events missed: no focused window is treated like going idle.
    #[instrument(skip(self))]
    pub async fn heartbeat(&self) -> Result<()> {
        match self.browser.focused_window().await {
            Ok(Some(_)) => {
                self.clock.flush().await?;
            }
            Ok(None) => {
                let flushed = self.clock.flush().await?;
                self.clock.set_context(flushed, None).await?;
            }
            Err(e) => warn!("Skipping heartbeat, focus is unknown: {e:?}"),
        }
        Ok(())
    }

    /// Re-resolves the active tab and switches to it when the clock disagrees. Covers the browser
    /// being closed or restarted while a different tab was active.
    #[instrument(skip(self))]
    pub async fn verify_active_tab(&self) -> Result<()> {
        let tracked = self.clock.snapshot().await?.current_domain;
        let actual = self.active_domain(WindowTarget::Current).await?;
        if tracked != actual {
            debug!("Tracked {tracked:?} but {actual:?} is active");
            let flushed = self.clock.flush().await?;
            self.clock.set_context(flushed, actual).await?;
        }
        Ok(())
    }

    async fn active_domain(&self, window: WindowTarget) -> Result<Option<Domain>> {
        Ok(self
            .browser
            .active_tab(window)
            .await?
            .and_then(|tab| tab.url)
            .and_then(|url| resolve(&url)))
    }
}
