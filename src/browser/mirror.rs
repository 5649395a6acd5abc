use std::{collections::HashMap, sync::Mutex};

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use tracing::trace;

use super::{focused_window, Browser, BrowserEvent, Tab, TabId, WindowId, WindowTarget};

#[derive(Default, Debug)]
struct MirrorState {
    tabs: HashMap<TabId, Tab>,
    active: HashMap<WindowId, TabId>,
    focused: Option<WindowId>,
    /// Last window that had focus. Stays set while the browser is in the background.
    current: Option<WindowId>,
}

impl MirrorState {
    fn upsert(&mut self, tab_id: TabId, window_id: WindowId, url: Option<String>) {
        let tab = self.tabs.entry(tab_id).or_insert_with(|| Tab {
            id: tab_id,
            window_id,
            url: None,
        });
        tab.window_id = window_id;
        if url.is_some() {
            tab.url = url;
        }
    }

    fn current_window(&self) -> Option<WindowId> {
        self.current.or_else(|| self.active.keys().min().copied())
    }
}

/// In-memory model of the browser's tabs and windows, kept up to date from forwarded events. The
/// host applies each event here before handling it, so queries made while handling an event
/// already see its effect.
#[derive(Default)]
pub struct BrowserMirror {
    state: Mutex<MirrorState>,
}

impl BrowserMirror {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn apply(&self, event: &BrowserEvent) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        match event {
            BrowserEvent::TabActivated {
                tab_id,
                window_id,
                url,
            } => {
                state.upsert(*tab_id, *window_id, url.clone());
                state.active.insert(*window_id, *tab_id);
                if state.current.is_none() {
                    state.current = Some(*window_id);
                }
            }
            BrowserEvent::TabUpdated {
                tab_id,
                window_id,
                url,
            } => state.upsert(*tab_id, *window_id, url.clone()),
            BrowserEvent::TabRemoved { tab_id } => {
                state.tabs.remove(tab_id);
                state.active.retain(|_, active| active != tab_id);
            }
            BrowserEvent::WindowFocusChanged { window_id } => {
                state.focused = focused_window(*window_id);
                if state.focused.is_some() {
                    state.current = state.focused;
                }
            }
            BrowserEvent::IdleStateChanged { .. } => {}
            BrowserEvent::TabsSnapshot {
                tabs,
                focused_window_id,
            } => {
                let mut fresh = MirrorState {
                    focused: focused_window(*focused_window_id),
                    ..MirrorState::default()
                };
                fresh.current = fresh.focused;
                for tab in tabs {
                    fresh.upsert(tab.id, tab.window_id, tab.url.clone());
                    if tab.active {
                        fresh.active.insert(tab.window_id, tab.id);
                    }
                }
                *state = fresh;
            }
        }
        trace!("Browser mirror after {event:?}: {state:?}");
    }
}

#[async_trait]
impl Browser for BrowserMirror {
    async fn tab(&self, tab_id: TabId) -> Result<Tab> {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state
            .tabs
            .get(&tab_id)
            .cloned()
            .ok_or_else(|| anyhow!("No tab with id {tab_id}"))
    }

    async fn active_tab(&self, window: WindowTarget) -> Result<Option<Tab>> {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        let window = match window {
            WindowTarget::Current => state.current_window(),
            WindowTarget::Id(id) => Some(id),
        };
        Ok(window
            .and_then(|window| state.active.get(&window))
            .and_then(|tab_id| state.tabs.get(tab_id))
            .cloned())
    }

    async fn focused_window(&self) -> Result<Option<WindowId>> {
        Ok(self.state.lock().unwrap_or_else(|e| e.into_inner()).focused)
    }
}
