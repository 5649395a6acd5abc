//! Contains the contract for querying browser tabs and windows. The host answers these queries
//! from [mirror::BrowserMirror], which is fed by the events the extension forwards.

pub mod mirror;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub type TabId = i64;
pub type WindowId = i64;

/// Value browsers use for "no window has focus".
pub const WINDOW_ID_NONE: WindowId = -1;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tab {
    pub id: TabId,
    pub window_id: WindowId,
    /// Missing for tabs the extension isn't allowed to inspect.
    pub url: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IdleState {
    Active,
    Idle,
    Locked,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowTarget {
    /// The window the user interacted with last.
    Current,
    Id(WindowId),
}

/// A tab as reported in a full state snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TabSnapshot {
    pub id: TabId,
    pub window_id: WindowId,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub active: bool,
}

/// Signals the extension forwards from the browser.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    tag = "event",
    rename_all = "camelCase",
    rename_all_fields = "camelCase"
)]
pub enum BrowserEvent {
    TabActivated {
        tab_id: TabId,
        window_id: WindowId,
        #[serde(default)]
        url: Option<String>,
    },
    /// `url` is only present when the navigation changed it.
    TabUpdated {
        tab_id: TabId,
        window_id: WindowId,
        #[serde(default)]
        url: Option<String>,
    },
    TabRemoved {
        tab_id: TabId,
    },
    WindowFocusChanged {
        window_id: Option<WindowId>,
    },
    IdleStateChanged {
        state: IdleState,
    },
    /// Full state, sent by the extension whenever it (re)connects.
    TabsSnapshot {
        tabs: Vec<TabSnapshot>,
        #[serde(default)]
        focused_window_id: Option<WindowId>,
    },
}

/// Treats both `null` and [WINDOW_ID_NONE] as "no focused window".
pub fn focused_window(window_id: Option<WindowId>) -> Option<WindowId> {
    window_id.filter(|id| *id != WINDOW_ID_NONE)
}

/// Intended to serve as a contract the live browser state must implement.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Browser: Send + Sync {
    async fn tab(&self, tab_id: TabId) -> Result<Tab>;

    async fn active_tab(&self, window: WindowTarget) -> Result<Option<Tab>>;

    /// `None` when no browser window has focus.
    async fn focused_window(&self) -> Result<Option<WindowId>>;
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{focused_window, BrowserEvent, IdleState};

    #[test]
    fn parses_extension_events() {
        let event: BrowserEvent = serde_json::from_value(json!({
            "event": "tabUpdated",
            "tabId": 4,
            "windowId": 1,
            "url": "https://docs.rs/tokio",
        }))
        .unwrap();
        assert_eq!(
            event,
            BrowserEvent::TabUpdated {
                tab_id: 4,
                window_id: 1,
                url: Some("https://docs.rs/tokio".into()),
            }
        );

        let event: BrowserEvent =
            serde_json::from_value(json!({ "event": "idleStateChanged", "state": "locked" }))
                .unwrap();
        assert_eq!(
            event,
            BrowserEvent::IdleStateChanged {
                state: IdleState::Locked
            }
        );
    }

    #[test]
    fn no_window_has_two_spellings() {
        assert_eq!(focused_window(None), None);
        assert_eq!(focused_window(Some(-1)), None);
        assert_eq!(focused_window(Some(3)), Some(3));
    }
}
