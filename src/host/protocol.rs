//! Messages exchanged with the extension.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::browser::{BrowserEvent, TabId};

pub type RequestId = u64;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "kind", content = "payload", rename_all = "camelCase")]
pub enum Inbound {
    Event(BrowserEvent),
    Request(Request),
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Request {
    pub request_id: RequestId,
    /// Kept raw so a message that doesn't parse can still be answered.
    pub message: Value,
}

/// The popup talks in two dialects: timer and alarm requests are keyed by `action`, the
/// reminder test buttons by `type`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum PopupMessage {
    Action(ActionRequest),
    Test(TestRequest),
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(
    tag = "action",
    rename_all = "camelCase",
    rename_all_fields = "camelCase"
)]
pub enum ActionRequest {
    GetTimers,
    StartTimer {
        duration: u64,
    },
    StopTimer {
        timer_id: String,
    },
    PauseTimer {
        timer_id: String,
    },
    ResumeTimer {
        timer_id: String,
    },
    /// Single timer view of older popups.
    GetTimer,
    CreateAlarm {
        name: String,
        /// Epoch milliseconds, possibly fractional.
        #[serde(default)]
        when: Option<f64>,
        #[serde(default)]
        delay_in_minutes: Option<f64>,
        #[serde(default)]
        period_in_minutes: Option<f64>,
    },
    ClearAlarm {
        name: String,
    },
    GetAlarm {
        name: String,
    },
    /// Reads the given keys, or everything when `keys` is missing or null.
    GetStorage {
        #[serde(default)]
        keys: Option<StorageKeys>,
    },
    SetStorage {
        items: Map<String, Value>,
    },
    RemoveStorage {
        keys: StorageKeys,
    },
}

/// A single key or a list of them.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum StorageKeys {
    One(String),
    Many(Vec<String>),
}

impl StorageKeys {
    pub fn into_vec(self) -> Vec<String> {
        match self {
            StorageKeys::One(key) => vec![key],
            StorageKeys::Many(keys) => keys,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum TestRequest {
    TestHydrateNotification,
    TestEyeBlinkNotification,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(
    tag = "type",
    rename_all = "camelCase",
    rename_all_fields = "camelCase"
)]
pub enum Outbound {
    Response {
        request_id: RequestId,
        body: Value,
    },
    Badge {
        text: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        color: Option<String>,
    },
    Notification {
        id: String,
        title: String,
        message: String,
    },
    PlaySound,
    ShowEyeBlinkOverlay {
        tab_id: TabId,
    },
    StorageChanged {
        key: String,
        new_value: Option<Value>,
    },
    /// Sent once at startup so the extension polls idle state at the host's interval.
    Configure {
        idle_detection_interval: u64,
    },
}
