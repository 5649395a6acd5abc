//! User facing side effects. The host forwards them to the extension, which owns the actual
//! notification, badge and overlay APIs.

use async_trait::async_trait;

use crate::browser::TabId;

pub const RUNNING_BADGE_COLOR: &str = "#f38ba8";
pub const PAUSED_BADGE_COLOR: &str = "#fab387";

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Badge {
    /// Empty clears the badge.
    pub text: String,
    pub color: Option<&'static str>,
}

impl Badge {
    pub fn cleared() -> Self {
        Self::default()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub id: String,
    pub title: String,
    pub message: String,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Surface: Send + Sync {
    async fn set_badge(&self, badge: Badge);

    /// Returns the id the notification was shown with.
    async fn notify(&self, notification: Notification) -> anyhow::Result<String>;

    async fn play_sound(&self);

    async fn show_eye_blink_overlay(&self, tab_id: TabId);
}

#[cfg(test)]
pub mod testing {
    use std::sync::Mutex;

    use async_trait::async_trait;

    use crate::browser::TabId;

    use super::{Badge, Notification, Surface};

    /// Remembers every side effect in order.
    #[derive(Default)]
    pub struct RecordingSurface {
        pub badges: Mutex<Vec<Badge>>,
        pub notifications: Mutex<Vec<Notification>>,
        pub sounds: Mutex<usize>,
        pub overlays: Mutex<Vec<TabId>>,
    }

    impl RecordingSurface {
        pub fn last_badge(&self) -> Option<Badge> {
            self.badges.lock().unwrap().last().cloned()
        }

        pub fn notifications(&self) -> Vec<Notification> {
            self.notifications.lock().unwrap().clone()
        }

        pub fn sounds(&self) -> usize {
            *self.sounds.lock().unwrap()
        }

        pub fn overlays(&self) -> Vec<TabId> {
            self.overlays.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Surface for RecordingSurface {
        async fn set_badge(&self, badge: Badge) {
            self.badges.lock().unwrap().push(badge);
        }

        async fn notify(&self, notification: Notification) -> anyhow::Result<String> {
            let id = notification.id.clone();
            self.notifications.lock().unwrap().push(notification);
            Ok(id)
        }

        async fn play_sound(&self) {
            *self.sounds.lock().unwrap() += 1;
        }

        async fn show_eye_blink_overlay(&self, tab_id: TabId) {
            self.overlays.lock().unwrap().push(tab_id);
        }
    }
}
