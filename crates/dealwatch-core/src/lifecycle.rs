//! App lifecycle gate.
//!
//! The host pushes OS foreground/background transitions into a
//! [`LifecycleGate`]. Poller runners subscribe to it to start and cancel
//! their timers, and re-read [`LifecycleGate::is_active`] before each tick
//! since a transition can race with a timer firing.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AppState {
    Active,
    Background,
}

impl AppState {
    /// Map an OS lifecycle label. Anything other than `"active"` counts as background.
    pub fn from_os_label(label: &str) -> Self {
        if label.eq_ignore_ascii_case("active") {
            AppState::Active
        } else {
            AppState::Background
        }
    }
}

/// Shared current app state with change notification.
#[derive(Debug, Clone)]
pub struct LifecycleGate {
    tx: Arc<watch::Sender<AppState>>,
}

impl LifecycleGate {
    pub fn new(initial: AppState) -> Self {
        let (tx, _rx) = watch::channel(initial);
        Self { tx: Arc::new(tx) }
    }

    pub fn current(&self) -> AppState {
        *self.tx.borrow()
    }

    pub fn is_active(&self) -> bool {
        self.current() == AppState::Active
    }

    /// Record a transition. Returns `true` if the state actually changed.
    pub fn set(&self, state: AppState) -> bool {
        let changed = self.tx.send_if_modified(|current| {
            if *current == state {
                false
            } else {
                *current = state;
                true
            }
        });
        if changed {
            info!(?state, "app lifecycle changed");
        }
        changed
    }

    /// Receiver that observes every subsequent transition.
    pub fn subscribe(&self) -> watch::Receiver<AppState> {
        self.tx.subscribe()
    }
}

impl Default for LifecycleGate {
    fn default() -> Self {
        Self::new(AppState::Active)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn os_labels() {
        assert_eq!(AppState::from_os_label("active"), AppState::Active);
        assert_eq!(AppState::from_os_label("inactive"), AppState::Background);
        assert_eq!(AppState::from_os_label("background"), AppState::Background);
    }

    #[test]
    fn set_reports_changes_only() {
        let gate = LifecycleGate::new(AppState::Background);
        assert!(!gate.is_active());
        assert!(gate.set(AppState::Active));
        assert!(!gate.set(AppState::Active));
        assert!(gate.is_active());
    }

    #[tokio::test]
    async fn subscribers_see_transitions() {
        let gate = LifecycleGate::new(AppState::Active);
        let mut rx = gate.subscribe();
        gate.set(AppState::Background);
        rx.changed().await.unwrap();
        assert_eq!(*rx.borrow_and_update(), AppState::Background);
    }
}
