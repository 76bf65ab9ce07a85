//! Tracking engine: wires the lifecycle gate, both pollers and their runners.
//!
//! ## Usage
//!
//! ```ignore
//! let store = open_tracking_store(&config)?;
//! let (engine, mut events) = TrackingEngine::start(&config, collaborators, store, AppState::Active);
//! engine.vouchers().register(42, 7, 3, VoucherStatus::Pending);
//! engine.set_app_state(AppState::Background);
//! engine.shutdown().await;
//! ```

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::collaborators::Collaborators;
use crate::error::Result;
use crate::events::Event;
use crate::lifecycle::{AppState, LifecycleGate};
use crate::notify::NotificationDispatcher;
use crate::proximity::ProximityPoller;
use crate::scheduler::PollerRunner;
use crate::storage::{EngineConfig, SqliteStore, TrackingStore};
use crate::vouchers::VoucherStatusPoller;

/// Open the tracking store at the configured database path.
pub fn open_tracking_store(config: &EngineConfig) -> Result<TrackingStore> {
    let path = config.database_path()?;
    let kv = SqliteStore::open(&path)?;
    Ok(TrackingStore::new(Arc::new(kv)))
}

/// Running tracking engine.
pub struct TrackingEngine {
    gate: LifecycleGate,
    proximity: ProximityPoller,
    vouchers: VoucherStatusPoller,
    cancel: CancellationToken,
    handles: Vec<JoinHandle<()>>,
}

impl TrackingEngine {
    /// Build both pollers and spawn their runners on the current runtime.
    ///
    /// Returns the engine and the stream of outward-facing events.
    pub fn start(
        config: &EngineConfig,
        collaborators: Collaborators,
        store: TrackingStore,
        initial: AppState,
    ) -> (Self, mpsc::UnboundedReceiver<Event>) {
        let gate = LifecycleGate::new(initial);
        let dispatcher =
            NotificationDispatcher::new(collaborators.notifications.clone(), collaborators.user_id);

        let proximity = ProximityPoller::new(
            config.proximity.clone(),
            collaborators.catalog.clone(),
            collaborators.tiers.clone(),
            collaborators.preferences.clone(),
            collaborators.location.clone(),
            dispatcher.clone(),
        );
        let vouchers = VoucherStatusPoller::new(
            config.vouchers.clone(),
            collaborators.vouchers.clone(),
            dispatcher,
            store,
        );

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        let mut handles = Vec::new();

        if config.proximity.enabled {
            handles.push(
                PollerRunner::new(
                    proximity.clone(),
                    gate.clone(),
                    events_tx.clone(),
                    cancel.child_token(),
                )
                .spawn(),
            );
        } else {
            info!("proximity polling disabled by config");
        }

        if config.vouchers.enabled {
            handles.push(
                PollerRunner::new(vouchers.clone(), gate.clone(), events_tx, cancel.child_token())
                    .spawn(),
            );
        } else {
            info!("voucher polling disabled by config");
        }

        info!(?initial, "tracking engine started");
        (
            Self {
                gate,
                proximity,
                vouchers,
                cancel,
                handles,
            },
            events_rx,
        )
    }

    pub fn gate(&self) -> &LifecycleGate {
        &self.gate
    }

    /// Forward an OS lifecycle transition.
    pub fn set_app_state(&self, state: AppState) {
        self.gate.set(state);
    }

    pub fn proximity(&self) -> &ProximityPoller {
        &self.proximity
    }

    pub fn vouchers(&self) -> &VoucherStatusPoller {
        &self.vouchers
    }

    /// Cancel both runners, wait for them, and flush voucher persistence.
    pub async fn shutdown(self) {
        self.cancel.cancel();
        for handle in self.handles {
            if let Err(e) = handle.await {
                warn!(error = %e, "poller task ended abnormally");
            }
        }
        if let Err(e) = self.vouchers.flush().await {
            warn!(error = %e, "failed to flush voucher persistence on shutdown");
        }
        info!("tracking engine stopped");
    }
}
