//! Persistent set of in-flight voucher claims.
//!
//! Claims are stored as one JSON array under [`ACTIVE_VOUCHERS_KEY`].
//! Losing this data is non-fatal (the user can still refresh voucher status
//! by hand), so reads degrade to an empty list and writes only log.

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::kv::KeyValueStore;
use crate::error::StorageError;
use crate::vouchers::ActiveVoucherClaim;

/// Namespaced key holding the tracked claims.
pub const ACTIVE_VOUCHERS_KEY: &str = "dealwatch:active_vouchers";

/// Load/save of the tracked claim set on top of a [`KeyValueStore`].
#[derive(Clone)]
pub struct TrackingStore {
    kv: Arc<dyn KeyValueStore>,
}

impl TrackingStore {
    pub fn new(kv: Arc<dyn KeyValueStore>) -> Self {
        Self { kv }
    }

    /// Load persisted claims. Missing, unreadable or corrupt data yields an empty list.
    pub fn load(&self) -> Vec<ActiveVoucherClaim> {
        let raw = match self.kv.get(ACTIVE_VOUCHERS_KEY) {
            Ok(Some(raw)) => raw,
            Ok(None) => return Vec::new(),
            Err(e) => {
                warn!(error = %e, "failed to read tracked vouchers, starting empty");
                return Vec::new();
            }
        };
        match serde_json::from_str::<Vec<ActiveVoucherClaim>>(&raw) {
            Ok(claims) => {
                debug!(count = claims.len(), "loaded tracked vouchers");
                claims
            }
            Err(e) => {
                warn!(error = %e, "tracked vouchers are corrupt, starting empty");
                Vec::new()
            }
        }
    }

    /// Replace the persisted claim set.
    ///
    /// # Errors
    /// Returns an error if the value cannot be encoded or written.
    pub fn save(&self, claims: &[ActiveVoucherClaim]) -> Result<(), StorageError> {
        let raw = serde_json::to_string(claims).map_err(|e| StorageError::Corrupt {
            key: ACTIVE_VOUCHERS_KEY.to_string(),
            message: e.to_string(),
        })?;
        self.kv.set(ACTIVE_VOUCHERS_KEY, &raw)
    }

    /// Forget all persisted claims.
    pub fn clear(&self) -> Result<(), StorageError> {
        self.kv.remove(ACTIVE_VOUCHERS_KEY)
    }
}

enum WriteCommand {
    Save(Vec<ActiveVoucherClaim>),
    Flush(oneshot::Sender<()>),
}

/// Ordered background writer for [`TrackingStore`].
///
/// Snapshots are written one at a time in the order they were queued, so the
/// last write always reflects the latest in-memory state. Failures are logged
/// inside the writer and never reach the caller.
#[derive(Clone)]
pub struct TrackingWriter {
    tx: mpsc::UnboundedSender<WriteCommand>,
}

impl TrackingWriter {
    /// Spawn the writer task on the current tokio runtime.
    ///
    /// The task exits once every clone of the returned writer is dropped.
    pub fn spawn(store: TrackingStore) -> (Self, JoinHandle<()>) {
        let (tx, mut rx) = mpsc::unbounded_channel::<WriteCommand>();
        let handle = tokio::spawn(async move {
            while let Some(cmd) = rx.recv().await {
                match cmd {
                    WriteCommand::Save(claims) => {
                        let store = store.clone();
                        let count = claims.len();
                        let result =
                            tokio::task::spawn_blocking(move || store.save(&claims)).await;
                        match result {
                            Ok(Ok(())) => debug!(count, "persisted tracked vouchers"),
                            Ok(Err(e)) => {
                                warn!(error = %e, "failed to persist tracked vouchers")
                            }
                            Err(e) => warn!(error = %e, "voucher persistence task panicked"),
                        }
                    }
                    WriteCommand::Flush(ack) => {
                        let _ = ack.send(());
                    }
                }
            }
        });
        (Self { tx }, handle)
    }

    /// Queue a snapshot for writing.
    pub fn save(&self, claims: Vec<ActiveVoucherClaim>) {
        if self.tx.send(WriteCommand::Save(claims)).is_err() {
            warn!("persistence writer stopped, tracked vouchers kept in memory only");
        }
    }

    /// Wait until every snapshot queued so far has been written (or failed).
    pub async fn flush(&self) -> Result<(), StorageError> {
        let (ack_tx, ack_rx) = oneshot::channel();
        self.tx
            .send(WriteCommand::Flush(ack_tx))
            .map_err(|_| StorageError::WriterClosed)?;
        ack_rx.await.map_err(|_| StorageError::WriterClosed)
    }
}
