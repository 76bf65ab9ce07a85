//! Voucher status poller.
//!
//! ## Claim lifecycle
//!
//! ```text
//! register (PENDING | VERIFIED) -> tracked -> (redeemed | expired | unregistered)
//! ```
//!
//! The tracked set is persisted after every registration change and reloaded
//! on construction. Reloaded claims get a fresh tracking budget.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Notify;
use tracing::{debug, info, warn};

use super::claim::{ActiveVoucherClaim, RedeemedVoucher};
use crate::collaborators::{VoucherStatus, VoucherStatusApi};
use crate::error::StorageError;
use crate::events::Event;
use crate::notify::NotificationDispatcher;
use crate::scheduler::Poller;
use crate::storage::{TrackingStore, TrackingWriter, VouchersConfig};

#[derive(Debug, Clone)]
struct TrackedClaim {
    claim: ActiveVoucherClaim,
    /// Start of this claim's tracking budget.
    tracked_since: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct TrackerState {
    claims: HashMap<i64, TrackedClaim>,
    /// Single popup slot. A newer redemption replaces an unconsumed one.
    last_redeemed: Option<RedeemedVoucher>,
}

struct Inner {
    config: VouchersConfig,
    api: Arc<dyn VoucherStatusApi>,
    dispatcher: NotificationDispatcher,
    writer: TrackingWriter,
    state: Mutex<TrackerState>,
    wake: Arc<Notify>,
}

/// Polls redemption status for every tracked voucher claim.
///
/// Cheap to clone; clones share the same tracked set.
#[derive(Clone)]
pub struct VoucherStatusPoller {
    inner: Arc<Inner>,
}

impl VoucherStatusPoller {
    /// Create a poller and restore previously persisted claims.
    ///
    /// Must be called from within a tokio runtime (spawns the persistence writer).
    pub fn new(
        config: VouchersConfig,
        api: Arc<dyn VoucherStatusApi>,
        dispatcher: NotificationDispatcher,
        store: TrackingStore,
    ) -> Self {
        Self::new_at(config, api, dispatcher, store, Utc::now())
    }

    /// Like [`new`](Self::new), with restored claims' budgets starting at `now`.
    pub fn new_at(
        config: VouchersConfig,
        api: Arc<dyn VoucherStatusApi>,
        dispatcher: NotificationDispatcher,
        store: TrackingStore,
        now: DateTime<Utc>,
    ) -> Self {
        let mut state = TrackerState::default();
        for claim in store.load() {
            if !claim.status.is_trackable() {
                debug!(
                    redemption_id = claim.redemption_id,
                    status = ?claim.status,
                    "dropping persisted claim that is no longer trackable"
                );
                continue;
            }
            state.claims.insert(
                claim.redemption_id,
                TrackedClaim {
                    claim,
                    tracked_since: now,
                },
            );
        }
        if !state.claims.is_empty() {
            info!(count = state.claims.len(), "restored tracked voucher claims");
        }

        let (writer, _handle) = TrackingWriter::spawn(store);
        Self {
            inner: Arc::new(Inner {
                config,
                api,
                dispatcher,
                writer,
                state: Mutex::new(state),
                wake: Arc::new(Notify::new()),
            }),
        }
    }

    // ── Registration ─────────────────────────────────────────────────

    /// Start tracking a claim. Returns `false` (and does nothing) unless
    /// `status` is PENDING or VERIFIED.
    pub fn register(
        &self,
        redemption_id: i64,
        store_id: i64,
        promotion_id: i64,
        status: VoucherStatus,
    ) -> bool {
        self.register_at(redemption_id, store_id, promotion_id, status, Utc::now())
    }

    pub fn register_at(
        &self,
        redemption_id: i64,
        store_id: i64,
        promotion_id: i64,
        status: VoucherStatus,
        now: DateTime<Utc>,
    ) -> bool {
        if !status.is_trackable() {
            debug!(redemption_id, ?status, "not tracking voucher claim");
            return false;
        }

        {
            let mut state = self.lock();
            let claim = ActiveVoucherClaim::new(redemption_id, store_id, promotion_id, status);
            match state.claims.get_mut(&redemption_id) {
                // Re-registering keeps the original budget.
                Some(existing) => existing.claim = claim,
                None => {
                    state.claims.insert(
                        redemption_id,
                        TrackedClaim {
                            claim,
                            tracked_since: now,
                        },
                    );
                }
            }
            self.persist(&state);
        }
        info!(redemption_id, store_id, ?status, "tracking voucher claim");

        self.inner.wake.notify_one();
        true
    }

    /// Stop tracking a claim. Returns `true` if it was tracked.
    pub fn unregister(&self, redemption_id: i64) -> bool {
        let removed = {
            let mut state = self.lock();
            let removed = state.claims.remove(&redemption_id).is_some();
            if removed {
                self.persist(&state);
            }
            removed
        };
        if removed {
            debug!(redemption_id, "stopped tracking voucher claim");
        }
        removed
    }

    // ── Queries ──────────────────────────────────────────────────────

    pub fn is_tracking(&self, redemption_id: i64) -> bool {
        self.lock().claims.contains_key(&redemption_id)
    }

    pub fn tracked_count(&self) -> usize {
        self.lock().claims.len()
    }

    /// Tracked claims ordered by redemption id.
    pub fn tracked_claims(&self) -> Vec<ActiveVoucherClaim> {
        Self::snapshot(&self.lock())
    }

    /// Peek at the popup slot.
    pub fn last_redeemed(&self) -> Option<RedeemedVoucher> {
        self.lock().last_redeemed.clone()
    }

    /// Consume the popup slot.
    pub fn take_last_redeemed(&self) -> Option<RedeemedVoucher> {
        self.lock().last_redeemed.take()
    }

    /// Wait for queued persistence writes.
    pub async fn flush(&self) -> Result<(), StorageError> {
        self.inner.writer.flush().await
    }

    // ── Polling ──────────────────────────────────────────────────────

    /// Check every tracked claim once.
    pub async fn poll_once(&self, now: DateTime<Utc>) -> Vec<Event> {
        let pending: Vec<TrackedClaim> = self.lock().claims.values().cloned().collect();
        if pending.is_empty() {
            return Vec::new();
        }

        let max_age = self.inner.config.max_tracking();
        let mut events = Vec::new();
        for tracked in pending {
            let claim = tracked.claim;
            let redemption_id = claim.redemption_id;

            if now - tracked.tracked_since > max_age {
                if self.unregister(redemption_id) {
                    info!(redemption_id, "voucher tracking expired");
                    events.push(Event::VoucherTrackingExpired {
                        redemption_id,
                        store_id: claim.store_id,
                        at: now,
                    });
                }
                continue;
            }

            let status = match self
                .inner
                .api
                .check_voucher_claim_status(claim.store_id)
                .await
            {
                Ok(status) => status,
                Err(e) => {
                    warn!(
                        redemption_id,
                        store_id = claim.store_id,
                        error = %e,
                        "voucher status check failed"
                    );
                    continue;
                }
            };

            let redeemed = status.redemption_id == Some(redemption_id)
                && status.status == Some(VoucherStatus::Redeemed);
            if !redeemed {
                if let Some(tracked) = self.lock().claims.get_mut(&redemption_id) {
                    tracked.claim.last_checked = Some(now);
                }
                continue;
            }

            if let Some(event) = self.mark_redeemed(redemption_id, now) {
                events.push(event);
                if let Err(e) = self.inner.dispatcher.refresh_unread_count().await {
                    warn!(error = %e, "failed to refresh unread count after redemption");
                }
            }
        }
        events
    }

    /// Move a claim into the popup slot. `None` if it was unregistered meanwhile.
    fn mark_redeemed(&self, redemption_id: i64, now: DateTime<Utc>) -> Option<Event> {
        let event = {
            let mut state = self.lock();
            let mut tracked = state.claims.remove(&redemption_id)?;
            tracked.claim.status = VoucherStatus::Redeemed;
            tracked.claim.last_checked = Some(now);

            if let Some(unshown) = &state.last_redeemed {
                warn!(
                    replaced = unshown.claim.redemption_id,
                    redemption_id, "replacing unshown redeemed voucher"
                );
            }
            let event = Event::VoucherRedeemed {
                redemption_id,
                store_id: tracked.claim.store_id,
                promotion_id: tracked.claim.promotion_id,
                at: now,
            };
            state.last_redeemed = Some(RedeemedVoucher {
                claim: tracked.claim,
                redeemed_at: now,
            });
            self.persist(&state);
            event
        };
        info!(redemption_id, "voucher redeemed");
        Some(event)
    }

    /// Queue a snapshot while the caller still holds the state lock, so
    /// snapshots reach the writer in the order the set changed.
    fn persist(&self, state: &TrackerState) {
        self.inner.writer.save(Self::snapshot(state));
    }

    fn snapshot(state: &TrackerState) -> Vec<ActiveVoucherClaim> {
        let mut claims: Vec<ActiveVoucherClaim> =
            state.claims.values().map(|t| t.claim.clone()).collect();
        claims.sort_by_key(|c| c.redemption_id);
        claims
    }

    fn lock(&self) -> MutexGuard<'_, TrackerState> {
        // Tracker state holds no cross-field invariants worth refusing on poison.
        self.inner
            .state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl Poller for VoucherStatusPoller {
    fn name(&self) -> &'static str {
        "vouchers"
    }

    fn interval(&self) -> Duration {
        self.inner.config.interval()
    }

    fn has_work(&self) -> bool {
        self.tracked_count() > 0
    }

    fn work_signal(&self) -> Option<Arc<Notify>> {
        Some(self.inner.wake.clone())
    }

    async fn tick(&self, now: DateTime<Utc>) -> Vec<Event> {
        self.poll_once(now).await
    }
}
