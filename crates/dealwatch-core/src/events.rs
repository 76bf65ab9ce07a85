use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Every outward-facing outcome of the tracking engine produces an Event.
/// Pollers return them from `tick`; the engine forwards them to the host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Event {
    /// A promotion came within range and a notification was created.
    ProximityNotified {
        promotion_id: i64,
        store_id: i64,
        distance_km: f64,
        /// `None` if the notification backend rejected the record.
        notification_id: Option<i64>,
        at: DateTime<Utc>,
    },
    /// A tracked voucher claim was observed as redeemed. Raised once per claim.
    VoucherRedeemed {
        redemption_id: i64,
        store_id: i64,
        promotion_id: i64,
        at: DateTime<Utc>,
    },
    /// A tracked claim exceeded its tracking budget and was dropped.
    VoucherTrackingExpired {
        redemption_id: i64,
        store_id: i64,
        at: DateTime<Utc>,
    },
    /// A poller's timer started after the app became active.
    PollerStarted {
        poller: String,
        at: DateTime<Utc>,
    },
    /// A poller's timer was cancelled (background or shutdown).
    PollerStopped {
        poller: String,
        at: DateTime<Utc>,
    },
}
