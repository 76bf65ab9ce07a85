use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::collaborators::VoucherStatus;

/// A voucher the user has claimed and the retailer has not yet redeemed.
///
/// This is also the persisted shape (camelCase JSON).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActiveVoucherClaim {
    pub redemption_id: i64,
    pub store_id: i64,
    pub promotion_id: i64,
    pub status: VoucherStatus,
    /// Last time the status endpoint answered for this claim.
    #[serde(default)]
    pub last_checked: Option<DateTime<Utc>>,
}

impl ActiveVoucherClaim {
    pub fn new(redemption_id: i64, store_id: i64, promotion_id: i64, status: VoucherStatus) -> Self {
        Self {
            redemption_id,
            store_id,
            promotion_id,
            status,
            last_checked: None,
        }
    }
}

/// The most recently redeemed claim, waiting to be shown as a popup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RedeemedVoucher {
    pub claim: ActiveVoucherClaim,
    pub redeemed_at: DateTime<Utc>,
}
