//! Voucher redemption tracking.
//!
//! A claimed voucher is tracked while PENDING or VERIFIED. The poller checks
//! the redemption status endpoint for each claim's store and raises a single
//! redeemed event when the retailer redeems it. Claims that stay unredeemed
//! past the tracking budget are dropped silently.

mod claim;
mod poller;

pub use crate::collaborators::VoucherStatus;
pub use claim::{ActiveVoucherClaim, RedeemedVoucher};
pub use poller::VoucherStatusPoller;
