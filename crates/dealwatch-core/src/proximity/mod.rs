//! Proximity notifications.
//!
//! Samples the device location on an interval and notifies when an active
//! promotion's store is within the user's tier radius. Each promotion
//! notifies at most once per cool-down window, and a single tick notifies at
//! most one promotion per store.

mod matching;
mod poller;

pub use matching::{match_candidates, Candidate, CooldownTracker, MovementGate, TrackedPromotion};
pub use poller::ProximityPoller;
