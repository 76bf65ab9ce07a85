//! # Dealwatch Core Library
//!
//! Background tracking and notification engine for the Dealwatch deals
//! marketplace. Two cooperating pollers run while the app is in the
//! foreground:
//!
//! - **Proximity**: samples the device location and notifies when the user
//!   comes within range of a store running an active promotion
//! - **Vouchers**: polls the redemption status of claimed vouchers and raises
//!   a one-shot event the moment a retailer redeems one
//!
//! ## Architecture
//!
//! - **Lifecycle gate**: foreground/background state that starts and cancels
//!   both pollers' timers
//! - **Scheduler**: one tokio task per poller, ticking on its own interval
//! - **Storage**: SQLite key-value store for in-flight voucher claims and
//!   TOML-based configuration
//! - **Collaborators**: async traits for every external dependency (catalog,
//!   location, notification backend), with a REST adapter
//!
//! ## Key Components
//!
//! - [`TrackingEngine`]: wires everything together
//! - [`ProximityPoller`]: proximity matching with cool-down and movement gate
//! - [`VoucherStatusPoller`]: voucher claim tracking
//! - [`EngineConfig`]: engine configuration management

pub mod api;
pub mod collaborators;
pub mod engine;
pub mod error;
pub mod events;
pub mod geo;
pub mod lifecycle;
pub mod notify;
pub mod proximity;
pub mod scheduler;
pub mod storage;
pub mod vouchers;

pub use api::RestClient;
pub use collaborators::{
    CatalogProvider, Collaborators, LocationAccuracy, LocationPermission, LocationProvider,
    NewNotification, Notification, NotificationApi, NotificationKind, PreferenceStore, Product,
    Promotion, Store, Tier, TierProvider, VoucherClaimStatus, VoucherStatusApi,
};
pub use engine::{open_tracking_store, TrackingEngine};
pub use error::{CollaboratorError, ConfigError, CoreError, StorageError};
pub use events::Event;
pub use geo::{distance_km, format_distance, Coordinates};
pub use lifecycle::{AppState, LifecycleGate};
pub use notify::NotificationDispatcher;
pub use proximity::{ProximityPoller, TrackedPromotion};
pub use scheduler::{Poller, PollerRunner};
pub use storage::{EngineConfig, KeyValueStore, SqliteStore, TrackingStore};
pub use vouchers::{ActiveVoucherClaim, RedeemedVoucher, VoucherStatus, VoucherStatusPoller};
