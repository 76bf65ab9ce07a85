//! External collaborators consumed by the tracking engine.
//!
//! Every boundary the engine touches (catalog data, subscription tier,
//! voucher status endpoint, notification API, preferences, device location)
//! is an async trait here. The engine never owns their internals; hosts wire
//! in real implementations (see [`crate::api::RestClient`]) and tests wire in
//! fakes.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::CollaboratorError;
use crate::geo::Coordinates;

/// An active promotion in the catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Promotion {
    pub id: i64,
    pub product_id: i64,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
}

/// A retailer's store. Coordinates are optional in the catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Store {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub latitude: Option<f64>,
    #[serde(default)]
    pub longitude: Option<f64>,
}

impl Store {
    /// Store location, if both coordinates are known.
    pub fn coordinates(&self) -> Option<Coordinates> {
        match (self.latitude, self.longitude) {
            (Some(lat), Some(lon)) if lat.is_finite() && lon.is_finite() => {
                Some(Coordinates::new(lat, lon))
            }
            _ => None,
        }
    }
}

/// A product, owned by at most one store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    pub id: i64,
    #[serde(default)]
    pub store_id: Option<i64>,
    #[serde(default)]
    pub name: String,
}

/// Consumer subscription tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Tier {
    #[default]
    Basic,
    Pro,
}

/// Redemption state of a claimed voucher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum VoucherStatus {
    Pending,
    Verified,
    Redeemed,
}

impl VoucherStatus {
    /// Whether a claim in this state is still waiting on the retailer.
    pub fn is_trackable(self) -> bool {
        matches!(self, VoucherStatus::Pending | VoucherStatus::Verified)
    }
}

/// Response of the voucher status endpoint for one store.
///
/// `redemption_id` is only present when a redeemed voucher exists for the store.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoucherClaimStatus {
    #[serde(default)]
    pub redemption_id: Option<i64>,
    #[serde(default)]
    pub status: Option<VoucherStatus>,
}

/// Kind of a user-visible notification record.
///
/// The engine only creates proximity records; redemption records belong to
/// the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    PromotionNearby,
}

/// Request body for creating a notification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewNotification {
    pub user_id: i64,
    #[serde(rename = "type")]
    pub kind: NotificationKind,
    pub title: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub store_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub promotion_id: Option<i64>,
}

/// A notification record as stored by the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: i64,
    pub user_id: i64,
    #[serde(rename = "type")]
    pub kind: NotificationKind,
    pub title: String,
    pub message: String,
    #[serde(default)]
    pub store_id: Option<i64>,
    #[serde(default)]
    pub promotion_id: Option<i64>,
    #[serde(default)]
    pub is_read: bool,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

/// Foreground location permission state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LocationPermission {
    Granted,
    Denied,
}

/// Requested location sampling accuracy. Lower accuracy costs less battery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LocationAccuracy {
    Lowest,
    Low,
    #[default]
    Balanced,
    High,
}

/// Catalog and store data.
#[async_trait]
pub trait CatalogProvider: Send + Sync {
    async fn list_active_promotions(&self) -> Result<Vec<Promotion>, CollaboratorError>;
    async fn list_stores(&self) -> Result<Vec<Store>, CollaboratorError>;
    async fn list_products(&self) -> Result<Vec<Product>, CollaboratorError>;
}

/// The consumer's subscription tier.
#[async_trait]
pub trait TierProvider: Send + Sync {
    async fn current_tier(&self) -> Tier;
}

/// Redemption status endpoint.
#[async_trait]
pub trait VoucherStatusApi: Send + Sync {
    async fn check_voucher_claim_status(
        &self,
        store_id: i64,
    ) -> Result<VoucherClaimStatus, CollaboratorError>;
}

/// Backend that stores notification records and the unread counter.
#[async_trait]
pub trait NotificationApi: Send + Sync {
    async fn create_notification(
        &self,
        notification: NewNotification,
    ) -> Result<Notification, CollaboratorError>;

    /// Re-fetch the unread counter so badges pick up new records.
    async fn refresh_unread_count(&self) -> Result<u64, CollaboratorError>;
}

/// Global notification on/off switch.
#[async_trait]
pub trait PreferenceStore: Send + Sync {
    async fn notifications_enabled(&self) -> bool;
}

/// Device permission and location sampling.
#[async_trait]
pub trait LocationProvider: Send + Sync {
    async fn foreground_permission(&self) -> LocationPermission;

    async fn current_position(
        &self,
        accuracy: LocationAccuracy,
    ) -> Result<Coordinates, CollaboratorError>;
}

/// Everything the engine needs from its host.
#[derive(Clone)]
pub struct Collaborators {
    /// Recipient of created notifications.
    pub user_id: i64,
    pub catalog: Arc<dyn CatalogProvider>,
    pub tiers: Arc<dyn TierProvider>,
    pub vouchers: Arc<dyn VoucherStatusApi>,
    pub notifications: Arc<dyn NotificationApi>,
    pub preferences: Arc<dyn PreferenceStore>,
    pub location: Arc<dyn LocationProvider>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_coordinates_require_both_values() {
        let mut store = Store {
            id: 1,
            name: "Corner Deli".into(),
            latitude: Some(40.0),
            longitude: None,
        };
        assert!(store.coordinates().is_none());
        store.longitude = Some(-73.0);
        assert_eq!(store.coordinates(), Some(Coordinates::new(40.0, -73.0)));
        store.latitude = Some(f64::NAN);
        assert!(store.coordinates().is_none());
    }

    #[test]
    fn only_pending_and_verified_are_trackable() {
        assert!(VoucherStatus::Pending.is_trackable());
        assert!(VoucherStatus::Verified.is_trackable());
        assert!(!VoucherStatus::Redeemed.is_trackable());
    }

    #[test]
    fn claim_status_parses_null_redemption() {
        let parsed: VoucherClaimStatus =
            serde_json::from_str(r#"{"redemptionId": null, "status": "PENDING"}"#).unwrap();
        assert_eq!(parsed.redemption_id, None);
        assert_eq!(parsed.status, Some(VoucherStatus::Pending));

        let parsed: VoucherClaimStatus = serde_json::from_str("{}").unwrap();
        assert_eq!(parsed, VoucherClaimStatus::default());
    }

    #[test]
    fn new_notification_wire_shape() {
        let n = NewNotification {
            user_id: 9,
            kind: NotificationKind::PromotionNearby,
            title: "t".into(),
            message: "m".into(),
            store_id: Some(3),
            promotion_id: None,
        };
        let value = serde_json::to_value(&n).unwrap();
        assert_eq!(value["userId"], 9);
        assert_eq!(value["type"], "promotion_nearby");
        assert_eq!(value["storeId"], 3);
        assert!(value.get("promotionId").is_none());
    }

    #[test]
    fn only_proximity_records_are_created() {
        assert_eq!(
            serde_json::to_value(NotificationKind::PromotionNearby).unwrap(),
            "promotion_nearby"
        );
        assert!(serde_json::from_str::<NotificationKind>("\"voucher_redeemed\"").is_err());
    }
}
