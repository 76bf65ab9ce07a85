//! Notification dispatch.
//!
//! Creates user-visible notification records through the host's
//! [`NotificationApi`] and refreshes the unread counter afterwards.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::collaborators::{
    NewNotification, Notification, NotificationApi, NotificationKind, Promotion, Store,
};
use crate::error::CollaboratorError;
use crate::geo::format_distance;

pub const PROMOTION_NEARBY_TITLE: &str = "🎉 Promotion Nearby!";

/// Body text of a proximity notification, e.g. `"2 for 1 Coffee at Bean Bar (800m away)"`.
pub fn promotion_nearby_message(promotion_title: &str, store_name: &str, distance_km: f64) -> String {
    format!(
        "{} at {} ({} away)",
        promotion_title,
        store_name,
        format_distance(distance_km)
    )
}

/// Wraps the notification backend for a single user.
#[derive(Clone)]
pub struct NotificationDispatcher {
    api: Arc<dyn NotificationApi>,
    user_id: i64,
}

impl NotificationDispatcher {
    pub fn new(api: Arc<dyn NotificationApi>, user_id: i64) -> Self {
        Self { api, user_id }
    }

    pub fn user_id(&self) -> i64 {
        self.user_id
    }

    /// Create a notification record, then refresh the unread counter.
    ///
    /// A failed counter refresh is logged; only the create result is returned.
    pub async fn dispatch(
        &self,
        kind: NotificationKind,
        title: String,
        message: String,
        store_id: Option<i64>,
        promotion_id: Option<i64>,
    ) -> Result<Notification, CollaboratorError> {
        let created = self
            .api
            .create_notification(NewNotification {
                user_id: self.user_id,
                kind,
                title,
                message,
                store_id,
                promotion_id,
            })
            .await?;
        debug!(notification_id = created.id, ?kind, "notification created");

        if let Err(e) = self.api.refresh_unread_count().await {
            warn!(error = %e, "failed to refresh unread notification count");
        }
        Ok(created)
    }

    /// Notify that `promotion` is running at `store`, `distance_km` away.
    pub async fn promotion_nearby(
        &self,
        promotion: &Promotion,
        store: &Store,
        distance_km: f64,
    ) -> Result<Notification, CollaboratorError> {
        self.dispatch(
            NotificationKind::PromotionNearby,
            PROMOTION_NEARBY_TITLE.to_string(),
            promotion_nearby_message(&promotion.title, &store.name, distance_km),
            Some(store.id),
            Some(promotion.id),
        )
        .await
    }

    /// Refresh the unread counter without creating a record.
    pub async fn refresh_unread_count(&self) -> Result<u64, CollaboratorError> {
        self.api.refresh_unread_count().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingApi {
        created: Mutex<Vec<NewNotification>>,
        refreshes: Mutex<u32>,
        fail_refresh: bool,
    }

    #[async_trait]
    impl NotificationApi for RecordingApi {
        async fn create_notification(
            &self,
            notification: NewNotification,
        ) -> Result<Notification, CollaboratorError> {
            let mut created = self.created.lock().unwrap();
            created.push(notification.clone());
            Ok(Notification {
                id: created.len() as i64,
                user_id: notification.user_id,
                kind: notification.kind,
                title: notification.title,
                message: notification.message,
                store_id: notification.store_id,
                promotion_id: notification.promotion_id,
                is_read: false,
                created_at: None,
            })
        }

        async fn refresh_unread_count(&self) -> Result<u64, CollaboratorError> {
            *self.refreshes.lock().unwrap() += 1;
            if self.fail_refresh {
                return Err(CollaboratorError::Network("offline".into()));
            }
            Ok(self.created.lock().unwrap().len() as u64)
        }
    }

    #[test]
    fn message_formats_distance() {
        assert_eq!(
            promotion_nearby_message("Half Price Bagels", "Bagel Barn", 0.8),
            "Half Price Bagels at Bagel Barn (800m away)"
        );
        assert_eq!(
            promotion_nearby_message("Half Price Bagels", "Bagel Barn", 2.34),
            "Half Price Bagels at Bagel Barn (2.3km away)"
        );
    }

    #[tokio::test]
    async fn promotion_nearby_creates_record_and_refreshes() {
        let api = Arc::new(RecordingApi::default());
        let dispatcher = NotificationDispatcher::new(api.clone(), 77);
        let promotion = Promotion {
            id: 5,
            product_id: 11,
            title: "Free Refill".into(),
            description: None,
        };
        let store = Store {
            id: 2,
            name: "Bean Bar".into(),
            latitude: Some(1.0),
            longitude: Some(1.0),
        };

        let created = dispatcher.promotion_nearby(&promotion, &store, 0.25).await.unwrap();
        assert_eq!(created.title, PROMOTION_NEARBY_TITLE);
        assert_eq!(created.message, "Free Refill at Bean Bar (250m away)");

        let sent = api.created.lock().unwrap();
        assert_eq!(sent[0].user_id, 77);
        assert_eq!(sent[0].store_id, Some(2));
        assert_eq!(sent[0].promotion_id, Some(5));
        assert_eq!(*api.refreshes.lock().unwrap(), 1);
    }

    #[tokio::test]
    async fn refresh_failure_does_not_fail_dispatch() {
        let api = Arc::new(RecordingApi {
            fail_refresh: true,
            ..Default::default()
        });
        let dispatcher = NotificationDispatcher::new(api, 1);
        let result = dispatcher
            .dispatch(
                NotificationKind::PromotionNearby,
                "t".into(),
                "m".into(),
                None,
                None,
            )
            .await;
        assert!(result.is_ok());
    }
}
