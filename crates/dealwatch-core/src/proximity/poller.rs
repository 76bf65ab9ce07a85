//! Proximity poller.
//!
//! One tick:
//!
//! ```text
//! preference on? -> permission granted? -> sample location -> moved enough?
//!   -> fetch catalog -> match candidates -> record cool-down -> dispatch
//! ```
//!
//! Every failure along the way ends the tick quietly; the next interval retries.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use super::matching::{match_candidates, CooldownTracker, MovementGate, TrackedPromotion};
use crate::collaborators::{
    CatalogProvider, LocationPermission, LocationProvider, PreferenceStore, TierProvider,
};
use crate::events::Event;
use crate::geo::Coordinates;
use crate::notify::NotificationDispatcher;
use crate::scheduler::Poller;
use crate::storage::ProximityConfig;

struct ProximityState {
    cooldowns: CooldownTracker,
    movement: MovementGate,
}

struct Inner {
    config: ProximityConfig,
    catalog: Arc<dyn CatalogProvider>,
    tiers: Arc<dyn TierProvider>,
    preferences: Arc<dyn PreferenceStore>,
    location: Arc<dyn LocationProvider>,
    dispatcher: NotificationDispatcher,
    state: Mutex<ProximityState>,
}

/// Notifies when the user comes within range of an active promotion.
///
/// Cheap to clone; clones share cool-down and movement state.
#[derive(Clone)]
pub struct ProximityPoller {
    inner: Arc<Inner>,
}

impl ProximityPoller {
    pub fn new(
        config: ProximityConfig,
        catalog: Arc<dyn CatalogProvider>,
        tiers: Arc<dyn TierProvider>,
        preferences: Arc<dyn PreferenceStore>,
        location: Arc<dyn LocationProvider>,
        dispatcher: NotificationDispatcher,
    ) -> Self {
        let state = ProximityState {
            cooldowns: CooldownTracker::new(config.cooldown()),
            movement: MovementGate::new(config.movement_threshold_m),
        };
        Self {
            inner: Arc::new(Inner {
                config,
                catalog,
                tiers,
                preferences,
                location,
                dispatcher,
                state: Mutex::new(state),
            }),
        }
    }

    /// Forget cool-downs and the last location.
    pub fn reset(&self) {
        let mut state = self.lock();
        state.cooldowns.clear();
        state.movement.reset();
    }

    pub fn tracked_promotion(&self, promotion_id: i64) -> Option<TrackedPromotion> {
        self.lock().cooldowns.get(promotion_id).cloned()
    }

    pub fn last_location(&self) -> Option<Coordinates> {
        self.lock().movement.last()
    }

    /// Run one proximity check at `now`.
    pub async fn check_once(&self, now: DateTime<Utc>) -> Vec<Event> {
        let inner = &self.inner;
        if !inner.config.enabled {
            return Vec::new();
        }
        if !inner.preferences.notifications_enabled().await {
            debug!("notifications disabled by preference");
            return Vec::new();
        }
        if inner.location.foreground_permission().await != LocationPermission::Granted {
            debug!("location permission not granted");
            return Vec::new();
        }

        let here = match inner.location.current_position(inner.config.accuracy).await {
            Ok(here) if here.latitude.is_finite() && here.longitude.is_finite() => here,
            Ok(here) => {
                warn!(?here, "location sample is not finite");
                return Vec::new();
            }
            Err(e) => {
                warn!(error = %e, "failed to sample location");
                return Vec::new();
            }
        };

        if !self.lock().movement.is_significant(&here) {
            debug!("moved less than threshold, skipping");
            return Vec::new();
        }

        let catalog = &inner.catalog;
        let (promotions, stores, products) = match tokio::try_join!(
            catalog.list_active_promotions(),
            catalog.list_stores(),
            catalog.list_products(),
        ) {
            Ok(data) => data,
            Err(e) => {
                warn!(error = %e, "failed to load catalog for proximity check");
                return Vec::new();
            }
        };
        let tier = inner.tiers.current_tier().await;
        let radius_km = inner.config.radius_km(tier);

        let candidates = {
            let mut state = self.lock();
            state.movement.commit(here);
            match_candidates(
                &promotions,
                &stores,
                &products,
                &here,
                radius_km,
                &state.cooldowns,
                now,
            )
        };
        debug!(
            promotions = promotions.len(),
            candidates = candidates.len(),
            ?tier,
            radius_km,
            "proximity check evaluated"
        );

        let mut events = Vec::with_capacity(candidates.len());
        for candidate in candidates {
            let promotion_id = candidate.promotion.id;
            let store_id = candidate.store.id;
            self.lock().cooldowns.record(promotion_id, store_id, now);

            let notification_id = match inner
                .dispatcher
                .promotion_nearby(&candidate.promotion, &candidate.store, candidate.distance_km)
                .await
            {
                Ok(created) => {
                    info!(promotion_id, store_id, distance_km = candidate.distance_km, "promotion nearby");
                    Some(created.id)
                }
                Err(e) => {
                    warn!(promotion_id, store_id, error = %e, "failed to dispatch proximity notification");
                    None
                }
            };
            events.push(Event::ProximityNotified {
                promotion_id,
                store_id,
                distance_km: candidate.distance_km,
                notification_id,
                at: now,
            });
        }
        events
    }

    fn lock(&self) -> MutexGuard<'_, ProximityState> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl Poller for ProximityPoller {
    fn name(&self) -> &'static str {
        "proximity"
    }

    fn interval(&self) -> Duration {
        self.inner.config.interval()
    }

    /// The first sample after a start always proceeds.
    fn on_start(&self) {
        self.lock().movement.reset();
    }

    async fn tick(&self, now: DateTime<Utc>) -> Vec<Event> {
        self.check_once(now).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::{
        LocationAccuracy, NewNotification, Notification, NotificationApi, Product, Promotion,
        Store, Tier,
    };
    use crate::error::CollaboratorError;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    const HERE: Coordinates = Coordinates {
        latitude: 51.5,
        longitude: -0.12,
    };

    struct Fixture {
        promotions: Vec<Promotion>,
        stores: Vec<Store>,
        products: Vec<Product>,
        catalog_calls: AtomicUsize,
        catalog_fails: AtomicBool,
        tier: Mutex<Tier>,
        enabled: AtomicBool,
        permission: Mutex<LocationPermission>,
        position: Mutex<Result<Coordinates, CollaboratorError>>,
        created: Mutex<Vec<NewNotification>>,
        create_fails: AtomicBool,
    }

    impl Fixture {
        fn new(store_offset_km: f64) -> Arc<Self> {
            Arc::new(Self {
                promotions: vec![Promotion {
                    id: 100,
                    product_id: 10,
                    title: "Two for One".into(),
                    description: None,
                }],
                stores: vec![Store {
                    id: 1,
                    name: "Market Hall".into(),
                    latitude: Some(HERE.latitude + store_offset_km / 111.195),
                    longitude: Some(HERE.longitude),
                }],
                products: vec![Product {
                    id: 10,
                    store_id: Some(1),
                    name: "Bread".into(),
                }],
                catalog_calls: AtomicUsize::new(0),
                catalog_fails: AtomicBool::new(false),
                tier: Mutex::new(Tier::Basic),
                enabled: AtomicBool::new(true),
                permission: Mutex::new(LocationPermission::Granted),
                position: Mutex::new(Ok(HERE)),
                created: Mutex::new(Vec::new()),
                create_fails: AtomicBool::new(false),
            })
        }

        fn sent(&self) -> usize {
            self.created.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl CatalogProvider for Fixture {
        async fn list_active_promotions(&self) -> Result<Vec<Promotion>, CollaboratorError> {
            self.catalog_calls.fetch_add(1, Ordering::SeqCst);
            if self.catalog_fails.load(Ordering::SeqCst) {
                return Err(CollaboratorError::Network("offline".into()));
            }
            Ok(self.promotions.clone())
        }
        async fn list_stores(&self) -> Result<Vec<Store>, CollaboratorError> {
            Ok(self.stores.clone())
        }
        async fn list_products(&self) -> Result<Vec<Product>, CollaboratorError> {
            Ok(self.products.clone())
        }
    }

    #[async_trait]
    impl TierProvider for Fixture {
        async fn current_tier(&self) -> Tier {
            *self.tier.lock().unwrap()
        }
    }

    #[async_trait]
    impl PreferenceStore for Fixture {
        async fn notifications_enabled(&self) -> bool {
            self.enabled.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl LocationProvider for Fixture {
        async fn foreground_permission(&self) -> LocationPermission {
            *self.permission.lock().unwrap()
        }
        async fn current_position(
            &self,
            accuracy: LocationAccuracy,
        ) -> Result<Coordinates, CollaboratorError> {
            assert_eq!(accuracy, LocationAccuracy::Balanced);
            self.position.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl NotificationApi for Fixture {
        async fn create_notification(
            &self,
            notification: NewNotification,
        ) -> Result<Notification, CollaboratorError> {
            if self.create_fails.load(Ordering::SeqCst) {
                return Err(CollaboratorError::Http {
                    status: 500,
                    message: "boom".into(),
                });
            }
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
            Ok(self.sent() as u64)
        }
    }

    fn poller(fixture: &Arc<Fixture>) -> ProximityPoller {
        ProximityPoller::new(
            ProximityConfig::default(),
            fixture.clone(),
            fixture.clone(),
            fixture.clone(),
            fixture.clone(),
            NotificationDispatcher::new(fixture.clone(), 5),
        )
    }

    #[tokio::test]
    async fn notifies_within_radius() {
        let fixture = Fixture::new(0.8);
        let poller = poller(&fixture);
        let now = Utc::now();

        let events = poller.check_once(now).await;
        assert_eq!(events.len(), 1);
        assert!(matches!(
            events[0],
            Event::ProximityNotified { promotion_id: 100, store_id: 1, notification_id: Some(1), .. }
        ));
        let sent = fixture.created.lock().unwrap();
        assert_eq!(sent[0].message, "Two for One at Market Hall (800m away)");
        assert_eq!(sent[0].user_id, 5);
        drop(sent);
        assert_eq!(poller.tracked_promotion(100).unwrap().notified_at, now);
    }

    #[tokio::test]
    async fn tier_selects_radius() {
        let fixture = Fixture::new(2.0);
        let poller = poller(&fixture);
        assert!(poller.check_once(Utc::now()).await.is_empty());

        *fixture.tier.lock().unwrap() = Tier::Pro;
        poller.on_start();
        assert_eq!(poller.check_once(Utc::now()).await.len(), 1);
        assert!(fixture.created.lock().unwrap()[0].message.ends_with("(2.0km away)"));
    }

    #[tokio::test]
    async fn preference_and_permission_gate_all_work() {
        let fixture = Fixture::new(0.5);
        let poller = poller(&fixture);

        fixture.enabled.store(false, Ordering::SeqCst);
        assert!(poller.check_once(Utc::now()).await.is_empty());

        fixture.enabled.store(true, Ordering::SeqCst);
        *fixture.permission.lock().unwrap() = LocationPermission::Denied;
        assert!(poller.check_once(Utc::now()).await.is_empty());

        assert_eq!(fixture.catalog_calls.load(Ordering::SeqCst), 0);
        assert!(poller.last_location().is_none());
    }

    #[tokio::test]
    async fn sampling_failure_is_swallowed() {
        let fixture = Fixture::new(0.5);
        let poller = poller(&fixture);
        *fixture.position.lock().unwrap() = Err(CollaboratorError::Unavailable("no fix".into()));
        assert!(poller.check_once(Utc::now()).await.is_empty());

        *fixture.position.lock().unwrap() = Ok(Coordinates::new(f64::NAN, 0.0));
        assert!(poller.check_once(Utc::now()).await.is_empty());
        assert_eq!(fixture.catalog_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn small_movement_skips_large_movement_evaluates() {
        let fixture = Fixture::new(0.5);
        let poller = poller(&fixture);
        let t0 = Utc::now();

        poller.check_once(t0).await;
        assert_eq!(fixture.catalog_calls.load(Ordering::SeqCst), 1);

        *fixture.position.lock().unwrap() =
            Ok(Coordinates::new(HERE.latitude + 0.0005, HERE.longitude));
        poller.check_once(t0 + chrono::Duration::minutes(1)).await;
        assert_eq!(fixture.catalog_calls.load(Ordering::SeqCst), 1, "< 100 m is a no-op");

        *fixture.position.lock().unwrap() =
            Ok(Coordinates::new(HERE.latitude + 0.002, HERE.longitude));
        poller.check_once(t0 + chrono::Duration::minutes(2)).await;
        assert_eq!(fixture.catalog_calls.load(Ordering::SeqCst), 2, ">= 100 m evaluates");
    }

    #[tokio::test]
    async fn catalog_failure_retries_next_tick() {
        let fixture = Fixture::new(0.5);
        let poller = poller(&fixture);
        fixture.catalog_fails.store(true, Ordering::SeqCst);
        assert!(poller.check_once(Utc::now()).await.is_empty());
        assert!(poller.last_location().is_none(), "failed tick must not consume the sample");

        fixture.catalog_fails.store(false, Ordering::SeqCst);
        assert_eq!(poller.check_once(Utc::now()).await.len(), 1);
    }

    #[tokio::test]
    async fn dispatch_failure_still_starts_cooldown() {
        let fixture = Fixture::new(0.5);
        let poller = poller(&fixture);
        fixture.create_fails.store(true, Ordering::SeqCst);
        let t0 = Utc::now();

        let events = poller.check_once(t0).await;
        assert!(matches!(events[0], Event::ProximityNotified { notification_id: None, .. }));
        assert!(poller.tracked_promotion(100).is_some());

        fixture.create_fails.store(false, Ordering::SeqCst);
        poller.on_start();
        assert!(poller.check_once(t0 + chrono::Duration::minutes(10)).await.is_empty());
    }

    #[tokio::test]
    async fn reset_clears_cooldowns() {
        let fixture = Fixture::new(0.5);
        let poller = poller(&fixture);
        let t0 = Utc::now();
        assert_eq!(poller.check_once(t0).await.len(), 1);
        poller.reset();
        assert!(poller.tracked_promotion(100).is_none());
        assert_eq!(poller.check_once(t0 + chrono::Duration::minutes(1)).await.len(), 1);
    }
}
