//! Offline proximity simulation.
//!
//! Loads a JSON fixture describing the catalog and the device, then runs
//! proximity checks at the configured interval in simulated time and prints
//! every notification that would have been created.
//!
//! ```json
//! {
//!   "tier": "BASIC",
//!   "locations": [{ "latitude": 48.8566, "longitude": 2.3522 }],
//!   "promotions": [{ "id": 100, "productId": 10, "title": "Half-price croissants" }],
//!   "stores": [{ "id": 1, "name": "Boulangerie", "latitude": 48.8638, "longitude": 2.3522 }],
//!   "products": [{ "id": 10, "storeId": 1, "name": "Croissant" }]
//! }
//! ```
//!
//! `locations` is consumed one entry per tick; the last entry repeats.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{Duration, Utc};
use clap::Args;
use dealwatch_core::{
    CatalogProvider, CollaboratorError, Coordinates, EngineConfig, Event, LocationAccuracy,
    LocationPermission, LocationProvider, NewNotification, Notification, NotificationApi,
    NotificationDispatcher, PreferenceStore, Product, Promotion, ProximityPoller, Store, Tier,
    TierProvider,
};
use serde::Deserialize;
use tracing::debug;

#[derive(Args)]
pub struct SimulateArgs {
    /// Path to the fixture JSON file
    fixture: PathBuf,
    /// Number of proximity ticks to run
    #[arg(long, default_value_t = 1)]
    ticks: u32,
    /// Print notifications as JSON
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Fixture {
    #[serde(default)]
    tier: Tier,
    locations: Vec<Coordinates>,
    #[serde(default)]
    promotions: Vec<Promotion>,
    #[serde(default)]
    stores: Vec<Store>,
    #[serde(default)]
    products: Vec<Product>,
}

/// In-memory stand-in for the backend and the device.
struct SimulatedWorld {
    fixture: Fixture,
    tick: Mutex<usize>,
    created: Mutex<Vec<Notification>>,
}

impl SimulatedWorld {
    fn advance(&self) {
        let mut tick = self.tick.lock().unwrap_or_else(|p| p.into_inner());
        *tick += 1;
    }
}

#[async_trait]
impl CatalogProvider for SimulatedWorld {
    async fn list_active_promotions(&self) -> Result<Vec<Promotion>, CollaboratorError> {
        Ok(self.fixture.promotions.clone())
    }

    async fn list_stores(&self) -> Result<Vec<Store>, CollaboratorError> {
        Ok(self.fixture.stores.clone())
    }

    async fn list_products(&self) -> Result<Vec<Product>, CollaboratorError> {
        Ok(self.fixture.products.clone())
    }
}

#[async_trait]
impl TierProvider for SimulatedWorld {
    async fn current_tier(&self) -> Tier {
        self.fixture.tier
    }
}

#[async_trait]
impl PreferenceStore for SimulatedWorld {
    async fn notifications_enabled(&self) -> bool {
        true
    }
}

#[async_trait]
impl LocationProvider for SimulatedWorld {
    async fn foreground_permission(&self) -> LocationPermission {
        LocationPermission::Granted
    }

    async fn current_position(
        &self,
        _accuracy: LocationAccuracy,
    ) -> Result<Coordinates, CollaboratorError> {
        let tick = *self.tick.lock().unwrap_or_else(|p| p.into_inner());
        let locations = &self.fixture.locations;
        locations
            .get(tick.min(locations.len().saturating_sub(1)))
            .copied()
            .ok_or_else(|| CollaboratorError::Unavailable("fixture has no locations".into()))
    }
}

#[async_trait]
impl NotificationApi for SimulatedWorld {
    async fn create_notification(
        &self,
        notification: NewNotification,
    ) -> Result<Notification, CollaboratorError> {
        let mut created = self.created.lock().unwrap_or_else(|p| p.into_inner());
        let record = Notification {
            id: created.len() as i64 + 1,
            user_id: notification.user_id,
            kind: notification.kind,
            title: notification.title,
            message: notification.message,
            store_id: notification.store_id,
            promotion_id: notification.promotion_id,
            is_read: false,
            created_at: Some(Utc::now()),
        };
        created.push(record.clone());
        Ok(record)
    }

    async fn refresh_unread_count(&self) -> Result<u64, CollaboratorError> {
        Ok(self.created.lock().unwrap_or_else(|p| p.into_inner()).len() as u64)
    }
}

pub fn run(args: SimulateArgs) -> Result<(), Box<dyn std::error::Error>> {
    let content = std::fs::read_to_string(&args.fixture)?;
    let fixture: Fixture = serde_json::from_str(&content)?;
    if fixture.locations.is_empty() {
        return Err("fixture must contain at least one location".into());
    }

    let config = EngineConfig::load_or_default();
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    let world = Arc::new(SimulatedWorld {
        fixture,
        tick: Mutex::new(0),
        created: Mutex::new(Vec::new()),
    });
    let step = Duration::seconds(config.proximity.interval_secs.max(1) as i64);
    let poller = ProximityPoller::new(
        config.proximity,
        world.clone(),
        world.clone(),
        world.clone(),
        world.clone(),
        NotificationDispatcher::new(world.clone(), 0),
    );

    let start = Utc::now();
    let mut notified = 0usize;
    runtime.block_on(async {
        for tick in 0..args.ticks {
            let now = start + step * tick as i32;
            let events = poller.check_once(now).await;
            debug!(tick, events = events.len(), "simulated tick");
            for event in events {
                if let Event::ProximityNotified { distance_km, .. } = event {
                    notified += 1;
                    if !args.json {
                        println!("tick {tick}: {distance_km:.3} km");
                    }
                }
            }
            world.advance();
        }
    });

    let created = world.created.lock().unwrap_or_else(|p| p.into_inner()).clone();
    if args.json {
        println!("{}", serde_json::to_string_pretty(&created)?);
    } else {
        for notification in &created {
            println!("{} | {}", notification.title, notification.message);
        }
        println!("{notified} notification(s) over {} tick(s)", args.ticks);
    }
    Ok(())
}
