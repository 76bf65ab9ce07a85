//! Pure matching logic for proximity ticks.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::collaborators::{Product, Promotion, Store};
use crate::geo::Coordinates;

/// A promotion that has already notified.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackedPromotion {
    pub promotion_id: i64,
    pub store_id: i64,
    pub notified_at: DateTime<Utc>,
}

/// One entry per notified promotion; suppresses re-firing during the cool-down.
#[derive(Debug, Clone)]
pub struct CooldownTracker {
    entries: HashMap<i64, TrackedPromotion>,
    cooldown: Duration,
}

impl CooldownTracker {
    pub fn new(cooldown: Duration) -> Self {
        Self {
            entries: HashMap::new(),
            cooldown,
        }
    }

    /// Whether `promotion_id` notified less than one cool-down ago.
    pub fn is_cooling_down(&self, promotion_id: i64, now: DateTime<Utc>) -> bool {
        self.entries
            .get(&promotion_id)
            .map(|entry| now - entry.notified_at < self.cooldown)
            .unwrap_or(false)
    }

    /// Create or refresh the entry for `promotion_id`.
    pub fn record(&mut self, promotion_id: i64, store_id: i64, now: DateTime<Utc>) {
        self.entries.insert(
            promotion_id,
            TrackedPromotion {
                promotion_id,
                store_id,
                notified_at: now,
            },
        );
    }

    pub fn get(&self, promotion_id: i64) -> Option<&TrackedPromotion> {
        self.entries.get(&promotion_id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

/// Skips work when the device has barely moved since the last evaluated sample.
#[derive(Debug, Clone)]
pub struct MovementGate {
    threshold_m: f64,
    last: Option<Coordinates>,
}

impl MovementGate {
    pub fn new(threshold_m: f64) -> Self {
        Self {
            threshold_m,
            last: None,
        }
    }

    /// `true` for the first sample, or one at least `threshold_m` from the last evaluated one.
    pub fn is_significant(&self, sample: &Coordinates) -> bool {
        match &self.last {
            None => true,
            Some(last) => last.distance_m(sample) >= self.threshold_m,
        }
    }

    /// Mark `sample` as evaluated.
    pub fn commit(&mut self, sample: Coordinates) {
        self.last = Some(sample);
    }

    pub fn last(&self) -> Option<Coordinates> {
        self.last
    }

    /// Forget the last sample so the next one always proceeds.
    pub fn reset(&mut self) {
        self.last = None;
    }
}

/// A promotion within range of the user this tick.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub promotion: Promotion,
    pub store: Store,
    pub distance_km: f64,
}

/// Select promotions to notify, in catalog order.
///
/// Promotions whose product has no store, or whose store has no coordinates,
/// are skipped. Promotions still cooling down are skipped. Only the first
/// in-range promotion per store is kept.
pub fn match_candidates(
    promotions: &[Promotion],
    stores: &[Store],
    products: &[Product],
    here: &Coordinates,
    radius_km: f64,
    cooldowns: &CooldownTracker,
    now: DateTime<Utc>,
) -> Vec<Candidate> {
    let product_store: HashMap<i64, i64> = products
        .iter()
        .filter_map(|p| p.store_id.map(|store_id| (p.id, store_id)))
        .collect();
    let stores_by_id: HashMap<i64, &Store> = stores.iter().map(|s| (s.id, s)).collect();

    let mut seen_stores = HashSet::new();
    let mut candidates = Vec::new();
    for promotion in promotions {
        let Some(store) = product_store
            .get(&promotion.product_id)
            .and_then(|store_id| stores_by_id.get(store_id))
        else {
            debug!(promotion_id = promotion.id, "promotion has no resolvable store");
            continue;
        };
        let Some(store_location) = store.coordinates() else {
            debug!(promotion_id = promotion.id, store_id = store.id, "store has no coordinates");
            continue;
        };
        if cooldowns.is_cooling_down(promotion.id, now) {
            continue;
        }

        let distance_km = here.distance_km(&store_location);
        if distance_km > radius_km {
            continue;
        }
        if !seen_stores.insert(store.id) {
            continue;
        }
        candidates.push(Candidate {
            promotion: promotion.clone(),
            store: (*store).clone(),
            distance_km,
        });
    }
    candidates
}
