//! Decaying per-entity request counter.
//!
//! Each entity keeps a window total plus an open sub-interval. A periodic
//! rotation closes every non-empty sub-interval and schedules, one retention
//! period later, the subtraction of exactly what it contributed, from the
//! window and from the spatial index. Load and client distribution therefore
//! decay in lockstep.

mod window;

pub use window::WindowCount;

use crate::compute::cells::bucket_of;
use crate::compute::validation::{validate_entity, validate_geographic_point};
use crate::error::Result;
use crate::index::SpatialIndexManager;
use crate::scheduler::SchedulerHandle;
use dashmap::DashMap;
use geo::Point;
use geoload_types::bucket::LocationBucket;
use geoload_types::stats::LoadStats;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

#[derive(Debug, Default)]
struct CounterState {
    window: WindowCount,
    open: WindowCount,
}

type Counter = Arc<RwLock<CounterState>>;

struct RateInner {
    index: SpatialIndexManager,
    scheduler: SchedulerHandle,
    counters: DashMap<String, Counter>,
    recorded: AtomicU64,
    rotations: AtomicU64,
    pending_expirations: AtomicU64,
}

/// Sliding-window request counter feeding the spatial index.
///
/// Cheap to clone; clones share the same counters.
#[derive(Clone)]
pub struct RequestRateTracker {
    inner: Arc<RateInner>,
}

impl RequestRateTracker {
    /// Create a tracker feeding `index`. Window timing comes from the index's
    /// configuration; delayed subtractions run on `scheduler`.
    ///
    /// Rotation does not start until [`start_rotation`](Self::start_rotation)
    /// is called; [`rotate`](Self::rotate) can be driven by hand instead.
    pub fn new(index: SpatialIndexManager, scheduler: SchedulerHandle) -> Self {
        Self {
            inner: Arc::new(RateInner {
                index,
                scheduler,
                counters: DashMap::new(),
                recorded: AtomicU64::new(0),
                rotations: AtomicU64::new(0),
                pending_expirations: AtomicU64::new(0),
            }),
        }
    }

    pub fn index(&self) -> &SpatialIndexManager {
        &self.inner.index
    }

    /// Rotate every `rotation_interval` for as long as the tracker lives.
    pub fn start_rotation(&self) {
        let tracker = Arc::downgrade(&self.inner);
        let period = self.inner.index.config().rotation_interval();

        self.inner.scheduler.schedule_every(period, move || {
            let Some(inner) = tracker.upgrade() else {
                return false;
            };
            RequestRateTracker { inner }.rotate();
            true
        });
    }

    /// Count one request of `entity` from `location` and place it in the
    /// spatial index.
    pub fn record_request(&self, entity: &str, location: &Point) -> Result<()> {
        validate_entity(entity)?;
        validate_geographic_point(location)?;

        let precision = self.inner.index.config().bucket_precision;
        let (key, representative) = bucket_of(location, precision)?;

        let counter = self.counter_or_create(entity);
        {
            let mut state = counter.write();
            state.open.record(&key, representative, 1);
            state.window.record(&key, representative, 1);
        }
        self.inner.recorded.fetch_add(1, Ordering::Relaxed);

        self.inner
            .index
            .insert_bucket(entity, &key, &representative, 1);
        Ok(())
    }

    /// Requests of `entity` within the trailing window; 0 if unknown.
    pub fn current_load(&self, entity: &str) -> u64 {
        self.inner
            .counters
            .get(entity)
            .map(|counter| counter.read().window.total())
            .unwrap_or(0)
    }

    /// Per-bucket breakdown of `entity`'s window, busiest first.
    pub fn load_breakdown(&self, entity: &str) -> Option<Vec<LocationBucket>> {
        let counter = self.counter(entity)?;
        let state = counter.read();
        Some(state.window.to_buckets())
    }

    /// Close the open sub-interval of every entity that saw traffic and
    /// schedule its expiry. Returns the number of sub-intervals closed.
    pub fn rotate(&self) -> usize {
        let counters: Vec<(String, Counter)> = self
            .inner
            .counters
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect();

        let retention = self.inner.index.config().retention();
        let mut rotated = 0;

        for (entity, counter) in counters {
            let closed = {
                let mut state = counter.write();
                if state.open.is_empty() {
                    continue;
                }
                std::mem::take(&mut state.open)
            };

            self.inner
                .pending_expirations
                .fetch_add(1, Ordering::Relaxed);
            let tracker: Weak<RateInner> = Arc::downgrade(&self.inner);
            self.inner.scheduler.schedule_after(retention, move || {
                if let Some(inner) = tracker.upgrade() {
                    RequestRateTracker { inner }.expire(&entity, &counter, closed);
                }
            });
            rotated += 1;
        }

        self.inner.rotations.fetch_add(1, Ordering::Relaxed);
        if rotated > 0 {
            log::debug!("Rotated {} request interval(s)", rotated);
        }
        rotated
    }

    // Index first: a window total of zero implies the index has drained too.
    fn expire(&self, entity: &str, counter: &Counter, closed: WindowCount) {
        for (key, entry) in closed.locations() {
            self.inner
                .index
                .remove_bucket(entity, key, &entry.location, entry.count);
        }

        counter.write().window.subtract(&closed);

        self.inner
            .pending_expirations
            .fetch_sub(1, Ordering::Relaxed);
        log::debug!("Expired {} request(s) of {}", closed.total(), entity);
    }

    /// Answer centroid queries for `entity` from `cells` while the optimizer
    /// probes a placement.
    pub fn set_explore_override(&self, entity: &str, cells: Vec<s2::cellid::CellID>) {
        self.inner.index.set_explore_override(entity, cells);
    }

    pub fn clear_explore_override(&self, entity: &str) -> bool {
        self.inner.index.clear_explore_override(entity)
    }

    /// Entities with counter state, sorted.
    pub fn entities(&self) -> Vec<String> {
        let mut entities: Vec<String> = self
            .inner
            .counters
            .iter()
            .map(|entry| entry.key().clone())
            .collect();
        entities.sort();
        entities
    }

    pub fn stats(&self) -> LoadStats {
        let mut stats = LoadStats::new();
        for entry in self.inner.counters.iter() {
            stats.entities += 1;
            stats.window_total += entry.value().read().window.total();
        }
        stats.recorded = self.inner.recorded.load(Ordering::Relaxed);
        stats.rotations = self.inner.rotations.load(Ordering::Relaxed);
        stats.pending_expirations = self.inner.pending_expirations.load(Ordering::Relaxed);
        stats
    }

    fn counter(&self, entity: &str) -> Option<Counter> {
        self.inner
            .counters
            .get(entity)
            .map(|counter| counter.clone())
    }

    fn counter_or_create(&self, entity: &str) -> Counter {
        if let Some(counter) = self.counter(entity) {
            return counter;
        }
        self.inner
            .counters
            .entry(entity.to_string())
            .or_default()
            .clone()
    }
}
