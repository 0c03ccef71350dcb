//! The process-wide load tracking engine.
//!
//! An [`Engine`] owns the timer thread, the spatial index and the request
//! tracker, and wires the periodic merge and rotation tasks between them.
//! Clones share all state; the timer thread stops when the last clone is
//! dropped or [`Engine::close`] is called.

use crate::builder::EngineBuilder;
use crate::config::Config;
use crate::error::{GeoLoadError, Result};
use crate::index::SpatialIndexManager;
use crate::rate::RequestRateTracker;
use crate::scheduler::Scheduler;
use geo::Point;
use geoload_types::bucket::LocationBucket;
use geoload_types::centroid::WeightedCentroid;
use geoload_types::stats::{IndexStats, LoadStats};
use s2::cellid::CellID;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

struct EngineInner {
    scheduler: Scheduler,
    index: SpatialIndexManager,
    tracker: RequestRateTracker,
    closed: AtomicBool,
}

/// Geo-aware request load tracker.
#[derive(Clone)]
pub struct Engine {
    inner: Arc<EngineInner>,
}

impl Engine {
    /// Start an engine with the default configuration.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use geoload::{Engine, Point};
    ///
    /// let engine = Engine::new()?;
    /// engine.record_request("svc-a", &Point::new(-74.0060, 40.7128))?;
    /// assert_eq!(engine.current_load("svc-a")?, 1);
    /// # Ok::<(), geoload::GeoLoadError>(())
    /// ```
    pub fn new() -> Result<Self> {
        Self::with_config(Config::default())
    }

    /// Start an engine with a custom configuration.
    pub fn with_config(config: Config) -> Result<Self> {
        config.validate().map_err(GeoLoadError::InvalidConfig)?;

        let scheduler = Scheduler::new()?;
        let index = SpatialIndexManager::with_scheduler(config, scheduler.handle())?;
        let tracker = RequestRateTracker::new(index.clone(), scheduler.handle());
        tracker.start_rotation();

        log::debug!(
            "Engine started: levels {}..={}, water marks {}/{}",
            index.config().top_level,
            index.config().max_level,
            index.config().merge_threshold,
            index.config().split_threshold
        );

        Ok(Self {
            inner: Arc::new(EngineInner {
                scheduler,
                index,
                tracker,
                closed: AtomicBool::new(false),
            }),
        })
    }

    pub fn builder() -> EngineBuilder {
        EngineBuilder::new()
    }

    pub fn config(&self) -> &Config {
        self.inner.index.config()
    }

    /// The spatial index, for callers that need cell-level access.
    pub fn index(&self) -> &SpatialIndexManager {
        &self.inner.index
    }

    pub fn tracker(&self) -> &RequestRateTracker {
        &self.inner.tracker
    }

    /// Record one request of `entity` from a client at `location`.
    pub fn record_request(&self, entity: &str, location: &Point) -> Result<()> {
        self.ensure_open()?;
        self.inner.tracker.record_request(entity, location)
    }

    /// Requests of `entity` within the trailing window.
    pub fn current_load(&self, entity: &str) -> Result<u64> {
        self.ensure_open()?;
        Ok(self.inner.tracker.current_load(entity))
    }

    /// Cells summarizing where `entity`'s clients are.
    pub fn centroids(&self, entity: &str) -> Result<Option<Vec<CellID>>> {
        self.ensure_open()?;
        Ok(self.inner.index.centroids(entity))
    }

    pub fn weighted_centroids(&self, entity: &str) -> Result<Option<Vec<WeightedCentroid>>> {
        self.ensure_open()?;
        Ok(self.inner.index.weighted_centroids(entity))
    }

    /// Client distribution of `entity` as a GeoJSON FeatureCollection.
    pub fn client_distribution_geojson(&self, entity: &str) -> Result<Option<String>> {
        self.ensure_open()?;
        self.inner.index.client_distribution_geojson(entity)
    }

    pub fn load_breakdown(&self, entity: &str) -> Result<Option<Vec<LocationBucket>>> {
        self.ensure_open()?;
        Ok(self.inner.tracker.load_breakdown(entity))
    }

    pub fn set_explore_override(&self, entity: &str, cells: Vec<CellID>) -> Result<()> {
        self.ensure_open()?;
        self.inner.tracker.set_explore_override(entity, cells);
        Ok(())
    }

    /// Returns whether an override was in place.
    pub fn clear_explore_override(&self, entity: &str) -> Result<bool> {
        self.ensure_open()?;
        Ok(self.inner.tracker.clear_explore_override(entity))
    }

    pub fn index_stats(&self) -> Result<IndexStats> {
        self.ensure_open()?;
        Ok(self.inner.index.stats())
    }

    pub fn load_stats(&self) -> Result<LoadStats> {
        self.ensure_open()?;
        Ok(self.inner.tracker.stats())
    }

    /// Stop the background tasks and reject further calls.
    ///
    /// Pending expirations are discarded, so loads freeze at their current
    /// values. Closing twice returns `EngineClosed`.
    pub fn close(&self) -> Result<()> {
        if self.inner.closed.swap(true, Ordering::AcqRel) {
            return Err(GeoLoadError::EngineClosed);
        }
        self.inner.scheduler.shutdown();
        log::debug!("Engine closed");
        Ok(())
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    fn ensure_open(&self) -> Result<()> {
        if self.is_closed() {
            return Err(GeoLoadError::EngineClosed);
        }
        Ok(())
    }
}
