//! Self-resizing spatial index of client locations.
//!
//! Each entity (deployment) owns a tree of S2 cells. Inserting a request
//! increments the leaf covering its location; a leaf that grows past the
//! split threshold is eagerly split into finer children, and a periodic
//! sweep merges subtrees that fell below the merge threshold back into their
//! parent. The current leaves are the entity's centroids.
//!
//! Locking is two-tier. Counter updates (`insert`, `remove`) hold the
//! entity's structural lock in read posture and the touched cell's own mutex;
//! any number of them proceed concurrently. Splits and merge sweeps hold the
//! structural lock in write posture for the whole operation.

mod cell;
mod collection;
mod merge;
mod split;

pub use cell::{BucketEntry, CellSnapshot, GeoCell};
pub use collection::{CellCollection, EntityCells};

use crate::compute::cells::{bucket_of, cell_center};
use crate::compute::geojson::distribution_to_geojson;
use crate::config::Config;
use crate::error::{GeoLoadError, Result};
use crate::scheduler::SchedulerHandle;
use collection::Lookup;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use geo::Point;
use geoload_types::centroid::WeightedCentroid;
use geoload_types::stats::IndexStats;
use parking_lot::{RwLockReadGuard, RwLockWriteGuard};
use s2::cellid::CellID;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

struct IndexInner {
    config: Config,
    entities: DashMap<String, Arc<EntityCells>>,
    overrides: DashMap<String, Vec<CellID>>,
    scheduler: Option<SchedulerHandle>,
    splits: AtomicU64,
    merges: AtomicU64,
}

/// Registry of per-entity cell collections.
///
/// Cheap to clone; clones share the same registry.
#[derive(Clone)]
pub struct SpatialIndexManager {
    inner: Arc<IndexInner>,
}

impl SpatialIndexManager {
    /// Create an index with default configuration and no background merging.
    pub fn new() -> Self {
        Self::build(Config::default(), None)
    }

    /// Create an index without background merging; callers drive
    /// [`merge_sweep`](Self::merge_sweep) themselves.
    ///
    /// Fails with `InvalidConfig` if `config` does not validate.
    pub fn with_config(config: Config) -> Result<Self> {
        config.validate().map_err(GeoLoadError::InvalidConfig)?;
        Ok(Self::build(config, None))
    }

    /// Create an index that starts a periodic merge sweep on `scheduler`
    /// for every entity it sees.
    pub fn with_scheduler(config: Config, scheduler: SchedulerHandle) -> Result<Self> {
        config.validate().map_err(GeoLoadError::InvalidConfig)?;
        Ok(Self::build(config, Some(scheduler)))
    }

    fn build(config: Config, scheduler: Option<SchedulerHandle>) -> Self {
        Self {
            inner: Arc::new(IndexInner {
                config,
                entities: DashMap::new(),
                overrides: DashMap::new(),
                scheduler,
                splits: AtomicU64::new(0),
                merges: AtomicU64::new(0),
            }),
        }
    }

    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    /// Record one client of `entity` at `location`.
    pub fn insert(&self, entity: &str, location: &Point) -> Result<()> {
        let (key, representative) = bucket_of(location, self.inner.config.bucket_precision)?;
        self.insert_bucket(entity, &key, &representative, 1);
        Ok(())
    }

    /// Forget up to `amount` clients of `entity` at `location`.
    ///
    /// Returns how many were actually removed. Never splits; a drained leaf
    /// waits for the next merge sweep.
    pub fn remove(&self, entity: &str, location: &Point, amount: u64) -> Result<u64> {
        let (key, representative) = bucket_of(location, self.inner.config.bucket_precision)?;
        Ok(self.remove_bucket(entity, &key, &representative, amount))
    }

    pub(crate) fn insert_bucket(&self, entity: &str, key: &str, representative: &Point, amount: u64) {
        let config = &self.inner.config;
        let cells = self.entity_or_create(entity);

        let (leaf, overloaded) = {
            let mut structure = cells.structure.read();
            loop {
                let lookup = structure.locate(representative, config.top_level, config.max_level);
                match lookup {
                    Lookup::Leaf(id) => {
                        let mut cell = structure.expect_slot(&id, None).lock();
                        cell.add(key, *representative, amount);
                        let overloaded = cell.client_count() > config.split_threshold
                            && cell.level() < config.max_level;
                        break (id, overloaded);
                    }
                    Lookup::Uncovered => {
                        drop(structure);
                        let mut writable = cells.structure.write();
                        writable.cover(representative, config.top_level, config.max_level);
                        structure = RwLockWriteGuard::downgrade(writable);
                    }
                }
            }
        };

        if overloaded && cells.pending_splits.lock().insert(leaf) {
            self.split(entity, &cells, leaf);
        }
    }

    pub(crate) fn remove_bucket(
        &self,
        entity: &str,
        key: &str,
        representative: &Point,
        amount: u64,
    ) -> u64 {
        let config = &self.inner.config;
        let Some(cells) = self.entity(entity) else {
            return 0;
        };

        let structure = cells.structure.read();
        match structure.locate(representative, config.top_level, config.max_level) {
            Lookup::Leaf(id) => structure.expect_slot(&id, None).lock().remove(key, amount),
            Lookup::Uncovered => {
                log::debug!("No cell of {} covers bucket {}", entity, key);
                0
            }
        }
    }

    fn split(&self, entity: &str, cells: &EntityCells, leaf: CellID) {
        let config = &self.inner.config;
        let mut structure = cells.structure.write();
        cells.pending_splits.lock().remove(&leaf);

        let split = structure.split_cascade(leaf, config.split_threshold, config.max_level);
        if split > 0 {
            self.inner.splits.fetch_add(split as u64, Ordering::Relaxed);
            log::debug!(
                "Split {} cell(s) under {} for {}; {} active cells",
                split,
                leaf.to_token(),
                entity,
                structure.active_len()
            );
        }
    }

    /// Run one merge sweep for `entity`. Returns the number of cells that
    /// became leaves again, or `None` for an unknown entity.
    pub fn merge_sweep(&self, entity: &str) -> Option<usize> {
        let cells = self.entity(entity)?;
        Some(self.sweep(entity, &cells))
    }

    /// Run one merge sweep for every entity. Returns the total merged.
    pub fn merge_all(&self) -> usize {
        self.snapshot_entities()
            .into_iter()
            .map(|(entity, cells)| self.sweep(&entity, &cells))
            .sum()
    }

    fn sweep(&self, entity: &str, cells: &EntityCells) -> usize {
        let mut structure = cells.structure.write();
        let merged = structure.merge_sweep(self.inner.config.merge_threshold);

        if !merged.is_empty() {
            let mut pending = cells.pending_splits.lock();
            pending.retain(|id| structure.is_active(id));

            self.inner
                .merges
                .fetch_add(merged.len() as u64, Ordering::Relaxed);
            log::debug!(
                "Merge sweep for {} collapsed {} cell(s); {} active cells",
                entity,
                merged.len(),
                structure.active_len()
            );
        }

        merged.len()
    }

    /// Current leaves of `entity`, or the explore override if one is set.
    ///
    /// Callers treat each cell's center as a representative client location.
    pub fn centroids(&self, entity: &str) -> Option<Vec<CellID>> {
        if let Some(cells) = self.inner.overrides.get(entity) {
            return Some(cells.clone());
        }

        let cells = self.entity(entity)?;
        let structure = cells.structure.read();
        Some(structure.active_cells())
    }

    /// Centroids with their center point and client count.
    ///
    /// Override cells carry no live counts and are reported with a count of
    /// one each, so they weigh equally.
    pub fn weighted_centroids(&self, entity: &str) -> Option<Vec<WeightedCentroid>> {
        if let Some(cells) = self.inner.overrides.get(entity) {
            return Some(
                cells
                    .iter()
                    .map(|id| WeightedCentroid::new(id.0, id.level(), cell_center(id), 1))
                    .collect(),
            );
        }

        let cells = self.entity(entity)?;
        let structure = cells.structure.read();
        Some(
            structure
                .active_cells()
                .iter()
                .map(|id| {
                    let count = structure.expect_slot(id, None).lock().client_count();
                    WeightedCentroid::new(id.0, id.level(), cell_center(id), count)
                })
                .collect(),
        )
    }

    /// Client distribution of `entity` as a GeoJSON FeatureCollection.
    pub fn client_distribution_geojson(&self, entity: &str) -> Result<Option<String>> {
        match self.weighted_centroids(entity) {
            Some(centroids) => Ok(Some(distribution_to_geojson(&centroids)?)),
            None => Ok(None),
        }
    }

    /// Answer centroid queries for `entity` from `cells` until cleared.
    pub fn set_explore_override(&self, entity: &str, cells: Vec<CellID>) {
        log::debug!("Exploring {} with {} candidate cells", entity, cells.len());
        self.inner.overrides.insert(entity.to_string(), cells);
    }

    /// Restore live centroids for `entity`. Returns whether an override was set.
    pub fn clear_explore_override(&self, entity: &str) -> bool {
        self.inner.overrides.remove(entity).is_some()
    }

    pub fn is_exploring(&self, entity: &str) -> bool {
        self.inner.overrides.contains_key(entity)
    }

    /// Sum of the leaf counts of `entity`.
    pub fn entity_client_count(&self, entity: &str) -> Option<u64> {
        let cells = self.entity(entity)?;
        let structure = cells.structure.read();
        Some(structure.client_count())
    }

    /// Top cells created for `entity` so far.
    pub fn top_cells(&self, entity: &str) -> Option<Vec<CellID>> {
        let cells = self.entity(entity)?;
        let structure = cells.structure.read();
        Some(structure.top_cells())
    }

    /// Copy of one cell of `entity`.
    pub fn cell(&self, entity: &str, id: &CellID) -> Option<CellSnapshot> {
        let cells = self.entity(entity)?;
        let structure = cells.structure.read();
        structure.slot(id).map(|slot| slot.lock().snapshot())
    }

    /// Check the structural invariants of `entity`'s tree.
    pub fn check_invariants(&self, entity: &str) -> Option<std::result::Result<(), String>> {
        let cells = self.entity(entity)?;
        let structure = cells.structure.read();
        Some(structure.check_invariants())
    }

    /// Entities with a cell collection, sorted.
    pub fn entities(&self) -> Vec<String> {
        let mut entities: Vec<String> = self
            .inner
            .entities
            .iter()
            .map(|entry| entry.key().clone())
            .collect();
        entities.sort();
        entities
    }

    pub fn stats(&self) -> IndexStats {
        let mut stats = IndexStats::new();
        for (_, cells) in self.snapshot_entities() {
            let structure: RwLockReadGuard<'_, CellCollection> = cells.structure.read();
            stats.entities += 1;
            stats.cells += structure.len();
            stats.active_cells += structure.active_len();
            stats.tracked_clients += structure.client_count();
        }
        stats.splits = self.inner.splits.load(Ordering::Relaxed);
        stats.merges = self.inner.merges.load(Ordering::Relaxed);
        stats
    }

    fn entity(&self, entity: &str) -> Option<Arc<EntityCells>> {
        self.inner.entities.get(entity).map(|cells| cells.clone())
    }

    // Clone the registry out so no shard lock is held while a structural
    // lock is taken.
    fn snapshot_entities(&self) -> Vec<(String, Arc<EntityCells>)> {
        self.inner
            .entities
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect()
    }

    fn entity_or_create(&self, entity: &str) -> Arc<EntityCells> {
        if let Some(cells) = self.entity(entity) {
            return cells;
        }

        let (cells, created) = match self.inner.entities.entry(entity.to_string()) {
            Entry::Occupied(existing) => (existing.get().clone(), false),
            Entry::Vacant(vacant) => {
                let cells = Arc::new(EntityCells::new());
                vacant.insert(cells.clone());
                (cells, true)
            }
        };

        if created {
            log::debug!("Tracking new entity {}", entity);
            self.start_merge_loop(entity, &cells);
        }
        cells
    }

    fn start_merge_loop(&self, entity: &str, cells: &Arc<EntityCells>) {
        let Some(scheduler) = &self.inner.scheduler else {
            return;
        };

        let index: Weak<IndexInner> = Arc::downgrade(&self.inner);
        let cells = Arc::downgrade(cells);
        let entity = entity.to_string();

        scheduler.schedule_every(self.inner.config.merge_interval(), move || {
            let (Some(inner), Some(cells)) = (index.upgrade(), cells.upgrade()) else {
                return false;
            };
            SpatialIndexManager { inner }.sweep(&entity, &cells);
            true
        });
    }
}

impl Default for SpatialIndexManager {
    fn default() -> Self {
        Self::new()
    }
}
