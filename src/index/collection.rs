//! Per-entity cell collection.
//!
//! `cells` holds every cell (top, internal, leaf) for O(1) lookup during
//! traversal, `top_cells` the coarse roots created so far, and `active_cells`
//! exactly the current leaves.

use super::cell::{CellSlot, GeoCell};
use crate::compute::cells::{cell_at, child_at};
use geo::Point;
use parking_lot::{Mutex, RwLock};
use rustc_hash::{FxHashMap, FxHashSet};
use s2::cellid::CellID;

/// Outcome of a read-only descent towards the leaf covering a location.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Lookup {
    /// The leaf (or deepest allowed cell) covering the location
    Leaf(CellID),
    /// No cell covers the location yet; creating one needs the write posture
    Uncovered,
}

#[derive(Debug, Default)]
pub struct CellCollection {
    top_cells: FxHashSet<CellID>,
    cells: FxHashMap<CellID, CellSlot>,
    active_cells: FxHashSet<CellID>,
}

impl CellCollection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of cells, internal ones included.
    pub(crate) fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn active_len(&self) -> usize {
        self.active_cells.len()
    }

    pub fn is_active(&self, id: &CellID) -> bool {
        self.active_cells.contains(id)
    }

    pub fn slot(&self, id: &CellID) -> Option<&CellSlot> {
        self.cells.get(id)
    }

    /// Sorted snapshot of the current leaves.
    pub fn active_cells(&self) -> Vec<CellID> {
        let mut active: Vec<CellID> = self.active_cells.iter().copied().collect();
        active.sort_by_key(|id| id.0);
        active
    }

    /// Sorted snapshot of the top cells.
    pub fn top_cells(&self) -> Vec<CellID> {
        let mut tops: Vec<CellID> = self.top_cells.iter().copied().collect();
        tops.sort_by_key(|id| id.0);
        tops
    }

    /// Sum of all leaf counts.
    pub fn client_count(&self) -> u64 {
        self.active_cells
            .iter()
            .filter_map(|id| self.cells.get(id))
            .map(|slot| slot.lock().client_count())
            .sum()
    }

    /// Descend from the top cell covering `location` to its leaf.
    ///
    /// Stops at `max_level` even if the cell there has children.
    pub(crate) fn locate(&self, location: &Point, top_level: u64, max_level: u64) -> Lookup {
        let mut id = cell_at(location, top_level);
        if !self.cells.contains_key(&id) {
            return Lookup::Uncovered;
        }

        let mut parent = None;
        loop {
            let cell = self.expect_slot(&id, parent.as_ref()).lock();
            if cell.is_leaf() || cell.level() >= max_level {
                return Lookup::Leaf(id);
            }

            let child = child_at(location, &id);
            if !cell.children().contains(&child) {
                return Lookup::Uncovered;
            }
            parent = Some(id);
            id = child;
        }
    }

    /// Create the cells missing on the path from the top cell to the leaf
    /// covering `location`, and return that leaf.
    ///
    /// Creation is idempotent: cells that already exist are reused, so
    /// concurrent callers racing to cover the same region produce one path.
    pub(crate) fn cover(&mut self, location: &Point, top_level: u64, max_level: u64) -> CellID {
        let top = cell_at(location, top_level);
        if !self.cells.contains_key(&top) {
            log::debug!("Creating top cell {} at level {}", top.to_token(), top_level);
            self.top_cells.insert(top);
            self.insert_leaf(GeoCell::new(top));
        }

        let mut id = top;
        let mut parent = None;
        loop {
            let cell = self.expect_cell_mut(&id, parent.as_ref());
            if cell.is_leaf() || cell.level() >= max_level {
                return id;
            }

            let child = child_at(location, &id);
            if !cell.children().contains(&child) {
                cell.push_child(child);
                self.insert_leaf(GeoCell::new(child));
            }
            parent = Some(id);
            id = child;
        }
    }

    /// Add a brand new leaf to `cells` and `active_cells`.
    pub(crate) fn insert_leaf(&mut self, cell: GeoCell) {
        let id = cell.id();
        if self.cells.insert(id, Mutex::new(cell)).is_some() {
            panic!(
                "cell {} created twice; the index is corrupted",
                id.to_token()
            );
        }
        self.active_cells.insert(id);
    }

    /// Remove a leaf from `cells` and `active_cells`, returning it.
    pub(crate) fn remove_leaf(&mut self, id: &CellID, parent: &CellID) -> GeoCell {
        let slot = self.cells.remove(id).unwrap_or_else(|| missing_child(id, Some(parent)));
        self.active_cells.remove(id);
        slot.into_inner()
    }

    pub(crate) fn activate(&mut self, id: CellID) {
        self.active_cells.insert(id);
    }

    pub(crate) fn deactivate(&mut self, id: &CellID) {
        self.active_cells.remove(id);
    }

    pub(crate) fn cell_mut(&mut self, id: &CellID) -> Option<&mut GeoCell> {
        self.cells.get_mut(id).map(|slot| slot.get_mut())
    }

    /// Mutable access to a cell that must exist; `parent` names the cell
    /// that referenced it, if any.
    pub(crate) fn expect_cell_mut(&mut self, id: &CellID, parent: Option<&CellID>) -> &mut GeoCell {
        match self.cells.get_mut(id) {
            Some(slot) => slot.get_mut(),
            None => missing_child(id, parent),
        }
    }

    pub(crate) fn expect_slot(&self, id: &CellID, parent: Option<&CellID>) -> &CellSlot {
        match self.cells.get(id) {
            Some(slot) => slot,
            None => missing_child(id, parent),
        }
    }

    /// Verify the structural invariants of the collection.
    ///
    /// - every child referenced by a parent exists, one level deeper
    /// - internal cells carry no counts
    /// - `active_cells` is exactly the set of leaves
    /// - every cell is reachable from a top cell
    pub fn check_invariants(&self) -> Result<(), String> {
        let mut reachable = FxHashSet::default();
        let mut frontier: Vec<CellID> = self.top_cells.iter().copied().collect();

        while let Some(id) = frontier.pop() {
            let Some(slot) = self.cells.get(&id) else {
                return Err(format!("cell {} is referenced but missing", id.to_token()));
            };
            if !reachable.insert(id) {
                return Err(format!("cell {} is reachable twice", id.to_token()));
            }

            let cell = slot.lock();
            if cell.is_leaf() {
                if !self.active_cells.contains(&id) {
                    return Err(format!("leaf {} is not active", id.to_token()));
                }
                let bucket_sum: u64 = cell.buckets().values().map(|b| b.count).sum();
                if bucket_sum != cell.client_count() {
                    return Err(format!(
                        "leaf {} counts {} clients but its buckets hold {}",
                        id.to_token(),
                        cell.client_count(),
                        bucket_sum
                    ));
                }
            } else {
                if self.active_cells.contains(&id) {
                    return Err(format!("internal cell {} is active", id.to_token()));
                }
                if cell.client_count() != 0 || !cell.buckets().is_empty() {
                    return Err(format!("internal cell {} holds counts", id.to_token()));
                }
                for child in cell.children() {
                    if child.level() != id.level() + 1 || !id.contains(child) {
                        return Err(format!(
                            "cell {} is not a child of {}",
                            child.to_token(),
                            id.to_token()
                        ));
                    }
                    frontier.push(*child);
                }
            }
        }

        if reachable.len() != self.cells.len() {
            return Err(format!(
                "{} cells exist but only {} are reachable",
                self.cells.len(),
                reachable.len()
            ));
        }

        if self.active_cells.iter().any(|id| !reachable.contains(id)) {
            return Err("an active cell is not part of the tree".to_string());
        }

        Ok(())
    }
}

/// A parent references a child that is not in the collection. Only a
/// concurrency bug gets here, and continuing would lose counts silently.
#[cold]
fn missing_child(id: &CellID, parent: Option<&CellID>) -> ! {
    match parent {
        Some(parent) => panic!(
            "cell {} references child {} which is missing; the index is corrupted",
            parent.to_token(),
            id.to_token()
        ),
        None => panic!("cell {} is missing; the index is corrupted", id.to_token()),
    }
}

/// The {data, lock} pair for one entity: the structural lock over its cell
/// collection plus the set of leaves already scheduled for splitting.
#[derive(Debug, Default)]
pub struct EntityCells {
    pub(crate) structure: RwLock<CellCollection>,
    pub(crate) pending_splits: Mutex<FxHashSet<CellID>>,
}

impl EntityCells {
    pub fn new() -> Self {
        Self::default()
    }
}
