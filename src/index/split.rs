//! Splitting overloaded leaves into finer children.

use super::cell::{Buckets, Children, GeoCell};
use super::collection::CellCollection;
use crate::compute::cells::child_at;
use rustc_hash::FxHashMap;
use s2::cellid::CellID;
use std::collections::VecDeque;

impl CellCollection {
    /// Split `id` and, breadth-first, any child that is still over
    /// `split_threshold`, never going below `max_level`.
    ///
    /// The cell is re-validated first: a trigger that went stale (the cell
    /// was merged away, or dropped back under the threshold) splits nothing.
    /// Returns the number of cells split.
    pub(crate) fn split_cascade(&mut self, id: CellID, split_threshold: u64, max_level: u64) -> usize {
        let mut queue = VecDeque::from([id]);
        let mut split = 0;

        while let Some(id) = queue.pop_front() {
            let Some(cell) = self.cell_mut(&id) else {
                log::debug!("Skipping split of {}: cell no longer exists", id.to_token());
                continue;
            };
            if !cell.is_leaf() || cell.client_count() <= split_threshold || cell.level() >= max_level {
                log::debug!("Skipping split of {}: no longer eligible", id.to_token());
                continue;
            }

            let groups = partition(&id, cell.take_buckets());
            let children: Children = groups.keys().copied().collect();
            cell.set_children(children);
            self.deactivate(&id);

            for (child_id, buckets) in groups {
                let mut child = GeoCell::new(child_id);
                child.absorb(buckets);
                if child.client_count() > split_threshold && child.level() < max_level {
                    queue.push_back(child_id);
                }
                self.insert_leaf(child);
            }

            split += 1;
        }

        split
    }
}

/// Group a leaf's buckets by the child cell (one level down) containing each
/// bucket's representative location.
fn partition(parent: &CellID, buckets: Buckets) -> FxHashMap<CellID, Buckets> {
    let mut groups: FxHashMap<CellID, Buckets> = FxHashMap::default();
    for (key, entry) in buckets {
        let child = child_at(&entry.location, parent);
        groups.entry(child).or_default().insert(key, entry);
    }
    groups
}
