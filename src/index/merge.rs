//! Collapsing underloaded subtrees back into their parent.

use super::cell::{Buckets, Children};
use super::collection::CellCollection;
use s2::cellid::CellID;
use std::collections::VecDeque;

impl CellCollection {
    /// One merge sweep over every top cell.
    ///
    /// Internal cells are collected breadth-first and evaluated deepest
    /// first, so a parent always sees children that already collapsed. A
    /// candidate merges when all its children are leaves holding fewer than
    /// `merge_threshold` clients in total. Returns the merged cells.
    pub(crate) fn merge_sweep(&mut self, merge_threshold: u64) -> Vec<CellID> {
        let mut merged = Vec::new();

        for top in self.top_cells() {
            for candidate in self.internal_cells(top).into_iter().rev() {
                if self.try_merge(candidate, merge_threshold) {
                    merged.push(candidate);
                }
            }
        }

        merged
    }

    /// Every internal cell under (and including) `top`, breadth-first.
    fn internal_cells(&mut self, top: CellID) -> Vec<CellID> {
        let mut internal = Vec::new();
        let mut frontier = VecDeque::from([(top, None)]);

        while let Some((id, parent)) = frontier.pop_front() {
            let cell = self.expect_cell_mut(&id, parent.as_ref());
            if !cell.is_leaf() {
                frontier.extend(cell.children().iter().map(|child| (*child, Some(id))));
                internal.push(id);
            }
        }

        internal
    }

    fn try_merge(&mut self, id: CellID, merge_threshold: u64) -> bool {
        let children: Children = self.expect_cell_mut(&id, None).children().into();

        let mut total = 0;
        for child in &children {
            let cell = self.expect_cell_mut(child, Some(&id));
            if !cell.is_leaf() {
                return false;
            }
            total += cell.client_count();
        }
        if total >= merge_threshold {
            return false;
        }

        let mut folded = Buckets::default();
        for child in &children {
            for (key, entry) in self.remove_leaf(child, &id).take_buckets() {
                match folded.get_mut(&key) {
                    Some(existing) => existing.count += entry.count,
                    None => {
                        folded.insert(key, entry);
                    }
                }
            }
        }

        let cell = self.expect_cell_mut(&id, None);
        cell.take_children();
        cell.absorb(folded);
        self.activate(id);

        log::debug!(
            "Merged {} children into {} ({} clients)",
            children.len(),
            id.to_token(),
            total
        );
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compute::cells::{bucket_of, cell_center};
    use geo::Point;

    const TOP: u64 = 8;
    const MAX: u64 = 16;

    fn fill(collection: &mut CellCollection, location: &Point, amount: u64) -> CellID {
        let (key, representative) = bucket_of(location, 9).unwrap();
        let leaf = collection.cover(&representative, TOP, MAX);
        collection
            .cell_mut(&leaf)
            .unwrap()
            .add(&key, representative, amount);
        leaf
    }

    fn drain(collection: &mut CellCollection, location: &Point, amount: u64) {
        let (key, representative) = bucket_of(location, 9).unwrap();
        let leaf = collection.cover(&representative, TOP, MAX);
        collection.cell_mut(&leaf).unwrap().remove(&key, amount);
    }

    #[test]
    fn test_deep_tree_collapses_in_one_sweep() {
        let mut collection = CellCollection::new();
        let here = Point::new(151.2093, -33.8688);
        let top = fill(&mut collection, &here, 301);
        collection.split_cascade(top, 300, MAX);
        assert_eq!(collection.len() as u64, MAX - TOP + 1);

        drain(&mut collection, &here, 301);
        let merged = collection.merge_sweep(200);

        assert_eq!(merged.len() as u64, MAX - TOP);
        assert_eq!(merged.last(), Some(&top));
        assert_eq!(collection.active_cells(), vec![top]);
        assert_eq!(collection.len(), 1);
        assert!(collection.check_invariants().is_ok());
    }

    #[test]
    fn test_merge_keeps_counts() {
        let mut collection = CellCollection::new();
        let top = collection.cover(&Point::new(-74.0060, 40.7128), TOP, MAX);
        for child in top.children() {
            fill(&mut collection, &cell_center(&child), 80);
        }
        collection.split_cascade(top, 300, MAX);
        assert_eq!(collection.active_len(), 4);

        for child in top.children() {
            drain(&mut collection, &cell_center(&child), 40);
        }
        // 4 * 40 = 160 < 200
        assert_eq!(collection.merge_sweep(200), vec![top]);
        assert_eq!(collection.client_count(), 160);
        assert_eq!(collection.cell_mut(&top).unwrap().buckets().len(), 4);
        assert!(collection.check_invariants().is_ok());
    }

    #[test]
    fn test_hysteresis_band_is_left_alone() {
        let mut collection = CellCollection::new();
        let top = collection.cover(&Point::new(-74.0060, 40.7128), TOP, MAX);
        for child in top.children() {
            fill(&mut collection, &cell_center(&child), 80);
        }
        collection.split_cascade(top, 300, MAX);
        for child in top.children() {
            drain(&mut collection, &cell_center(&child), 25);
        }

        // 4 * 55 = 220: between the low and high water marks
        assert!(collection.merge_sweep(200).is_empty());
        assert_eq!(collection.active_len(), 4);
        assert_eq!(collection.split_cascade(top, 300, MAX), 0);
        assert!(collection.check_invariants().is_ok());
    }

    #[test]
    fn test_parent_waits_for_internal_child() {
        let mut collection = CellCollection::new();
        let busy = Point::new(-74.0060, 40.7128);
        let top = fill(&mut collection, &busy, 301);
        collection.split_cascade(top, 300, MAX);

        // Subtree stays above the low-water mark: nothing may merge
        assert!(collection.merge_sweep(200).is_empty());
        assert_eq!(collection.len() as u64, MAX - TOP + 1);
        assert!(collection.check_invariants().is_ok());
    }
}
