//! A single geo-cell and its client counters.

use geo::Point;
use geoload_types::bucket::LocationBucket;
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use s2::cellid::CellID;
use smallvec::SmallVec;

/// Child ids of a cell. An S2 cell has at most four children.
pub type Children = SmallVec<[CellID; 4]>;

/// Bucket table of a cell, keyed by bucket key.
pub type Buckets = FxHashMap<String, BucketEntry>;

/// A cell guarded by its own counter lock.
///
/// Counters are mutated through the lock while the owning collection is only
/// read-locked; membership of the collection never changes in that posture.
pub type CellSlot = Mutex<GeoCell>;

/// Clients attributed to one location bucket.
#[derive(Debug, Clone, PartialEq)]
pub struct BucketEntry {
    pub location: Point,
    pub count: u64,
}

/// A region of the globe at one subdivision level.
///
/// Internal cells (non-empty `children`) carry no counts; leaves are the sole
/// authority for the clients in their region.
#[derive(Debug)]
pub struct GeoCell {
    id: CellID,
    client_count: u64,
    buckets: Buckets,
    children: Children,
}

impl GeoCell {
    pub fn new(id: CellID) -> Self {
        Self {
            id,
            client_count: 0,
            buckets: Buckets::default(),
            children: Children::new(),
        }
    }

    pub fn id(&self) -> CellID {
        self.id
    }

    pub fn level(&self) -> u64 {
        self.id.level()
    }

    pub fn client_count(&self) -> u64 {
        self.client_count
    }

    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    pub fn children(&self) -> &[CellID] {
        &self.children
    }

    pub fn buckets(&self) -> &Buckets {
        &self.buckets
    }

    /// Attribute `amount` clients to bucket `key`.
    pub fn add(&mut self, key: &str, location: Point, amount: u64) {
        debug_assert!(self.is_leaf(), "counts only live at leaves");

        match self.buckets.get_mut(key) {
            Some(entry) => entry.count += amount,
            None => {
                self.buckets.insert(
                    key.to_string(),
                    BucketEntry {
                        location,
                        count: amount,
                    },
                );
            }
        }
        self.client_count += amount;
    }

    /// Take up to `amount` clients away from bucket `key`.
    ///
    /// Returns how many were actually removed; a bucket that drops to zero is
    /// deleted.
    pub fn remove(&mut self, key: &str, amount: u64) -> u64 {
        let Some(entry) = self.buckets.get_mut(key) else {
            return 0;
        };

        let removed = amount.min(entry.count);
        entry.count -= removed;
        if entry.count == 0 {
            self.buckets.remove(key);
        }

        self.client_count -= removed;
        removed
    }

    /// Fold a bucket table into this cell.
    pub fn absorb(&mut self, buckets: Buckets) {
        for (key, entry) in buckets {
            self.add(&key, entry.location, entry.count);
        }
    }

    /// Empty the cell's counters, handing the buckets to the caller.
    pub(crate) fn take_buckets(&mut self) -> Buckets {
        self.client_count = 0;
        std::mem::take(&mut self.buckets)
    }

    pub(crate) fn set_children(&mut self, children: Children) {
        debug_assert!(self.client_count == 0 && self.buckets.is_empty());
        self.children = children;
    }

    pub(crate) fn push_child(&mut self, child: CellID) {
        self.children.push(child);
    }

    pub(crate) fn take_children(&mut self) -> Children {
        std::mem::take(&mut self.children)
    }

    pub fn snapshot(&self) -> CellSnapshot {
        let mut buckets: Vec<LocationBucket> = self
            .buckets
            .iter()
            .map(|(key, entry)| LocationBucket::new(key.clone(), entry.location, entry.count))
            .collect();
        buckets.sort_by(|a, b| a.key.cmp(&b.key));

        CellSnapshot {
            id: self.id,
            level: self.level(),
            client_count: self.client_count,
            children: self.children.to_vec(),
            buckets,
        }
    }
}

/// Point-in-time copy of a cell, for inspection and debug endpoints.
#[derive(Debug, Clone, PartialEq)]
pub struct CellSnapshot {
    pub id: CellID,
    pub level: u64,
    pub client_count: u64,
    pub children: Vec<CellID>,
    pub buckets: Vec<LocationBucket>,
}

impl CellSnapshot {
    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compute::cells::cell_at;

    fn leaf() -> GeoCell {
        GeoCell::new(cell_at(&Point::new(-74.0060, 40.7128), 12))
    }

    #[test]
    fn test_add_and_remove() {
        let mut cell = leaf();
        let here = Point::new(-74.0060, 40.7128);

        cell.add("dr5regw3p", here, 3);
        cell.add("dr5regw3p", here, 2);
        cell.add("dr5regw3q", here, 1);
        assert_eq!(cell.client_count(), 6);
        assert_eq!(cell.buckets().len(), 2);

        assert_eq!(cell.remove("dr5regw3p", 4), 4);
        assert_eq!(cell.client_count(), 2);
        assert_eq!(cell.buckets()["dr5regw3p"].count, 1);
    }

    #[test]
    fn test_remove_deletes_empty_bucket() {
        let mut cell = leaf();
        cell.add("dr5regw3p", Point::new(-74.0060, 40.7128), 2);

        // Over-removal is clamped to what the bucket holds
        assert_eq!(cell.remove("dr5regw3p", 10), 2);
        assert!(cell.buckets().is_empty());
        assert_eq!(cell.client_count(), 0);

        assert_eq!(cell.remove("unknown", 1), 0);
    }

    #[test]
    fn test_take_and_absorb() {
        let mut source = leaf();
        let mut target = leaf();
        let here = Point::new(-74.0060, 40.7128);
        source.add("a", here, 5);
        source.add("b", here, 7);
        target.add("a", here, 1);

        let buckets = source.take_buckets();
        assert_eq!(source.client_count(), 0);
        assert!(source.buckets().is_empty());

        target.absorb(buckets);
        assert_eq!(target.client_count(), 13);
        assert_eq!(target.buckets()["a"].count, 6);
    }

    #[test]
    fn test_snapshot_is_sorted() {
        let mut cell = leaf();
        let here = Point::new(-74.0060, 40.7128);
        cell.add("c", here, 1);
        cell.add("a", here, 1);
        cell.add("b", here, 1);

        let snapshot = cell.snapshot();
        let keys: Vec<_> = snapshot.buckets.iter().map(|b| b.key.as_str()).collect();
        assert_eq!(keys, vec!["a", "b", "c"]);
        assert!(snapshot.is_leaf());
        assert_eq!(snapshot.level, 12);
    }
}
