//! Request counts for one window or sub-interval.

use crate::index::BucketEntry;
use geo::Point;
use geoload_types::bucket::LocationBucket;
use rustc_hash::FxHashMap;

/// A request total plus its breakdown by location bucket.
///
/// The breakdown lets an expiring sub-interval subtract exactly what it
/// contributed, both from the window and from the spatial index.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WindowCount {
    total: u64,
    locations: FxHashMap<String, BucketEntry>,
}

impl WindowCount {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn total(&self) -> u64 {
        self.total
    }

    pub fn is_empty(&self) -> bool {
        self.total == 0
    }

    pub fn record(&mut self, key: &str, location: Point, amount: u64) {
        match self.locations.get_mut(key) {
            Some(entry) => entry.count += amount,
            None => {
                self.locations.insert(
                    key.to_string(),
                    BucketEntry {
                        location,
                        count: amount,
                    },
                );
            }
        }
        self.total += amount;
    }

    /// Remove another count's contribution, never going below zero.
    pub fn subtract(&mut self, other: &WindowCount) {
        for (key, expired) in &other.locations {
            if let Some(entry) = self.locations.get_mut(key) {
                entry.count = entry.count.saturating_sub(expired.count);
                if entry.count == 0 {
                    self.locations.remove(key);
                }
            }
        }
        self.total = self.total.saturating_sub(other.total);
    }

    pub fn locations(&self) -> impl Iterator<Item = (&String, &BucketEntry)> {
        self.locations.iter()
    }

    /// Breakdown as buckets, busiest first.
    pub fn to_buckets(&self) -> Vec<LocationBucket> {
        let mut buckets: Vec<LocationBucket> = self
            .locations
            .iter()
            .map(|(key, entry)| LocationBucket::new(key.clone(), entry.location, entry.count))
            .collect();
        buckets.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.key.cmp(&b.key)));
        buckets
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn here() -> Point {
        Point::new(-74.0060, 40.7128)
    }

    #[test]
    fn test_record_and_subtract() {
        let mut window = WindowCount::new();
        let mut interval = WindowCount::new();

        window.record("a", here(), 5);
        window.record("b", here(), 2);
        interval.record("a", here(), 3);
        interval.record("b", here(), 2);

        window.subtract(&interval);
        assert_eq!(window.total(), 2);
        assert_eq!(window.to_buckets(), vec![LocationBucket::new("a", here(), 2)]);
    }

    #[test]
    fn test_subtract_saturates() {
        let mut window = WindowCount::new();
        let mut interval = WindowCount::new();
        window.record("a", here(), 1);
        interval.record("a", here(), 4);
        interval.record("z", here(), 4);

        window.subtract(&interval);
        assert_eq!(window.total(), 0);
        assert!(window.is_empty());
        assert!(window.to_buckets().is_empty());
    }

    #[test]
    fn test_buckets_sorted_by_count() {
        let mut window = WindowCount::new();
        window.record("low", here(), 1);
        window.record("high", here(), 9);
        window.record("mid", here(), 4);

        let keys: Vec<_> = window.to_buckets().into_iter().map(|b| b.key).collect();
        assert_eq!(keys, vec!["high", "mid", "low"]);
    }
}
