use geo::Point;
use serde::{Deserialize, Serialize};

/// A location bucket: every request whose position falls in the same small
/// region shares one key and one representative location.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationBucket {
    /// Bucket key (a geohash)
    pub key: String,
    /// Representative location of the bucket (its center)
    pub location: Point<f64>,
    /// Number of requests currently attributed to the bucket
    pub count: u64,
}

impl LocationBucket {
    pub fn new(key: impl Into<String>, location: Point<f64>, count: u64) -> Self {
        Self {
            key: key.into(),
            location,
            count,
        }
    }
}
