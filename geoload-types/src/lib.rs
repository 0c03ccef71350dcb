//! # geoload-types
//!
//! Serializable data types shared between the geoload tracker and the
//! components that consume its output (placement goals, debug endpoints).
//!
//! - **Buckets**: `LocationBucket`, a location bucket and its live count
//! - **Centroids**: `WeightedCentroid`, an active cell with its client mass
//! - **Stats**: `IndexStats`, `LoadStats`
//!
//! All types are built on the `geo` crate's `Point` (x = longitude,
//! y = latitude).
//!
//! ```rust
//! use geoload_types::bucket::LocationBucket;
//! use geo::Point;
//!
//! let bucket = LocationBucket::new("dr5regw3p", Point::new(-74.0060, 40.7128), 3);
//! assert_eq!(bucket.count, 3);
//! ```

pub mod bucket;
pub mod centroid;
pub mod stats;
