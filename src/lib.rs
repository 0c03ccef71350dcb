//! Geo-aware request load tracking with a self-splitting cell index.
//!
//! Every request recorded for an entity (a deployment) lands in a decaying
//! window and in a per-entity tree of S2 cells. Busy cells split into finer
//! ones, quiet subtrees merge back, and the current leaves summarize where
//! the entity's clients are.
//!
//! ```rust
//! use geoload::{Engine, Point};
//!
//! let engine = Engine::builder().split_threshold(50).merge_threshold(20).build()?;
//!
//! let nyc = Point::new(-74.0060, 40.7128);
//! for _ in 0..51 {
//!     engine.record_request("svc-a", &nyc)?;
//! }
//!
//! assert_eq!(engine.current_load("svc-a")?, 51);
//! let centroids = engine.centroids("svc-a")?.unwrap_or_default();
//! assert_eq!(centroids.len(), 1);
//! # Ok::<(), geoload::GeoLoadError>(())
//! ```

pub mod builder;
pub mod compute;
pub mod config;
pub mod engine;
pub mod error;
pub mod index;
pub mod rate;
pub mod scheduler;

pub use builder::EngineBuilder;
pub use config::Config;
pub use engine::Engine;
pub use error::{GeoLoadError, Result};

pub type GeoLoad = Engine;

pub use geo::Point;
pub use s2::cellid::CellID;

pub use index::{CellSnapshot, SpatialIndexManager};
pub use rate::RequestRateTracker;
pub use scheduler::{Scheduler, SchedulerHandle};

pub use geoload_types::bucket::LocationBucket;
pub use geoload_types::centroid::WeightedCentroid;
pub use geoload_types::stats::{IndexStats, LoadStats};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Common imports
pub mod prelude {

    pub use crate::{Config, Engine, EngineBuilder, GeoLoad, GeoLoadError, Result};

    pub use crate::{CellID, Point};

    pub use crate::{LocationBucket, WeightedCentroid};

    pub use std::time::Duration;
}
