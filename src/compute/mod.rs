//! Compute layer: geometry helpers that do not own any state.
//!
//! - Cell math (location to cell id, bucket keys, cell centers)
//! - Coordinate validation
//! - GeoJSON export of a client distribution

pub mod cells;
pub mod geojson;
pub mod validation;
