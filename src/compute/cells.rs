//! Cell and bucket math.
//!
//! Cells are S2 cell ids: a cell at level L contains exactly four children
//! at level L+1, which is the hierarchy the spatial index splits along.
//! Location buckets are geohashes; a bucket's representative location is the
//! center of its geohash cell.

use crate::error::{GeoLoadError, Result};
use geo::Point;
use s2::cell::Cell;
use s2::cellid::CellID;
use s2::latlng::LatLng;

/// The cell at `level` containing `location` (x = longitude, y = latitude).
///
/// ```
/// use geoload::compute::cells::cell_at;
/// use geo::Point;
///
/// let nyc = Point::new(-74.0060, 40.7128);
/// let coarse = cell_at(&nyc, 8);
/// let fine = cell_at(&nyc, 16);
/// assert_eq!(coarse.level(), 8);
/// assert!(coarse.contains(&fine));
/// ```
pub fn cell_at(location: &Point, level: u64) -> CellID {
    let latlng = LatLng::from_degrees(location.y(), location.x());
    CellID::from(&latlng).parent(level)
}

/// The child of `parent` (one level down) containing `location`.
pub fn child_at(location: &Point, parent: &CellID) -> CellID {
    cell_at(location, parent.level() + 1)
}

/// Geometric center of a cell.
pub fn cell_center(cell: &CellID) -> Point {
    let latlng = LatLng::from(cell);
    Point::new(latlng.lng.deg(), latlng.lat.deg())
}

/// Corner points of a cell, counter-clockwise.
pub fn cell_vertices(cell: &CellID) -> [Point; 4] {
    let cell = Cell::from(cell);
    let corner = |k: usize| {
        let latlng = LatLng::from(&cell.vertex(k));
        Point::new(latlng.lng.deg(), latlng.lat.deg())
    };
    [corner(0), corner(1), corner(2), corner(3)]
}

/// Bucket key and representative location for `location`.
///
/// ```
/// use geoload::compute::cells::bucket_of;
/// use geo::Point;
///
/// let (key, center) = bucket_of(&Point::new(-74.0060, 40.7128), 9)?;
/// assert_eq!(key.len(), 9);
/// assert!((center.x() - -74.0060).abs() < 0.001);
/// # Ok::<(), geoload::GeoLoadError>(())
/// ```
pub fn bucket_of(location: &Point, precision: usize) -> Result<(String, Point)> {
    let coord = geohash::Coord {
        x: location.x(),
        y: location.y(),
    };
    let key = geohash::encode(coord, precision).map_err(|e| {
        GeoLoadError::InvalidInput(format!("Cannot bucket location {:?}: {}", location, e))
    })?;
    let center = bucket_location(&key)?;
    Ok((key, center))
}

/// Representative location of a bucket key.
pub fn bucket_location(key: &str) -> Result<Point> {
    let (coord, _, _) = geohash::decode(key)
        .map_err(|e| GeoLoadError::InvalidInput(format!("Invalid bucket key {}: {}", key, e)))?;
    Ok(Point::new(coord.x, coord.y))
}
