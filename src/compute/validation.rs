//! Validation for request locations and entity identifiers.
//!
//! Every rejection is an `InvalidInput` whose message reads
//! "<what> must <rule>, got <value>".

use crate::error::{GeoLoadError, Result};
use geo::Point;

/// Checks that a request location is a finite longitude/latitude pair
/// within [-180, 180] x [-90, 90].
///
/// ```
/// use geoload::compute::validation::validate_geographic_point;
/// use geo::Point;
///
/// assert!(validate_geographic_point(&Point::new(-74.0060, 40.7128)).is_ok());
/// assert!(validate_geographic_point(&Point::new(200.0, 40.0)).is_err());
/// assert!(validate_geographic_point(&Point::new(-74.0, f64::NAN)).is_err());
/// ```
pub fn validate_geographic_point(point: &Point) -> Result<()> {
    check_coordinate("longitude", point.x(), 180.0)?;
    check_coordinate("latitude", point.y(), 90.0)
}

/// Checks that an entity (deployment) id is not blank.
///
/// ```
/// use geoload::compute::validation::validate_entity;
///
/// assert!(validate_entity("svc-a").is_ok());
/// assert!(validate_entity("").is_err());
/// assert!(validate_entity("   ").is_err());
/// ```
pub fn validate_entity(entity: &str) -> Result<()> {
    if entity.trim().is_empty() {
        return Err(invalid("entity id", "not be blank", &format!("{:?}", entity)));
    }
    Ok(())
}

fn check_coordinate(name: &str, value: f64, bound: f64) -> Result<()> {
    if !value.is_finite() {
        return Err(invalid(name, "be finite", &value.to_string()));
    }
    if value.abs() > bound {
        return Err(invalid(
            name,
            &format!("lie within [-{bound}, {bound}]"),
            &value.to_string(),
        ));
    }
    Ok(())
}

fn invalid(what: &str, rule: &str, got: &str) -> GeoLoadError {
    GeoLoadError::InvalidInput(format!("{what} must {rule}, got {got}"))
}
