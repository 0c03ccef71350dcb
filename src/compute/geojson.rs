//! GeoJSON export of client distributions.

use crate::compute::cells::cell_vertices;
use crate::error::{GeoLoadError, Result};
use geojson::{Feature, FeatureCollection, Geometry, JsonObject, Value};
use geoload_types::centroid::WeightedCentroid;
use s2::cellid::CellID;

/// Converts weighted centroids into a GeoJSON `FeatureCollection` string.
///
/// Each centroid becomes one polygon feature covering its cell, with the
/// cell token, level and client count as properties.
pub fn distribution_to_geojson(centroids: &[WeightedCentroid]) -> Result<String> {
    let features = centroids.iter().map(centroid_feature).collect();

    let collection = FeatureCollection {
        bbox: None,
        features,
        foreign_members: None,
    };

    serde_json::to_string(&collection).map_err(|e| {
        GeoLoadError::SerializationErrorWithContext(format!(
            "Failed to serialize client distribution: {}",
            e
        ))
    })
}

fn centroid_feature(centroid: &WeightedCentroid) -> Feature {
    let cell = CellID(centroid.cell_id);

    let mut ring: Vec<Vec<f64>> = cell_vertices(&cell)
        .iter()
        .map(|p| vec![p.x(), p.y()])
        .collect();
    // GeoJSON rings are closed
    ring.push(ring[0].clone());

    let mut properties = JsonObject::new();
    properties.insert("cell".to_string(), cell.to_token().into());
    properties.insert("level".to_string(), centroid.level.into());
    properties.insert("count".to_string(), centroid.count.into());
    properties.insert(
        "center".to_string(),
        vec![centroid.center.x(), centroid.center.y()].into(),
    );

    Feature {
        bbox: None,
        geometry: Some(Geometry::new(Value::Polygon(vec![ring]))),
        id: None,
        properties: Some(properties),
        foreign_members: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compute::cells::{cell_at, cell_center};
    use geo::Point;

    #[test]
    fn test_distribution_to_geojson() {
        let cell = cell_at(&Point::new(-74.0060, 40.7128), 12);
        let centroid = WeightedCentroid::new(cell.0, 12, cell_center(&cell), 42);

        let json = distribution_to_geojson(&[centroid]).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&json).unwrap();

        assert_eq!(parsed["type"], "FeatureCollection");
        let feature = &parsed["features"][0];
        assert_eq!(feature["geometry"]["type"], "Polygon");
        assert_eq!(feature["properties"]["count"], 42);
        assert_eq!(feature["properties"]["level"], 12);
        assert_eq!(feature["properties"]["cell"], cell.to_token());

        let ring = feature["geometry"]["coordinates"][0].as_array().unwrap();
        assert_eq!(ring.len(), 5);
        assert_eq!(ring[0], ring[4]);
    }

    #[test]
    fn test_empty_distribution() {
        let json = distribution_to_geojson(&[]).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed["features"].as_array().unwrap().len(), 0);
    }
}
