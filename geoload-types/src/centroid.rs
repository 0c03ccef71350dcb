use geo::Point;
use serde::{Deserialize, Serialize};

/// An active cell reported as a representative client location.
///
/// `center` is the geometric center of the cell; `count` is the number of
/// clients currently attributed to it, so consumers can weigh centroids by
/// client mass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeightedCentroid {
    /// Raw 64-bit cell identifier
    pub cell_id: u64,
    /// Subdivision level of the cell
    pub level: u64,
    /// Geometric center of the cell
    pub center: Point<f64>,
    /// Clients attributed to the cell
    pub count: u64,
}

impl WeightedCentroid {
    pub fn new(cell_id: u64, level: u64, center: Point<f64>, count: u64) -> Self {
        Self {
            cell_id,
            level,
            center,
            count,
        }
    }
}

