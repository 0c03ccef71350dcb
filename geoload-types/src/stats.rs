use serde::{Deserialize, Serialize};

/// Spatial index statistics
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexStats {
    /// Number of entities with a cell collection
    pub entities: usize,
    /// Total cells (top, internal and leaf) across all entities
    pub cells: usize,
    /// Total leaf cells across all entities
    pub active_cells: usize,
    /// Sum of all leaf counts
    pub tracked_clients: u64,
    /// Cells split since startup
    pub splits: u64,
    /// Cells merged back into their parent since startup
    pub merges: u64,
}

impl IndexStats {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Request window statistics
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadStats {
    /// Number of entities with counter state
    pub entities: usize,
    /// Sum of the current window totals
    pub window_total: u64,
    /// Requests recorded since startup
    pub recorded: u64,
    /// Rotated buckets waiting for their delayed subtraction
    pub pending_expirations: u64,
    /// Rotation passes performed since startup
    pub rotations: u64,
}

impl LoadStats {
    pub fn new() -> Self {
        Self::default()
    }
}
