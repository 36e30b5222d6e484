use crate::topology::Topology;
use geo::MultiPolygon;
use serde::{Deserialize, Serialize};

/// One row of the education payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttainmentRecord {
    pub fips: u32,
    pub state: String,
    pub area_name: String,
    #[serde(rename = "bachelorsOrHigher")]
    pub bachelors_or_higher: f64,
}

/// A county shape pulled out of the topology's `counties` collection.
#[derive(Debug, Clone)]
pub struct County {
    /// `None` when the topology geometry carries no numeric id; such a county never joins.
    pub fips: Option<u32>,
    pub geometry: MultiPolygon<f64>,
}

/// Everything one render pass needs. Built once per load and never patched.
#[derive(Debug, Clone)]
pub struct MapViewModel {
    pub records: Vec<AttainmentRecord>,
    pub topology: Topology,
}

impl MapViewModel {
    pub fn new(records: Vec<AttainmentRecord>, topology: Topology) -> Self {
        Self { records, topology }
    }
}
