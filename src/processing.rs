use crate::path;
use crate::scale::ThresholdScale;
use crate::tooltip::tooltip_text;
use crate::types::{AttainmentRecord, County};
use geo::MultiPolygon;
use rayon::prelude::*;
use std::collections::HashMap;
use std::collections::hash_map::Entry;
use tracing::{debug, info, warn};

/// Records keyed by fips. The first record seen for a fips wins.
#[derive(Debug, Clone, Default)]
pub struct RecordIndex {
    by_fips: HashMap<u32, AttainmentRecord>,
    duplicates: usize,
}

impl RecordIndex {
    pub fn build(records: &[AttainmentRecord]) -> Self {
        let mut by_fips = HashMap::with_capacity(records.len());
        let mut duplicates = 0;
        for record in records {
            match by_fips.entry(record.fips) {
                Entry::Vacant(slot) => {
                    slot.insert(record.clone());
                }
                Entry::Occupied(_) => {
                    debug!(fips = record.fips, "Duplicate record ignored");
                    duplicates += 1;
                }
            }
        }
        Self { by_fips, duplicates }
    }

    pub fn get(&self, fips: u32) -> Option<&AttainmentRecord> {
        self.by_fips.get(&fips)
    }

    pub fn len(&self) -> usize {
        self.by_fips.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_fips.is_empty()
    }

    pub fn duplicates(&self) -> usize {
        self.duplicates
    }
}

/// Result of joining one county against the records. All three fields come
/// from the same lookup, so they are either all present or all absent.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Classification<'a> {
    pub record: Option<&'a AttainmentRecord>,
    pub value: Option<f64>,
    pub color: Option<&'static str>,
}

pub fn classify<'a>(
    fips: Option<u32>,
    index: &'a RecordIndex,
    scale: &ThresholdScale,
) -> Classification<'a> {
    let record = fips.and_then(|id| index.get(id));
    Classification {
        record,
        value: record.map(|r| r.bachelors_or_higher),
        color: record.and_then(|r| scale.color_of(r.bachelors_or_higher)),
    }
}

/// A county ready to draw.
#[derive(Debug, Clone)]
pub struct CountyShape {
    pub fips: Option<u32>,
    pub path: String,
    pub value: Option<f64>,
    pub fill: Option<&'static str>,
    pub tooltip: Option<String>,
    pub record: Option<AttainmentRecord>,
    pub geometry: MultiPolygon<f64>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct JoinStats {
    pub matched: usize,
    pub missing: usize,
    pub duplicates: usize,
}

pub fn join_counties(
    counties: Vec<County>,
    index: &RecordIndex,
    scale: &ThresholdScale,
) -> (Vec<CountyShape>, JoinStats) {
    info!("Joining {} counties against {} records...", counties.len(), index.len());

    let shapes: Vec<CountyShape> = counties
        .into_par_iter()
        .map(|county| {
            let class = classify(county.fips, index, scale);
            CountyShape {
                fips: county.fips,
                path: path::polygons(&county.geometry),
                value: class.value,
                fill: class.color,
                tooltip: class.record.map(tooltip_text),
                record: class.record.cloned(),
                geometry: county.geometry,
            }
        })
        .collect();

    let matched = shapes.iter().filter(|s| s.record.is_some()).count();
    let stats = JoinStats {
        matched,
        missing: shapes.len() - matched,
        duplicates: index.duplicates(),
    };

    if stats.missing > 0 {
        let missing: Vec<String> = shapes
            .iter()
            .filter(|s| s.record.is_none())
            .take(10)
            .map(|s| s.fips.map_or_else(|| "<no id>".to_string(), |f| f.to_string()))
            .collect();
        warn!(
            missing = stats.missing,
            sample = ?missing,
            "Counties without an attainment record will render unfilled"
        );
    }
    if stats.duplicates > 0 {
        warn!(duplicates = stats.duplicates, "Duplicate fips in records, first occurrence kept");
    }
    info!(matched = stats.matched, missing = stats.missing, "Join complete");

    (shapes, stats)
}
