//! TopoJSON decoding.
//!
//! A topology stores every boundary once as a shared arc. Geometries refer to
//! arcs by index, a negative index `i` meaning arc `!i` walked backwards.
//! [`feature`] rebuilds standalone GeoJSON features from those references and
//! [`mesh`] extracts the shared boundaries themselves.

use crate::error::TopologyError;
use crate::types::County;
use geo::{Coord, LineString, MultiLineString, MultiPolygon};
use geojson::{feature::Id, Feature, FeatureCollection, Geometry, JsonObject, Position, Value};
use serde::Deserialize;
use serde_json::Value as JsonValue;
use std::collections::{BTreeMap, HashMap};
use std::convert::TryInto;

pub const COUNTIES: &str = "counties";
pub const STATES: &str = "states";

#[derive(Debug, Clone, Deserialize)]
pub struct Topology {
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub transform: Option<Transform>,
    pub objects: HashMap<String, GeometryObject>,
    #[serde(default)]
    pub arcs: Vec<Vec<Vec<f64>>>,
}

/// Quantization transform. Present when arc positions are delta-encoded integers.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct Transform {
    pub scale: [f64; 2],
    pub translate: [f64; 2],
}

impl Transform {
    fn apply(&self, x: f64, y: f64) -> (f64, f64) {
        (
            x * self.scale[0] + self.translate[0],
            y * self.scale[1] + self.translate[1],
        )
    }
}

/// A geometry object as stored in the topology. The `arcs`/`coordinates`
/// payload shape depends on `kind`, so it is kept raw until decoding.
#[derive(Debug, Clone, Deserialize)]
pub struct GeometryObject {
    #[serde(rename = "type")]
    pub kind: Option<String>,
    #[serde(default)]
    pub id: Option<JsonValue>,
    #[serde(default)]
    pub properties: Option<JsonObject>,
    #[serde(default)]
    pub arcs: Option<JsonValue>,
    #[serde(default)]
    pub coordinates: Option<JsonValue>,
    #[serde(default)]
    pub geometries: Vec<GeometryObject>,
}

impl GeometryObject {
    fn is_collection(&self) -> bool {
        self.kind.as_deref() == Some("GeometryCollection")
    }

    fn arcs_as<T: serde::de::DeserializeOwned>(&self) -> Result<T, TopologyError> {
        let raw = self.arcs.clone().ok_or_else(|| {
            TopologyError::InvalidGeometry(format!("{} without arcs", self.kind_name()))
        })?;
        serde_json::from_value(raw)
            .map_err(|e| TopologyError::InvalidGeometry(format!("{}: {e}", self.kind_name())))
    }

    fn coordinates_as<T: serde::de::DeserializeOwned>(&self) -> Result<T, TopologyError> {
        let raw = self.coordinates.clone().ok_or_else(|| {
            TopologyError::InvalidGeometry(format!("{} without coordinates", self.kind_name()))
        })?;
        serde_json::from_value(raw)
            .map_err(|e| TopologyError::InvalidGeometry(format!("{}: {e}", self.kind_name())))
    }

    fn kind_name(&self) -> &str {
        self.kind.as_deref().unwrap_or("null")
    }

    /// Every arc index this geometry references, in document order.
    fn arc_indices(&self) -> Result<Vec<i64>, TopologyError> {
        Ok(match self.kind.as_deref() {
            Some("LineString") => self.arcs_as::<Vec<i64>>()?,
            Some("MultiLineString") | Some("Polygon") => {
                self.arcs_as::<Vec<Vec<i64>>>()?.into_iter().flatten().collect()
            }
            Some("MultiPolygon") => self
                .arcs_as::<Vec<Vec<Vec<i64>>>>()?
                .into_iter()
                .flatten()
                .flatten()
                .collect(),
            _ => Vec::new(),
        })
    }
}

impl Topology {
    pub fn object(&self, name: &str) -> Result<&GeometryObject, TopologyError> {
        self.objects
            .get(name)
            .ok_or_else(|| TopologyError::MissingObject(name.to_string()))
    }

    /// The map needs both the county fills and the state outlines.
    pub fn validate(&self) -> Result<(), TopologyError> {
        self.object(COUNTIES)?;
        self.object(STATES)?;
        Ok(())
    }
}

/// Arcs in absolute coordinates, ready to be stitched.
struct Decoder<'a> {
    topology: &'a Topology,
    arcs: Vec<Vec<Position>>,
}

impl<'a> Decoder<'a> {
    fn new(topology: &'a Topology) -> Self {
        let arcs = topology
            .arcs
            .iter()
            .map(|arc| match topology.transform {
                Some(t) => {
                    let (mut x, mut y) = (0.0, 0.0);
                    arc.iter()
                        .map(|p| {
                            x += p.first().copied().unwrap_or(0.0);
                            y += p.get(1).copied().unwrap_or(0.0);
                            let (px, py) = t.apply(x, y);
                            let mut out = vec![px, py];
                            out.extend(p.iter().skip(2));
                            out
                        })
                        .collect()
                }
                None => arc.clone(),
            })
            .collect();
        Self { topology, arcs }
    }

    fn resolve(&self, index: i64) -> Result<(&[Position], bool), TopologyError> {
        let (slot, reversed) = if index < 0 { (!index, true) } else { (index, false) };
        let arc = usize::try_from(slot)
            .ok()
            .and_then(|i| self.arcs.get(i))
            .map(Vec::as_slice)
            .ok_or(TopologyError::ArcOutOfRange { index, len: self.arcs.len() })?;
        Ok((arc, reversed))
    }

    /// Appends one arc, dropping the point it shares with the previous arc.
    fn arc(&self, index: i64, points: &mut Vec<Position>) -> Result<(), TopologyError> {
        points.pop();
        let (arc, reversed) = self.resolve(index)?;
        if reversed {
            points.extend(arc.iter().rev().cloned());
        } else {
            points.extend(arc.iter().cloned());
        }
        Ok(())
    }

    fn point(&self, p: &[f64]) -> Position {
        match (self.topology.transform, p) {
            (Some(t), [x, y, rest @ ..]) => {
                let (px, py) = t.apply(*x, *y);
                let mut out = vec![px, py];
                out.extend_from_slice(rest);
                out
            }
            _ => p.to_vec(),
        }
    }

    fn line(&self, arcs: &[i64]) -> Result<Vec<Position>, TopologyError> {
        let mut points = Vec::new();
        for &i in arcs {
            self.arc(i, &mut points)?;
        }
        if points.len() < 2 {
            if let Some(first) = points.first().cloned() {
                points.push(first);
            }
        }
        Ok(points)
    }

    fn ring(&self, arcs: &[i64]) -> Result<Vec<Position>, TopologyError> {
        let mut points = self.line(arcs)?;
        while points.len() < 4 {
            match points.first().cloned() {
                Some(first) => points.push(first),
                None => break,
            }
        }
        Ok(points)
    }

    fn polygon(&self, rings: &[Vec<i64>]) -> Result<Vec<Vec<Position>>, TopologyError> {
        rings.iter().map(|r| self.ring(r)).collect()
    }

    fn geometry(&self, o: &GeometryObject) -> Result<Option<Geometry>, TopologyError> {
        let value = match o.kind.as_deref() {
            None => return Ok(None),
            Some("Point") => Value::Point(self.point(&o.coordinates_as::<Vec<f64>>()?)),
            Some("MultiPoint") => Value::MultiPoint(
                o.coordinates_as::<Vec<Vec<f64>>>()?
                    .iter()
                    .map(|p| self.point(p))
                    .collect(),
            ),
            Some("LineString") => Value::LineString(self.line(&o.arcs_as::<Vec<i64>>()?)?),
            Some("MultiLineString") => Value::MultiLineString(
                o.arcs_as::<Vec<Vec<i64>>>()?
                    .iter()
                    .map(|l| self.line(l))
                    .collect::<Result<_, _>>()?,
            ),
            Some("Polygon") => Value::Polygon(self.polygon(&o.arcs_as::<Vec<Vec<i64>>>()?)?),
            Some("MultiPolygon") => Value::MultiPolygon(
                o.arcs_as::<Vec<Vec<Vec<i64>>>>()?
                    .iter()
                    .map(|p| self.polygon(p))
                    .collect::<Result<_, _>>()?,
            ),
            Some("GeometryCollection") => Value::GeometryCollection(
                o.geometries
                    .iter()
                    .filter_map(|g| self.geometry(g).transpose())
                    .collect::<Result<_, _>>()?,
            ),
            Some(other) => {
                return Err(TopologyError::InvalidGeometry(format!(
                    "unknown geometry type `{other}`"
                )))
            }
        };
        Ok(Some(Geometry::new(value)))
    }

    fn feature(&self, o: &GeometryObject) -> Result<Feature, TopologyError> {
        let id = match &o.id {
            Some(JsonValue::Number(n)) => Some(Id::Number(n.clone())),
            Some(JsonValue::String(s)) => Some(Id::String(s.clone())),
            _ => None,
        };
        Ok(Feature {
            bbox: None,
            geometry: self.geometry(o)?,
            id,
            properties: Some(o.properties.clone().unwrap_or_default()),
            foreign_members: None,
        })
    }
}

/// Converts a named object into GeoJSON features. A `GeometryCollection`
/// yields one feature per member; any other object yields a single feature.
pub fn feature(topology: &Topology, name: &str) -> Result<FeatureCollection, TopologyError> {
    let object = topology.object(name)?;
    let decoder = Decoder::new(topology);
    let features = if object.is_collection() {
        object
            .geometries
            .iter()
            .map(|g| decoder.feature(g))
            .collect::<Result<Vec<_>, _>>()?
    } else {
        vec![decoder.feature(object)?]
    };
    Ok(FeatureCollection {
        bbox: None,
        features,
        foreign_members: None,
    })
}

/// Extracts the arcs of a named object as lines, each arc at most once.
///
/// With a filter, an arc survives only if `filter(a, b)` holds, where `a` and
/// `b` are the first and last geometries referencing it. For an arc used by a
/// single geometry, `a` and `b` are the same object.
pub fn mesh<F>(
    topology: &Topology,
    name: &str,
    filter: Option<F>,
) -> Result<MultiLineString<f64>, TopologyError>
where
    F: Fn(&GeometryObject, &GeometryObject) -> bool,
{
    let object = topology.object(name)?;
    let decoder = Decoder::new(topology);

    let mut leaves = Vec::new();
    collect_leaves(object, &mut leaves);

    let mut geoms_by_arc: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
    for (leaf_idx, leaf) in leaves.iter().enumerate() {
        for index in leaf.arc_indices()? {
            let slot = if index < 0 { !index } else { index };
            let slot = usize::try_from(slot)
                .ok()
                .filter(|s| *s < decoder.arcs.len())
                .ok_or(TopologyError::ArcOutOfRange { index, len: decoder.arcs.len() })?;
            geoms_by_arc.entry(slot).or_default().push(leaf_idx);
        }
    }

    let lines = geoms_by_arc
        .into_iter()
        .filter(|(_, geoms)| match (&filter, geoms.first(), geoms.last()) {
            (Some(f), Some(&a), Some(&b)) => f(leaves[a], leaves[b]),
            _ => true,
        })
        .map(|(slot, _)| {
            LineString::new(
                decoder.arcs[slot]
                    .iter()
                    .map(|p| Coord {
                        x: p.first().copied().unwrap_or(0.0),
                        y: p.get(1).copied().unwrap_or(0.0),
                    })
                    .collect(),
            )
        })
        .collect();

    Ok(MultiLineString::new(lines))
}

/// Boundaries shared by two different members of `name`: the state borders
/// without the national outline.
pub fn interior_mesh(topology: &Topology, name: &str) -> Result<MultiLineString<f64>, TopologyError> {
    mesh(topology, name, Some(|a: &GeometryObject, b: &GeometryObject| !std::ptr::eq(a, b)))
}

fn collect_leaves<'a>(object: &'a GeometryObject, out: &mut Vec<&'a GeometryObject>) {
    if object.is_collection() {
        for g in &object.geometries {
            collect_leaves(g, out);
        }
    } else {
        out.push(object);
    }
}

/// Decodes the county collection into polygons keyed by fips.
///
/// Only numeric ids count as fips. A string id such as `"01001"` is not
/// equal to the record's integer fips, so that county stays unjoined.
pub fn counties(topology: &Topology) -> Result<Vec<County>, TopologyError> {
    let collection = feature(topology, COUNTIES)?;
    collection
        .features
        .into_iter()
        .map(|f| {
            let fips = match &f.id {
                Some(Id::Number(n)) => n.as_u64().and_then(|v| u32::try_from(v).ok()),
                Some(Id::String(_)) | None => None,
            };
            let geometry = match f.geometry {
                Some(geom) => {
                    let valid_geo: geo::Geometry<f64> = geom.value.try_into().map_err(|e| {
                        TopologyError::InvalidGeometry(format!("county {:?}: {e:?}", fips))
                    })?;
                    match valid_geo {
                        geo::Geometry::MultiPolygon(mp) => mp,
                        geo::Geometry::Polygon(p) => MultiPolygon::new(vec![p]),
                        _ => MultiPolygon::new(vec![]),
                    }
                }
                None => MultiPolygon::new(vec![]),
            };
            Ok(County { fips, geometry })
        })
        .collect()
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Two unit squares side by side sharing the edge x = 1, as two states,
    /// with one county per state. County 1001 covers the left square and
    /// county 9999 the right one.
    pub(crate) const TWO_SQUARE_TOPOLOGY: &str = r#"{
            "type": "Topology",
            "objects": {
                "counties": {"type": "GeometryCollection", "geometries": [
                    {"type": "Polygon", "id": 1001, "arcs": [[0, 1]]},
                    {"type": "Polygon", "id": 9999, "arcs": [[2, -1]]}
                ]},
                "states": {"type": "GeometryCollection", "geometries": [
                    {"type": "Polygon", "id": "01", "arcs": [[0, 1]]},
                    {"type": "Polygon", "id": "02", "arcs": [[2, -1]]}
                ]}
            },
            "arcs": [
                [[1, 0], [1, 1]],
                [[1, 1], [0, 1], [0, 0], [1, 0]],
                [[1, 0], [2, 0], [2, 1], [1, 1]]
            ]
        }"#;

    pub(crate) fn two_square_topology() -> Topology {
        serde_json::from_str(TWO_SQUARE_TOPOLOGY).unwrap()
    }

    #[test]
    fn test_feature_stitches_shared_points() {
        let topology = two_square_topology();
        let fc = feature(&topology, COUNTIES).unwrap();
        assert_eq!(fc.features.len(), 2);

        let right = &fc.features[1];
        assert!(matches!(&right.id, Some(Id::Number(n)) if n.as_u64() == Some(9999)));
        match &right.geometry.as_ref().unwrap().value {
            Value::Polygon(rings) => {
                assert_eq!(
                    rings[0],
                    vec![
                        vec![1.0, 0.0],
                        vec![2.0, 0.0],
                        vec![2.0, 1.0],
                        vec![1.0, 1.0],
                        vec![1.0, 0.0],
                    ]
                );
            }
            other => panic!("expected polygon, got {other:?}"),
        }
    }

    #[test]
    fn test_quantized_arcs_are_delta_decoded() {
        let json = r#"{
            "type": "Topology",
            "transform": {"scale": [0.5, 2.0], "translate": [10.0, 20.0]},
            "objects": {"line": {"type": "LineString", "arcs": [0]},
                        "pt": {"type": "Point", "coordinates": [4, 1]}},
            "arcs": [[[2, 1], [2, 0], [-4, 3]]]
        }"#;
        let topology: Topology = serde_json::from_str(json).unwrap();

        let fc = feature(&topology, "line").unwrap();
        match &fc.features[0].geometry.as_ref().unwrap().value {
            Value::LineString(points) => assert_eq!(
                points,
                &vec![vec![11.0, 22.0], vec![12.0, 22.0], vec![10.0, 28.0]]
            ),
            other => panic!("expected line, got {other:?}"),
        }

        let fc = feature(&topology, "pt").unwrap();
        match &fc.features[0].geometry.as_ref().unwrap().value {
            Value::Point(p) => assert_eq!(p, &vec![12.0, 22.0]),
            other => panic!("expected point, got {other:?}"),
        }
    }

    #[test]
    fn test_interior_mesh_keeps_only_shared_arcs() {
        let topology = two_square_topology();
        let interior = interior_mesh(&topology, STATES).unwrap();
        assert_eq!(interior.0.len(), 1);
        assert_eq!(
            interior.0[0],
            LineString::from(vec![(1.0, 0.0), (1.0, 1.0)])
        );

        let all = mesh(&topology, STATES, None::<fn(&GeometryObject, &GeometryObject) -> bool>)
            .unwrap();
        assert_eq!(all.0.len(), 3);
    }

    #[test]
    fn test_counties_carry_numeric_fips() {
        let topology = two_square_topology();
        let counties = counties(&topology).unwrap();
        let ids: Vec<_> = counties.iter().map(|c| c.fips).collect();
        assert_eq!(ids, vec![Some(1001), Some(9999)]);
        assert_eq!(counties[0].geometry.0.len(), 1);
    }

    #[test]
    fn test_string_ids_do_not_become_fips() {
        let json = r#"{
            "type": "Topology",
            "objects": {"counties": {"type": "GeometryCollection", "geometries": [
                {"type": null, "id": "01001"},
                {"type": null, "id": "1001"},
                {"type": null, "id": 1001}
            ]}},
            "arcs": []
        }"#;
        let topology: Topology = serde_json::from_str(json).unwrap();
        let ids: Vec<_> = counties(&topology).unwrap().iter().map(|c| c.fips).collect();
        assert_eq!(ids, vec![None, None, Some(1001)]);
    }

    #[test]
    fn test_null_geometry_has_no_shape() {
        let json = r#"{
            "type": "Topology",
            "objects": {"counties": {"type": "GeometryCollection", "geometries": [
                {"type": null, "id": 5}
            ]}},
            "arcs": []
        }"#;
        let topology: Topology = serde_json::from_str(json).unwrap();
        let counties = counties(&topology).unwrap();
        assert_eq!(counties[0].fips, Some(5));
        assert!(counties[0].geometry.0.is_empty());
    }

    #[test]
    fn test_missing_objects_and_bad_arcs_are_errors() {
        let json = r#"{"type": "Topology", "objects": {"counties": {"type": "LineString", "arcs": [7]}}, "arcs": []}"#;
        let topology: Topology = serde_json::from_str(json).unwrap();
        assert_eq!(
            topology.validate(),
            Err(TopologyError::MissingObject("states".into()))
        );
        assert_eq!(
            feature(&topology, COUNTIES).unwrap_err(),
            TopologyError::ArcOutOfRange { index: 7, len: 0 }
        );
    }
}
