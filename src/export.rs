use crate::processing::CountyShape;
use geojson::{feature::Id, Feature, FeatureCollection, Geometry, JsonObject};
use serde_json::Value as JsonValue;

/// The joined counties as GeoJSON. Unmatched counties keep their shape and
/// fips but carry no attainment properties.
pub fn joined_counties(shapes: &[CountyShape]) -> FeatureCollection {
    let features = shapes
        .iter()
        .map(|shape| {
            let mut properties = JsonObject::new();
            if let Some(fips) = shape.fips {
                properties.insert("fips".into(), JsonValue::from(fips));
            }
            if let Some(record) = &shape.record {
                properties.insert("state".into(), JsonValue::from(record.state.clone()));
                properties.insert("area_name".into(), JsonValue::from(record.area_name.clone()));
                properties.insert(
                    "bachelorsOrHigher".into(),
                    JsonValue::from(record.bachelors_or_higher),
                );
            }
            if let Some(fill) = shape.fill {
                properties.insert("fill".into(), JsonValue::from(fill));
            }
            Feature {
                bbox: None,
                geometry: Some(Geometry::new(geojson::Value::from(&shape.geometry))),
                id: shape.fips.map(|f| Id::Number(f.into())),
                properties: Some(properties),
                foreign_members: None,
            }
        })
        .collect();

    FeatureCollection {
        bbox: None,
        features,
        foreign_members: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::{render, tests::sample_model};

    #[test]
    fn test_export_carries_join_result() {
        let commands = render(&sample_model()).unwrap();
        let fc = joined_counties(&commands.counties);
        assert_eq!(fc.features.len(), 2);

        let matched = fc.features[0].properties.as_ref().unwrap();
        assert_eq!(matched["fips"], 1001);
        assert_eq!(matched["area_name"], "Autauga County");
        assert_eq!(matched["bachelorsOrHigher"], 21.4);
        assert_eq!(matched["fill"], "#9ecae1");

        let orphan = fc.features[1].properties.as_ref().unwrap();
        assert_eq!(orphan["fips"], 9999);
        assert!(!orphan.contains_key("fill"));
        assert!(!orphan.contains_key("bachelorsOrHigher"));

        let text = fc.to_string();
        assert!(text.contains("\"MultiPolygon\""));
    }
}
