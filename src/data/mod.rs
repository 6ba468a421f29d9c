use anyhow::{bail, Context, Result};
use geojson::{Feature, GeoJson, Geometry, JsonObject, Value};
use rayon::prelude::*;
use std::fs;
use std::path::Path;

use crate::config::MapMode;
use crate::error::MapError;
use crate::geo::{LonLat, MultiPolygon, Polygon};
use crate::map::{Atlas, PolygonFeature, RegionKind};

const NAME_KEYS: [&str; 4] = ["name", "NAME", "ADMIN", "name_en"];
const KIND_KEYS: [&str; 2] = ["type", "TYPE"];
const LABEL_KEYS: [(&str, &str); 2] = [("label_x", "label_y"), ("LABEL_X", "LABEL_Y")];

/// Load a GeoJSON FeatureCollection of country or state polygons
pub fn load_atlas(path: &Path) -> Result<Atlas> {
    let mut bytes = fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    let atlas = parse_atlas(&mut bytes).with_context(|| format!("Failed to load {}", path.display()))?;
    tracing::info!(path = %path.display(), features = atlas.len(), "loaded dataset");
    Ok(atlas)
}

/// Parse GeoJSON in place. The buffer is clobbered by the parser.
pub fn parse_atlas(bytes: &mut [u8]) -> Result<Atlas> {
    let geojson: GeoJson = simd_json::serde::from_slice(bytes).context("Invalid GeoJSON")?;

    let features = match geojson {
        GeoJson::FeatureCollection(fc) => fc.features,
        GeoJson::Feature(f) => vec![f],
        GeoJson::Geometry(_) => {
            return Err(MapError::Dataset("expected features, found a bare geometry".into()).into())
        }
    };

    // Conversion is the only parallel step; the result is handed to the
    // single-threaded view fully built.
    let converted: Vec<PolygonFeature> = features
        .par_iter()
        .enumerate()
        .filter_map(|(idx, feature)| convert_feature(idx, feature))
        .collect();

    let skipped = features.len() - converted.len();
    if skipped > 0 {
        tracing::warn!(skipped, "features without polygon geometry were skipped");
    }
    if converted.is_empty() {
        bail!(MapError::Dataset("no polygon features".into()));
    }
    Ok(Atlas::new(converted))
}

fn convert_feature(idx: usize, feature: &Feature) -> Option<PolygonFeature> {
    let props = feature.properties.as_ref();
    let name = props
        .and_then(|p| first_str(p, &NAME_KEYS))
        .map(str::to_string)
        .unwrap_or_else(|| format!("Feature {idx}"));

    let Some(geometry) = feature.geometry.as_ref().and_then(polygons_of) else {
        tracing::warn!(%name, "skipping feature without polygon geometry");
        return None;
    };

    let kind = props
        .and_then(|p| first_str(p, &KIND_KEYS))
        .map(RegionKind::parse)
        .unwrap_or(RegionKind::Other(String::new()));

    Some(PolygonFeature {
        name,
        kind,
        geometry,
        label_position: props.and_then(label_position),
    })
}

fn first_str<'a>(props: &'a JsonObject, keys: &[&str]) -> Option<&'a str> {
    keys.iter()
        .find_map(|key| props.get(*key).and_then(|v| v.as_str()))
        .filter(|s| !s.is_empty())
}

fn label_position(props: &JsonObject) -> Option<LonLat> {
    for (kx, ky) in LABEL_KEYS {
        let x = props.get(kx).and_then(|v| v.as_f64());
        let y = props.get(ky).and_then(|v| v.as_f64());
        if let (Some(x), Some(y)) = (x, y) {
            return Some((x, y));
        }
    }
    let pair = props.get("labelPosition")?.as_array()?;
    match pair.as_slice() {
        [x, y, ..] => Some((x.as_f64()?, y.as_f64()?)),
        _ => None,
    }
}

/// Polygon parts of a geometry, or `None` when it has none
fn polygons_of(geometry: &Geometry) -> Option<MultiPolygon> {
    let mut out = MultiPolygon::new();
    collect_polygons(geometry, &mut out);
    (!out.is_empty()).then_some(out)
}

fn collect_polygons(geometry: &Geometry, out: &mut MultiPolygon) {
    match &geometry.value {
        Value::Polygon(rings) => out.push(convert_rings(rings)),
        Value::MultiPolygon(polygons) => out.extend(polygons.iter().map(|rings| convert_rings(rings))),
        Value::GeometryCollection(geometries) => {
            for g in geometries {
                collect_polygons(g, out);
            }
        }
        _ => {}
    }
}

fn convert_rings(rings: &[Vec<Vec<f64>>]) -> Polygon {
    rings
        .iter()
        .map(|ring| {
            ring.iter()
                .filter_map(|c| match c.as_slice() {
                    [lon, lat, ..] => Some((*lon, *lat)),
                    _ => None,
                })
                .collect()
        })
        .collect()
}

/// Built-in dataset for when no file is available
pub fn sample_atlas(mode: MapMode) -> Atlas {
    match mode {
        MapMode::Globe => Atlas::new(sample_world()),
        MapMode::Usa => Atlas::new(sample_states()),
    }
}

fn region(name: &str, kind: RegionKind, ring: &[LonLat], label: Option<LonLat>) -> PolygonFeature {
    PolygonFeature {
        name: name.to_string(),
        kind,
        geometry: vec![vec![ring.to_vec()]],
        label_position: label,
    }
}

fn rect(name: &str, kind: RegionKind, (w, s, e, n): (f64, f64, f64, f64), label: Option<LonLat>) -> PolygonFeature {
    region(name, kind, &[(w, s), (e, s), (e, n), (w, n), (w, s)], label)
}

fn sample_world() -> Vec<PolygonFeature> {
    // Simplified continent outlines
    vec![
        region(
            "North America",
            RegionKind::Country,
            &[
                (-168.0, 65.0), (-166.0, 60.0), (-141.0, 60.0), (-130.0, 55.0),
                (-125.0, 48.0), (-124.0, 40.0), (-117.0, 32.0), (-110.0, 25.0),
                (-97.0, 25.0), (-97.0, 28.0), (-82.0, 24.0), (-80.0, 25.0),
                (-81.0, 31.0), (-75.0, 35.0), (-70.0, 41.0), (-67.0, 45.0),
                (-65.0, 47.0), (-55.0, 47.0), (-52.0, 47.0), (-55.0, 52.0),
                (-58.0, 55.0), (-64.0, 60.0), (-73.0, 62.0), (-80.0, 63.0),
                (-95.0, 62.0), (-110.0, 68.0), (-130.0, 70.0), (-145.0, 70.0),
                (-168.0, 65.0),
            ],
            None,
        ),
        region(
            "South America",
            RegionKind::Country,
            &[
                (-80.0, 10.0), (-75.0, 5.0), (-70.0, 5.0), (-60.0, 5.0),
                (-50.0, 0.0), (-35.0, -5.0), (-35.0, -10.0), (-38.0, -15.0),
                (-40.0, -22.0), (-48.0, -25.0), (-55.0, -34.0), (-58.0, -38.0),
                (-65.0, -42.0), (-68.0, -50.0), (-75.0, -52.0), (-75.0, -45.0),
                (-72.0, -40.0), (-72.0, -30.0), (-70.0, -20.0), (-70.0, -15.0),
                (-80.0, -5.0), (-80.0, 0.0), (-80.0, 10.0),
            ],
            None,
        ),
        region(
            "Europe",
            RegionKind::Country,
            &[
                (-10.0, 36.0), (-5.0, 36.0), (0.0, 38.0), (5.0, 43.0),
                (10.0, 44.0), (15.0, 45.0), (20.0, 40.0), (25.0, 37.0),
                (30.0, 40.0), (35.0, 42.0), (40.0, 43.0), (40.0, 55.0),
                (30.0, 60.0), (25.0, 65.0), (20.0, 70.0), (10.0, 71.0),
                (5.0, 62.0), (5.0, 58.0), (-5.0, 58.0), (-10.0, 52.0),
                (-5.0, 48.0), (-5.0, 43.0), (-10.0, 36.0),
            ],
            None,
        ),
        region(
            "Africa",
            RegionKind::Country,
            &[
                (-17.0, 15.0), (-17.0, 20.0), (-15.0, 28.0), (-5.0, 35.0),
                (10.0, 37.0), (20.0, 33.0), (25.0, 32.0), (35.0, 30.0),
                (35.0, 20.0), (42.0, 12.0), (50.0, 12.0), (45.0, 5.0),
                (35.0, -5.0), (35.0, -20.0), (35.0, -25.0), (30.0, -30.0),
                (20.0, -35.0), (18.0, -35.0), (15.0, -30.0), (10.0, -15.0),
                (10.0, 0.0), (5.0, 5.0), (-5.0, 5.0), (-10.0, 10.0),
                (-17.0, 15.0),
            ],
            None,
        ),
        region(
            "Asia",
            RegionKind::Country,
            &[
                (40.0, 43.0), (50.0, 40.0), (55.0, 37.0), (60.0, 25.0),
                (65.0, 25.0), (70.0, 20.0), (75.0, 15.0), (80.0, 8.0),
                (80.0, 15.0), (88.0, 22.0), (92.0, 22.0), (95.0, 16.0),
                (100.0, 14.0), (105.0, 10.0), (110.0, 20.0), (115.0, 22.0),
                (120.0, 22.0), (122.0, 25.0), (125.0, 30.0), (130.0, 35.0),
                (135.0, 35.0), (140.0, 40.0), (145.0, 45.0), (145.0, 50.0),
                (140.0, 55.0), (135.0, 55.0), (130.0, 52.0), (130.0, 43.0),
                (120.0, 40.0), (110.0, 45.0), (90.0, 50.0), (70.0, 55.0),
                (60.0, 55.0), (50.0, 50.0), (40.0, 43.0),
            ],
            None,
        ),
        region(
            "Australia",
            RegionKind::Country,
            &[
                (115.0, -20.0), (120.0, -18.0), (130.0, -12.0), (140.0, -12.0),
                (145.0, -15.0), (150.0, -25.0), (153.0, -30.0), (150.0, -35.0),
                (145.0, -38.0), (140.0, -38.0), (135.0, -35.0), (130.0, -32.0),
                (125.0, -32.0), (115.0, -35.0), (115.0, -25.0), (115.0, -20.0),
            ],
            None,
        ),
        // Too small to click; they get pins
        rect("Malta", RegionKind::Sovereign, (14.2, 35.8, 14.6, 36.1), Some((14.4, 35.9))),
        rect("Singapore", RegionKind::Sovereign, (103.6, 1.2, 104.0, 1.5), Some((103.8, 1.35))),
        rect("Mauritius", RegionKind::Sovereign, (57.3, -20.5, 57.8, -19.97), Some((57.55, -20.2))),
    ]
}

fn sample_states() -> Vec<PolygonFeature> {
    vec![
        rect("Colorado", RegionKind::State, (-109.05, 37.0, -102.05, 41.0), None),
        rect("Wyoming", RegionKind::State, (-111.05, 41.0, -104.05, 45.0), None),
        rect("Utah", RegionKind::State, (-114.05, 37.0, -109.05, 42.0), None),
        rect("Kansas", RegionKind::State, (-102.05, 37.0, -94.6, 40.0), None),
        rect("Nebraska", RegionKind::State, (-104.05, 40.0, -95.3, 43.0), None),
        rect("New Mexico", RegionKind::State, (-109.05, 31.33, -103.0, 37.0), None),
        rect("Oklahoma", RegionKind::State, (-103.0, 33.6, -94.4, 37.0), None),
        rect("Rhode Island", RegionKind::State, (-71.9, 41.15, -71.1, 42.02), Some((-71.5, 41.6))),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::map::FeatureId;

    fn parse(json: &str) -> Result<Atlas> {
        let mut bytes = json.as_bytes().to_vec();
        parse_atlas(&mut bytes)
    }

    #[test]
    fn test_parse_feature_collection() {
        let atlas = parse(
            r#"{
              "type": "FeatureCollection",
              "features": [
                {
                  "type": "Feature",
                  "properties": { "ADMIN": "Côte d'Ivoire", "TYPE": "Sovereign country", "LABEL_X": -5.5, "LABEL_Y": 7.6 },
                  "geometry": { "type": "Polygon", "coordinates": [[[-8,4],[-3,4],[-3,10],[-8,10],[-8,4]]] }
                },
                {
                  "type": "Feature",
                  "properties": { "name": "Tiny Isles", "labelPosition": [10, 20] },
                  "geometry": { "type": "MultiPolygon", "coordinates": [
                    [[[9.9,19.9],[10.1,19.9],[10.1,20.1],[9.9,20.1],[9.9,19.9]]],
                    [[[11,21],[11.1,21],[11.1,21.1],[11,21]]]
                  ] }
                },
                {
                  "type": "Feature",
                  "properties": { "name": "Capital" },
                  "geometry": { "type": "Point", "coordinates": [0, 0] }
                }
              ]
            }"#,
        )
        .unwrap();

        assert_eq!(atlas.len(), 2);
        let ivory = atlas.find("Côte d'Ivoire").unwrap();
        let feature = atlas.get(ivory).unwrap();
        assert_eq!(feature.kind, RegionKind::Sovereign);
        assert_eq!(feature.label_position, Some((-5.5, 7.6)));

        let isles = atlas.get(atlas.find("Tiny Isles").unwrap()).unwrap();
        assert_eq!(isles.geometry.len(), 2);
        assert_eq!(isles.label_position, Some((10.0, 20.0)));
        assert_eq!(isles.kind, RegionKind::Other(String::new()));
    }

    #[test]
    fn test_unnamed_feature_gets_placeholder() {
        let atlas = parse(
            r#"{ "type": "Feature", "properties": null,
                 "geometry": { "type": "Polygon", "coordinates": [[[0,0],[1,0],[1,1],[0,0]]] } }"#,
        )
        .unwrap();
        assert_eq!(atlas.get(FeatureId(0)).unwrap().name, "Feature 0");
    }

    #[test]
    fn test_rejects_datasets_without_polygons() {
        assert!(parse(r#"{ "type": "Point", "coordinates": [0, 0] }"#).is_err());
        assert!(parse(r#"{ "type": "FeatureCollection", "features": [] }"#).is_err());
        assert!(parse("not json").is_err());
    }

    #[test]
    fn test_samples_have_marker_candidates() {
        for mode in [MapMode::Globe, MapMode::Usa] {
            let atlas = sample_atlas(mode);
            let small = crate::map::renderer::compute_marker_eligibility(
                &atlas,
                crate::config::DEFAULT_MARKER_AREA_THRESHOLD,
            );
            assert!(!small.is_empty(), "{mode:?}");
            assert!(small.len() < atlas.len());
        }
    }
}
