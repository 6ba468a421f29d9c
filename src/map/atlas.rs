use std::collections::HashMap;

use crate::error::MapError;
use crate::geo::{self, BBox, LonLat, MultiPolygon};

/// Stable index of a feature inside its [`Atlas`]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FeatureId(pub u32);

impl FeatureId {
    #[inline(always)]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Region classification carried through from the dataset. The engine never
/// looks at it; quiz filtering on the host side does.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RegionKind {
    Country,
    Sovereign,
    Dependency,
    Disputed,
    State,
    Other(String),
}

impl RegionKind {
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "country" => RegionKind::Country,
            "sovereign country" | "sovereign" => RegionKind::Sovereign,
            "dependency" => RegionKind::Dependency,
            "disputed" | "indeterminate" => RegionKind::Disputed,
            "state" => RegionKind::State,
            _ => RegionKind::Other(raw.to_string()),
        }
    }
}

/// One country or state
#[derive(Clone, Debug)]
pub struct PolygonFeature {
    pub name: String,
    pub kind: RegionKind,
    pub geometry: MultiPolygon,
    /// Representative point used for markers when the region is too small
    pub label_position: Option<LonLat>,
}

/// Geometry facts computed once per dataset.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FeatureStats {
    pub bbox: BBox,
    /// Spherical area in steradians
    pub area: f64,
    pub centroid: LonLat,
}

/// Immutable dataset plus its `name -> FeatureId` lookup.
///
/// Names are used verbatim as keys. When two features share a name the first
/// one keeps it and the duplicate is only reachable by id.
pub struct Atlas {
    features: Vec<PolygonFeature>,
    stats: Vec<Option<FeatureStats>>,
    by_name: HashMap<String, FeatureId>,
}

impl Atlas {
    pub fn new(mut features: Vec<PolygonFeature>) -> Self {
        let mut by_name = HashMap::with_capacity(features.len());
        let mut stats = Vec::with_capacity(features.len());

        for (idx, feature) in features.iter_mut().enumerate() {
            let id = FeatureId(idx as u32);
            let dropped = sanitize_geometry(&mut feature.geometry);
            if dropped > 0 {
                let err = MapError::Geometry {
                    name: feature.name.clone(),
                    reason: format!("{dropped} malformed ring(s) dropped"),
                };
                tracing::warn!(%err, "skipping bad rings");
            }

            let feature_stats = compute_stats(&feature.geometry);
            if feature_stats.is_none() {
                let err = MapError::Geometry {
                    name: feature.name.clone(),
                    reason: "no renderable geometry".to_string(),
                };
                tracing::warn!(%err, "feature will not be drawn");
            }
            stats.push(feature_stats);

            if let Some(existing) = by_name.get(&feature.name) {
                tracing::warn!(name = %feature.name, ?existing, duplicate = ?id, "duplicate region name");
            } else {
                by_name.insert(feature.name.clone(), id);
            }
        }

        Self {
            features,
            stats,
            by_name,
        }
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    #[inline(always)]
    pub fn get(&self, id: FeatureId) -> Option<&PolygonFeature> {
        self.features.get(id.index())
    }

    #[inline(always)]
    pub fn stats(&self, id: FeatureId) -> Option<&FeatureStats> {
        self.stats.get(id.index()).and_then(Option::as_ref)
    }

    pub fn find(&self, name: &str) -> Option<FeatureId> {
        self.by_name.get(name).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (FeatureId, &PolygonFeature)> + '_ {
        self.features
            .iter()
            .enumerate()
            .map(|(idx, f)| (FeatureId(idx as u32), f))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> + '_ {
        self.features.iter().map(|f| f.name.as_str())
    }
}

/// Remove rings that cannot be drawn: non-finite coordinates or fewer than
/// three distinct vertices. Polygons whose exterior goes are removed whole.
/// Returns how many rings were dropped.
fn sanitize_geometry(geometry: &mut MultiPolygon) -> usize {
    let mut dropped = 0;
    geometry.retain_mut(|polygon| {
        let exterior_ok = polygon.first().is_some_and(|ring| ring_is_drawable(ring));
        if !exterior_ok {
            dropped += polygon.len().max(1);
            return false;
        }
        let before = polygon.len();
        let mut idx = 0;
        polygon.retain(|ring| {
            let keep = idx == 0 || ring_is_drawable(ring);
            idx += 1;
            keep
        });
        dropped += before - polygon.len();
        true
    });
    dropped
}

fn ring_is_drawable(ring: &[LonLat]) -> bool {
    if ring.iter().any(|(lon, lat)| !lon.is_finite() || !lat.is_finite()) {
        return false;
    }
    let pts = geo::open_ring(ring);
    let mut distinct = 0;
    for (i, pt) in pts.iter().enumerate() {
        if !pts[..i].contains(pt) {
            distinct += 1;
            if distinct >= 3 {
                return true;
            }
        }
    }
    false
}

fn compute_stats(geometry: &MultiPolygon) -> Option<FeatureStats> {
    let bbox = BBox::of(geometry)?;
    let centroid = geo::centroid(geometry)?;
    Some(FeatureStats {
        bbox,
        area: geo::area(geometry),
        centroid,
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn square_feature(name: &str, lon: f64, lat: f64, half: f64) -> PolygonFeature {
        PolygonFeature {
            name: name.to_string(),
            kind: RegionKind::Country,
            geometry: vec![vec![vec![
                (lon - half, lat - half),
                (lon + half, lat - half),
                (lon + half, lat + half),
                (lon - half, lat + half),
                (lon - half, lat - half),
            ]]],
            label_position: None,
        }
    }

    #[test]
    fn test_lookup_by_name_with_spaces() {
        let atlas = Atlas::new(vec![
            square_feature("United States", -100.0, 40.0, 10.0),
            square_feature("United_States", 0.0, 0.0, 1.0),
        ]);
        assert_eq!(atlas.find("United States"), Some(FeatureId(0)));
        assert_eq!(atlas.find("United_States"), Some(FeatureId(1)));
        assert_eq!(atlas.find("United-States"), None);
    }

    #[test]
    fn test_duplicate_name_keeps_first() {
        let atlas = Atlas::new(vec![
            square_feature("Congo", 15.0, -1.0, 2.0),
            square_feature("Congo", 23.0, -3.0, 5.0),
        ]);
        assert_eq!(atlas.len(), 2);
        assert_eq!(atlas.find("Congo"), Some(FeatureId(0)));
    }

    #[test]
    fn test_malformed_rings_are_dropped() {
        let mut broken = square_feature("Broken", 0.0, 0.0, 1.0);
        broken.geometry.push(vec![vec![(1.0, 1.0), (1.0, 1.0), (2.0, 2.0)]]);
        broken.geometry.push(vec![vec![(f64::NAN, 0.0), (1.0, 0.0), (1.0, 1.0)]]);
        let empty = PolygonFeature {
            geometry: vec![vec![vec![(0.0, 0.0), (0.0, 0.0)]]],
            ..square_feature("Empty", 0.0, 0.0, 1.0)
        };

        let atlas = Atlas::new(vec![broken, empty]);
        assert_eq!(atlas.get(FeatureId(0)).unwrap().geometry.len(), 1);
        assert!(atlas.stats(FeatureId(0)).is_some());
        assert!(atlas.stats(FeatureId(1)).is_none());
    }

    #[test]
    fn test_region_kind_parse() {
        assert_eq!(RegionKind::parse("Sovereign country"), RegionKind::Sovereign);
        assert_eq!(RegionKind::parse("State"), RegionKind::State);
        assert_eq!(RegionKind::parse("Lease"), RegionKind::Other("Lease".into()));
    }
}
