//! Spherical geometry over longitude/latitude polygons.
//!
//! Coordinates are `(lon, lat)` pairs in degrees. Rings may or may not repeat
//! their first vertex at the end; every function here treats both forms alike.

use glam::DVec3;
use std::f64::consts::PI;

/// A geographic position, `(lon, lat)` in degrees
pub type LonLat = (f64, f64);

/// A closed ring of positions
pub type Ring = Vec<LonLat>;

/// Exterior ring first, holes after
pub type Polygon = Vec<Ring>;

pub type MultiPolygon = Vec<Polygon>;

/// Normalize longitude into [-180, 180)
#[inline(always)]
pub fn normalize_lon(lon: f64) -> f64 {
    (lon + 180.0).rem_euclid(360.0) - 180.0
}

/// Clamp latitude into [-90, 90]
#[inline(always)]
pub fn clamp_lat(lat: f64) -> f64 {
    lat.clamp(-90.0, 90.0)
}

/// Convert lon/lat (degrees) to a unit sphere vector.
#[inline(always)]
pub fn lonlat_to_vec3((lon, lat): LonLat) -> DVec3 {
    let (sin_lon, cos_lon) = lon.to_radians().sin_cos();
    let (sin_lat, cos_lat) = lat.to_radians().sin_cos();
    DVec3::new(cos_lat * cos_lon, cos_lat * sin_lon, sin_lat)
}

/// Convert a (not necessarily unit) vector back to lon/lat degrees.
#[inline(always)]
pub fn vec3_to_lonlat(v: DVec3) -> LonLat {
    let v = v.normalize();
    let lat = v.z.clamp(-1.0, 1.0).asin().to_degrees();
    let lon = v.y.atan2(v.x).to_degrees();
    (normalize_lon(lon), lat)
}

/// Interpolate along a great circle arc and call a visitor for each subdivision point.
/// ~2° segments; the start point is not emitted, the end point always is.
#[inline]
pub fn walk_great_circle(from: LonLat, to: LonLat, mut visitor: impl FnMut(LonLat)) {
    let a = lonlat_to_vec3(from);
    let b = lonlat_to_vec3(to);

    let angle = a.dot(b).clamp(-1.0, 1.0).acos();
    let steps = ((angle.to_degrees() / 2.0).ceil() as usize).max(1);

    let sin_angle = angle.sin();
    if steps == 1 || sin_angle.abs() < 1e-10 {
        visitor(to);
        return;
    }

    for i in 1..steps {
        let t = i as f64 / steps as f64;
        let sa = ((1.0 - t) * angle).sin() / sin_angle;
        let sb = (t * angle).sin() / sin_angle;
        visitor(vec3_to_lonlat(a * sa + b * sb));
    }
    visitor(to);
}

/// Ring without the duplicated closing vertex.
#[inline]
pub fn open_ring(ring: &[LonLat]) -> &[LonLat] {
    match (ring.first(), ring.last()) {
        (Some(first), Some(last)) if ring.len() > 1 && first == last => &ring[..ring.len() - 1],
        _ => ring,
    }
}

/// Axis-aligned lon/lat bounding box.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BBox {
    pub min_lon: f64,
    pub min_lat: f64,
    pub max_lon: f64,
    pub max_lat: f64,
}

impl BBox {
    pub const WORLD: BBox = BBox {
        min_lon: -180.0,
        min_lat: -90.0,
        max_lon: 180.0,
        max_lat: 90.0,
    };

    /// Bounding box of every vertex in the geometry, or `None` when it has none.
    ///
    /// Geometry whose longitudes span more than 180° is assumed to straddle
    /// the antimeridian and gets the full longitude range.
    pub fn of(geometry: &MultiPolygon) -> Option<Self> {
        let mut points = geometry.iter().flatten().flatten();
        let &(lon, lat) = points.next()?;
        let mut bbox = BBox {
            min_lon: lon,
            min_lat: lat,
            max_lon: lon,
            max_lat: lat,
        };
        for &(lon, lat) in points {
            bbox.min_lon = bbox.min_lon.min(lon);
            bbox.max_lon = bbox.max_lon.max(lon);
            bbox.min_lat = bbox.min_lat.min(lat);
            bbox.max_lat = bbox.max_lat.max(lat);
        }
        if bbox.max_lon - bbox.min_lon > 180.0 {
            bbox.min_lon = -180.0;
            bbox.max_lon = 180.0;
        }
        // A ring around a pole covers it even without a vertex there
        for exterior in geometry.iter().filter_map(|polygon| polygon.first()) {
            match enclosed_pole(open_ring(exterior)) {
                Some(Pole::North) => bbox.max_lat = 90.0,
                Some(Pole::South) => bbox.min_lat = -90.0,
                None => {}
            }
        }
        Some(bbox)
    }

    pub fn intersects(&self, other: &BBox) -> bool {
        self.min_lon <= other.max_lon
            && self.max_lon >= other.min_lon
            && self.min_lat <= other.max_lat
            && self.max_lat >= other.min_lat
    }

    /// Point test tolerant of boxes whose longitudes run past ±180.
    pub fn contains_point(&self, (lon, lat): LonLat) -> bool {
        if lat < self.min_lat || lat > self.max_lat {
            return false;
        }
        [lon, lon - 360.0, lon + 360.0]
            .into_iter()
            .any(|l| l >= self.min_lon && l <= self.max_lon)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Pole {
    North,
    South,
}

/// Net longitude travelled once around the ring, in radians: 0 for an
/// ordinary ring, ±2π for one that circles a pole.
fn winding(pts: &[LonLat]) -> f64 {
    let n = pts.len();
    (0..n)
        .map(|i| normalize_lon(pts[(i + 1) % n].0 - pts[i].0))
        .sum::<f64>()
        .to_radians()
}

/// ∮ sin φ dλ along the ring, edges taken as rhumb lines.
fn sin_lat_integral(pts: &[LonLat]) -> f64 {
    let n = pts.len();
    (0..n)
        .map(|i| {
            let (a, b) = (pts[i], pts[(i + 1) % n]);
            let dlon = normalize_lon(b.0 - a.0).to_radians();
            dlon * (a.1.to_radians().sin() + b.1.to_radians().sin()) / 2.0
        })
        .sum()
}

/// Area on each side of a pole-circling ring: `(north, south)`, summing to 4π.
fn polar_split(pts: &[LonLat], winding: f64) -> (f64, f64) {
    let north = (winding - sin_lat_integral(pts)).abs();
    (north, 4.0 * PI - north)
}

/// The pole a ring encloses, taken as the side with the smaller area.
fn enclosed_pole(pts: &[LonLat]) -> Option<Pole> {
    if pts.len() < 3 {
        return None;
    }
    let winding = winding(pts);
    if winding.abs() < PI {
        return None;
    }
    let (north, south) = polar_split(pts, winding);
    Some(if north <= south { Pole::North } else { Pole::South })
}

/// Unsigned spherical area of a ring on the unit sphere, in steradians.
///
/// Uses the Chamberlain-Duquette line integral, which is exact enough for
/// rings with short edges and works across the antimeridian. Rings circling
/// a pole measure the smaller of the two caps they bound.
pub fn ring_area(ring: &[LonLat]) -> f64 {
    let pts = open_ring(ring);
    if pts.len() < 3 {
        return 0.0;
    }
    let winding = winding(pts);
    if winding.abs() < PI {
        return sin_lat_integral(pts).abs();
    }
    let (north, south) = polar_split(pts, winding);
    north.min(south)
}

/// Area of one polygon: exterior minus holes, never negative.
pub fn polygon_area(polygon: &Polygon) -> f64 {
    let mut rings = polygon.iter();
    let Some(exterior) = rings.next() else {
        return 0.0;
    };
    let holes: f64 = rings.map(|r| ring_area(r)).sum();
    (ring_area(exterior) - holes).max(0.0)
}

pub fn area(geometry: &MultiPolygon) -> f64 {
    geometry.iter().map(polygon_area).sum()
}

/// Area-weighted centroid on the sphere.
///
/// Each ring is fanned into triangles from its first vertex; the triangle
/// centres are accumulated in 3D, weighted by signed triangle area, so the
/// result is independent of ring winding and of the antimeridian. Falls back
/// to the vertex mean for zero-area geometry. Returns `None` only when the
/// geometry has no usable vertices.
pub fn centroid(geometry: &MultiPolygon) -> Option<LonLat> {
    let mut acc = DVec3::ZERO;

    for polygon in geometry {
        for (ring_idx, ring) in polygon.iter().enumerate() {
            let pts = open_ring(ring);
            if pts.len() < 3 {
                continue;
            }
            let p0 = lonlat_to_vec3(pts[0]);
            let mut ring_sum = DVec3::ZERO;
            let mut ring_weight = 0.0;
            let mut prev = lonlat_to_vec3(pts[1]);
            for &pt in &pts[2..] {
                let next = lonlat_to_vec3(pt);
                let centre = p0 + prev + next;
                let cross = (prev - p0).cross(next - p0);
                let weight = cross.dot(centre.normalize_or_zero());
                ring_sum += centre * weight;
                ring_weight += weight;
                prev = next;
            }
            // Winding is not trusted; exterior rings add, holes subtract.
            let orient = if ring_weight < 0.0 { -1.0 } else { 1.0 };
            let role = if ring_idx == 0 { 1.0 } else { -1.0 };
            acc += ring_sum * orient * role;
        }
    }

    if acc.length_squared() > 1e-24 {
        return Some(vec3_to_lonlat(acc));
    }

    let mut mean = DVec3::ZERO;
    let mut count = 0usize;
    for &pt in geometry.iter().flatten().flatten() {
        if pt.0.is_finite() && pt.1.is_finite() {
            mean += lonlat_to_vec3(pt);
            count += 1;
        }
    }
    (count > 0 && mean.length_squared() > 1e-24).then(|| vec3_to_lonlat(mean))
}

/// Even-odd point-in-ring test. Longitudes are unwrapped along the ring,
/// so rings crossing the antimeridian behave. Rings circling a pole are
/// tested along the meridian from the point to that pole.
pub fn ring_contains(ring: &[LonLat], point: LonLat) -> bool {
    let pts = open_ring(ring);
    if pts.len() < 3 {
        return false;
    }
    match enclosed_pole(pts) {
        Some(pole) => polar_ring_contains(pts, point, pole),
        None => planar_ring_contains(pts, point),
    }
}

fn planar_ring_contains(pts: &[LonLat], (lon, lat): LonLat) -> bool {
    let n = pts.len();
    let unwrapped = move || {
        let mut x = pts[0].0;
        (0..=n).map(move |k| {
            if k > 0 {
                x += normalize_lon(pts[k % n].0 - pts[k - 1].0);
            }
            (x, pts[k % n].1)
        })
    };

    // Put the query on the same unwrapped sheet as the ring
    let min_x = unwrapped().map(|(x, _)| x).fold(f64::INFINITY, f64::min);
    let qx = min_x + (lon - min_x).rem_euclid(360.0);

    let mut inside = false;
    let mut edges = unwrapped();
    let Some((mut prev_x, mut prev_y)) = edges.next() else {
        return false;
    };
    for (cur_x, cur_y) in edges {
        if (cur_y > lat) != (prev_y > lat) {
            let x = prev_x + (lat - prev_y) / (cur_y - prev_y) * (cur_x - prev_x);
            if x > qx {
                inside = !inside;
            }
        }
        (prev_x, prev_y) = (cur_x, cur_y);
    }
    inside
}

/// Count ring crossings on the meridian between the point and the pole; the
/// point shares the pole's side when the count is even.
fn polar_ring_contains(pts: &[LonLat], (lon, lat): LonLat, pole: Pole) -> bool {
    let n = pts.len();
    let mut crossings = 0usize;
    for i in 0..n {
        let (a, b) = (pts[i], pts[(i + 1) % n]);
        let dlon = normalize_lon(b.0 - a.0);
        if dlon == 0.0 {
            continue;
        }
        // Span each edge west to east, half-open so a vertex meridian counts once
        let (west, east) = if dlon > 0.0 { (a, b) } else { (b, a) };
        let offset = (lon - west.0).rem_euclid(360.0);
        if offset >= dlon.abs() {
            continue;
        }
        let edge_lat = west.1 + offset / dlon.abs() * (east.1 - west.1);
        let between = match pole {
            Pole::North => edge_lat > lat,
            Pole::South => edge_lat < lat,
        };
        if between {
            crossings += 1;
        }
    }
    crossings % 2 == 0
}

pub fn contains(geometry: &MultiPolygon, point: LonLat) -> bool {
    geometry.iter().any(|polygon| {
        let mut rings = polygon.iter();
        match rings.next() {
            Some(exterior) => {
                ring_contains(exterior, point) && !rings.any(|hole| ring_contains(hole, point))
            }
            None => false,
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square(lon: f64, lat: f64, half: f64) -> MultiPolygon {
        vec![vec![vec![
            (lon - half, lat - half),
            (lon + half, lat - half),
            (lon + half, lat + half),
            (lon - half, lat + half),
            (lon - half, lat - half),
        ]]]
    }

    #[test]
    fn test_normalize_lon() {
        assert_eq!(normalize_lon(190.0), -170.0);
        assert_eq!(normalize_lon(-190.0), 170.0);
        assert_eq!(normalize_lon(180.0), -180.0);
        assert_eq!(normalize_lon(45.0), 45.0);
    }

    #[test]
    fn test_one_degree_square_area() {
        // 1°x1° at the equator is (π/180)² sr to within a fraction of a percent
        let expected = (1.0f64).to_radians().powi(2);
        let got = area(&square(0.0, 0.0, 0.5));
        assert!((got - expected).abs() / expected < 0.01, "{got} vs {expected}");
    }

    #[test]
    fn test_area_ignores_winding() {
        let mut reversed = square(30.0, 10.0, 2.0);
        reversed[0][0].reverse();
        assert!((area(&reversed) - area(&square(30.0, 10.0, 2.0))).abs() < 1e-12);
    }

    #[test]
    fn test_hole_reduces_area() {
        let mut with_hole = square(0.0, 0.0, 2.0);
        with_hole[0].push(square(0.0, 0.0, 1.0)[0][0].clone());
        let outer = area(&square(0.0, 0.0, 2.0));
        let inner = area(&square(0.0, 0.0, 1.0));
        assert!((area(&with_hole) - (outer - inner)).abs() < 1e-12);
    }

    #[test]
    fn test_centroid_of_square() {
        let (lon, lat) = centroid(&square(10.0, 20.0, 1.0)).unwrap();
        assert!((lon - 10.0).abs() < 1e-6);
        assert!((lat - 20.0).abs() < 0.05);
    }

    #[test]
    fn test_centroid_across_antimeridian() {
        let geom = vec![vec![vec![(178.0, -1.0), (-178.0, -1.0), (-178.0, 1.0), (178.0, 1.0)]]];
        let (lon, lat) = centroid(&geom).unwrap();
        assert!((lon.abs() - 180.0).abs() < 1e-6, "lon = {lon}");
        assert!(lat.abs() < 1e-6);
    }

    #[test]
    fn test_centroid_of_degenerate_ring_falls_back_to_mean() {
        let geom = vec![vec![vec![(5.0, 5.0), (5.0, 5.0), (5.0, 5.0)]]];
        let (lon, lat) = centroid(&geom).unwrap();
        assert!((lon - 5.0).abs() < 1e-9 && (lat - 5.0).abs() < 1e-9);
        assert_eq!(centroid(&vec![]), None);
    }

    #[test]
    fn test_contains() {
        let geom = square(0.0, 0.0, 1.0);
        assert!(contains(&geom, (0.0, 0.0)));
        assert!(!contains(&geom, (3.0, 0.0)));

        let dateline = vec![vec![vec![(178.0, -1.0), (-178.0, -1.0), (-178.0, 1.0), (178.0, 1.0)]]];
        assert!(contains(&dateline, (179.5, 0.0)));
        assert!(contains(&dateline, (-179.5, 0.0)));
        assert!(!contains(&dateline, (0.0, 0.0)));
    }

    #[test]
    fn test_bbox_wraps_antimeridian() {
        let dateline = vec![vec![vec![(178.0, -1.0), (-178.0, -1.0), (-178.0, 1.0)]]];
        let bbox = BBox::of(&dateline).unwrap();
        assert_eq!(bbox.min_lon, -180.0);
        assert_eq!(bbox.max_lon, 180.0);
    }

    #[test]
    fn test_bbox_contains_point_past_dateline() {
        let bbox = BBox {
            min_lon: 170.0,
            min_lat: -5.0,
            max_lon: 190.0,
            max_lat: 5.0,
        };
        assert!(bbox.contains_point((-175.0, 0.0)));
        assert!(bbox.contains_point((175.0, 5.0)));
        assert!(!bbox.contains_point((175.0, 6.0)));
        assert!(!bbox.contains_point((0.0, 0.0)));
    }

    fn arctic_cap() -> Ring {
        vec![(0.0, 80.0), (90.0, 80.0), (180.0, 80.0), (-90.0, 80.0)]
    }

    /// Coast at 70°S, closed along the pole the way datasets draw Antarctica
    fn antarctic() -> Ring {
        vec![
            (-180.0, -70.0),
            (-90.0, -70.0),
            (0.0, -70.0),
            (90.0, -70.0),
            (180.0, -70.0),
            (180.0, -90.0),
            (-180.0, -90.0),
            (-180.0, -70.0),
        ]
    }

    #[test]
    fn test_polar_cap_area() {
        // Cap above latitude φ is 2π(1 - sin φ)
        let cap = 2.0 * PI * (1.0 - 80f64.to_radians().sin());
        let got = ring_area(&arctic_cap());
        assert!((got - cap).abs() < 1e-9, "{got} vs {cap}");

        let mut reversed = arctic_cap();
        reversed.reverse();
        assert!((ring_area(&reversed) - cap).abs() < 1e-9);

        let south = 2.0 * PI * (1.0 - 70f64.to_radians().sin());
        let got = ring_area(&antarctic());
        assert!((got - south).abs() < 1e-9, "{got} vs {south}");
    }

    #[test]
    fn test_contains_around_pole() {
        let cap = vec![vec![arctic_cap()]];
        assert!(contains(&cap, (0.0, 85.0)));
        assert!(contains(&cap, (-135.0, 89.0)));
        assert!(!contains(&cap, (45.0, 70.0)));

        let south = vec![vec![antarctic()]];
        for lon in [-90.0, 0.0, 90.0, 170.0, -179.0] {
            assert!(contains(&south, (lon, -80.0)), "lon {lon}");
        }
        assert!(!contains(&south, (0.0, -60.0)));
        assert!(!contains(&south, (120.0, 10.0)));
    }

    #[test]
    fn test_bbox_reaches_enclosed_pole() {
        let bbox = BBox::of(&vec![vec![arctic_cap()]]).unwrap();
        assert_eq!(bbox.max_lat, 90.0);
        assert_eq!(bbox.min_lat, 80.0);
        assert!(bbox.contains_point((10.0, 88.0)));
    }

    #[test]
    fn test_walk_great_circle_ends_at_target() {
        let mut points = Vec::new();
        walk_great_circle((0.0, 0.0), (9.0, 0.0), |p| points.push(p));
        assert_eq!(points.len(), 5);
        assert_eq!(*points.last().unwrap(), (9.0, 0.0));
        assert!((points[0].0 - 1.8).abs() < 1e-9);
    }
}
