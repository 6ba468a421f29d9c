use glam::{DVec2, DVec3};
use std::f64::consts::PI;

use crate::geo::{lonlat_to_vec3, normalize_lon, BBox, LonLat};
use crate::map::viewport::{ViewportState, ZoomExtent};

/// A map projection the view can be parameterized over.
///
/// The projection itself is stateless configuration; [`Projection::frame`]
/// binds it to the current viewport so per-point work stays cheap while a
/// whole scene is projected.
pub trait Projection {
    type Frame: ScreenTransform;

    fn name(&self) -> &'static str;

    /// Scale at which the projection fills a container of this size.
    fn base_scale(&self, width: f64, height: f64) -> f64;

    /// Allowed zoom range, as multiples of the base scale.
    fn zoom_extent(&self) -> ZoomExtent;

    /// Where the view looks when first mounted.
    fn default_center(&self) -> LonLat;

    /// Whether polygon edges should follow great circles between vertices.
    fn resample_edges(&self) -> bool;

    /// Whether the viewport bearing rotates the picture.
    fn supports_bearing(&self) -> bool {
        false
    }

    fn frame(&self, view: &ViewportState) -> Self::Frame;
}

/// Projection bound to one viewport state.
pub trait ScreenTransform {
    /// Project a geographic point to canvas pixels. `None` when the point is
    /// not visible from this view (back side of the globe).
    fn project(&self, point: LonLat) -> Option<DVec2>;

    /// Project, pulling hidden points onto the visible boundary instead of
    /// dropping them. The flag is `true` for pulled points.
    fn project_clamped(&self, point: LonLat) -> (DVec2, bool) {
        match self.project(point) {
            Some(p) => (p, false),
            None => (DVec2::new(f64::NAN, f64::NAN), true),
        }
    }

    fn unproject(&self, screen: DVec2) -> Option<LonLat>;

    /// Conservative lat/lon bounding box of what can be on screen.
    fn visible_bounds(&self) -> BBox;
}

/// Sphere globe seen from infinitely far away.
#[derive(Clone, Copy, Debug, Default)]
pub struct Orthographic;

/// Orthographic projection bound to a view: the camera basis plus canvas
/// geometry. Scale is the sphere radius in canvas pixels.
#[derive(Clone, Debug)]
pub struct OrthographicFrame {
    /// Forward direction (what points at the camera)
    forward: DVec3,
    /// Right direction (east at the centre)
    right: DVec3,
    /// Up direction (north at the centre)
    up: DVec3,
    radius: f64,
    half: DVec2,
}

impl OrthographicFrame {
    pub fn new(center: LonLat, radius: f64, width: f64, height: f64) -> Self {
        let (sin_lon, cos_lon) = center.0.to_radians().sin_cos();

        let forward = lonlat_to_vec3(center);
        // East along the parallel; stays defined at the poles
        let right = DVec3::new(-sin_lon, cos_lon, 0.0);
        let up = forward.cross(right).normalize();

        Self {
            forward,
            right,
            up,
            radius,
            half: DVec2::new(width / 2.0, height / 2.0),
        }
    }

    #[inline(always)]
    fn to_screen(&self, sx: f64, sy: f64) -> DVec2 {
        DVec2::new(self.half.x + sx * self.radius, self.half.y - sy * self.radius)
    }
}

impl ScreenTransform for OrthographicFrame {
    #[inline]
    fn project(&self, point: LonLat) -> Option<DVec2> {
        let p = lonlat_to_vec3(point);
        if p.dot(self.forward) < 0.0 {
            return None;
        }
        Some(self.to_screen(p.dot(self.right), p.dot(self.up)))
    }

    #[inline]
    fn project_clamped(&self, point: LonLat) -> (DVec2, bool) {
        let p = lonlat_to_vec3(point);
        let (sx, sy) = (p.dot(self.right), p.dot(self.up));
        if p.dot(self.forward) >= 0.0 {
            return (self.to_screen(sx, sy), false);
        }
        // Behind the globe: slide out to the limb along the same bearing
        let len = (sx * sx + sy * sy).sqrt();
        if len < 1e-12 {
            return (self.to_screen(0.0, 1.0), true);
        }
        (self.to_screen(sx / len, sy / len), true)
    }

    fn unproject(&self, screen: DVec2) -> Option<LonLat> {
        let sx = (screen.x - self.half.x) / self.radius;
        let sy = -(screen.y - self.half.y) / self.radius;

        let r2 = sx * sx + sy * sy;
        if r2 > 1.0 {
            return None;
        }

        let sz = (1.0 - r2).sqrt();
        let p = self.right * sx + self.up * sy + self.forward * sz;

        let lat = p.z.clamp(-1.0, 1.0).asin().to_degrees();
        let lon = p.y.atan2(p.x).to_degrees();
        Some((normalize_lon(lon), lat))
    }

    /// Samples the visible disk edge. Wide spans fall back to the full
    /// longitude range; a visible pole extends latitude to it.
    fn visible_bounds(&self) -> BBox {
        let center_lat = self.forward.z.clamp(-1.0, 1.0).asin().to_degrees();
        let center_lon = self.forward.y.atan2(self.forward.x).to_degrees();

        // Zoomed in, the visible disk is smaller than the hemisphere
        let half_w = self.half.x / self.radius;
        let half_h = self.half.y / self.radius;
        let reach = (half_w * half_w + half_h * half_h).sqrt().min(1.0);
        let depth = (1.0 - reach * reach).sqrt();

        let mut bbox = BBox {
            min_lon: center_lon,
            min_lat: center_lat,
            max_lon: center_lon,
            max_lat: center_lat,
        };
        for i in 0..32 {
            let angle = (i as f64 / 32.0) * 2.0 * PI;
            let p = self.right * (angle.cos() * reach)
                + self.up * (angle.sin() * reach)
                + self.forward * depth;
            let lat = p.z.clamp(-1.0, 1.0).asin().to_degrees();
            let lon = p.y.atan2(p.x).to_degrees();
            bbox.min_lon = bbox.min_lon.min(lon);
            bbox.max_lon = bbox.max_lon.max(lon);
            bbox.min_lat = bbox.min_lat.min(lat);
            bbox.max_lat = bbox.max_lat.max(lat);
        }

        if bbox.max_lon - bbox.min_lon > 180.0 {
            bbox.min_lon = -180.0;
            bbox.max_lon = 180.0;
        }

        // A pole is on screen when it lies inside the visible disk
        let pole_reach = (1.0 - self.forward.z.abs().min(1.0).powi(2)).sqrt();
        if pole_reach <= reach {
            bbox.min_lon = -180.0;
            bbox.max_lon = 180.0;
            if self.forward.z >= 0.0 {
                bbox.max_lat = 90.0;
            } else {
                bbox.min_lat = -90.0;
            }
        }

        // Edge samples miss slivers between them; pad by a couple of degrees
        BBox {
            min_lon: (bbox.min_lon - 2.0).max(-180.0),
            min_lat: (bbox.min_lat - 2.0).max(-90.0),
            max_lon: (bbox.max_lon + 2.0).min(180.0),
            max_lat: (bbox.max_lat + 2.0).min(90.0),
        }
    }
}

impl Projection for Orthographic {
    type Frame = OrthographicFrame;

    fn name(&self) -> &'static str {
        "globe"
    }

    fn base_scale(&self, width: f64, height: f64) -> f64 {
        width.min(height) / 2.0 * 0.95
    }

    fn zoom_extent(&self) -> ZoomExtent {
        ZoomExtent::new(0.5, 20.0)
    }

    fn default_center(&self) -> LonLat {
        (0.0, 0.0)
    }

    fn resample_edges(&self) -> bool {
        true
    }

    fn frame(&self, view: &ViewportState) -> OrthographicFrame {
        OrthographicFrame::new(view.center, view.scale, view.width, view.height)
    }
}

/// Albers equal-area conic tuned for the contiguous United States.
#[derive(Clone, Copy, Debug)]
pub struct AlbersUsa {
    /// Standard parallels, degrees
    pub parallels: (f64, f64),
    /// Latitude of origin, degrees
    pub origin_lat: f64,
    /// Central meridian, degrees
    pub central_meridian: f64,
}

impl Default for AlbersUsa {
    fn default() -> Self {
        Self {
            parallels: (29.5, 45.5),
            origin_lat: 37.5,
            central_meridian: -96.0,
        }
    }
}

/// Conic constants shared by forward and inverse projection (unit sphere).
#[derive(Clone, Copy, Debug)]
struct Conic {
    n: f64,
    c: f64,
    rho0: f64,
    lon0: f64,
}

impl Conic {
    fn new(albers: &AlbersUsa) -> Self {
        let phi1 = albers.parallels.0.to_radians();
        let phi2 = albers.parallels.1.to_radians();
        let n = (phi1.sin() + phi2.sin()) / 2.0;
        let c = phi1.cos().powi(2) + 2.0 * n * phi1.sin();
        let rho0 = (c - 2.0 * n * albers.origin_lat.to_radians().sin()).max(0.0).sqrt() / n;
        Self {
            n,
            c,
            rho0,
            lon0: albers.central_meridian,
        }
    }

    #[inline(always)]
    fn forward(&self, (lon, lat): LonLat) -> DVec2 {
        let rho = (self.c - 2.0 * self.n * lat.to_radians().sin()).max(0.0).sqrt() / self.n;
        let theta = self.n * normalize_lon(lon - self.lon0).to_radians();
        DVec2::new(rho * theta.sin(), self.rho0 - rho * theta.cos())
    }

    fn inverse(&self, p: DVec2) -> LonLat {
        let dy = self.rho0 - p.y;
        let rho = (p.x * p.x + dy * dy).sqrt() * self.n.signum();
        let theta = (p.x * self.n.signum()).atan2(dy * self.n.signum());
        let lon = self.lon0 + (theta / self.n).to_degrees();
        let sin_lat = ((self.c - (rho * self.n).powi(2)) / (2.0 * self.n)).clamp(-1.0, 1.0);
        (normalize_lon(lon), sin_lat.asin().to_degrees())
    }
}

/// Albers bound to a view: centre offset, bearing rotation and scale.
#[derive(Clone, Debug)]
pub struct AlbersFrame {
    conic: Conic,
    origin: DVec2,
    /// Bearing as a unit rotation (cos, sin)
    rotation: DVec2,
    scale: f64,
    half: DVec2,
    width: f64,
    height: f64,
}

impl ScreenTransform for AlbersFrame {
    #[inline]
    fn project(&self, point: LonLat) -> Option<DVec2> {
        let p = self.conic.forward(point) - self.origin;
        let r = self.rotation.rotate(p);
        let screen = DVec2::new(self.half.x + r.x * self.scale, self.half.y - r.y * self.scale);
        screen.is_finite().then_some(screen)
    }

    fn unproject(&self, screen: DVec2) -> Option<LonLat> {
        let r = DVec2::new(
            (screen.x - self.half.x) / self.scale,
            -(screen.y - self.half.y) / self.scale,
        );
        // Inverse rotation: conjugate of (cos, sin)
        let p = DVec2::new(self.rotation.x, -self.rotation.y).rotate(r) + self.origin;
        let point = self.conic.inverse(p);
        (point.0.is_finite() && point.1.is_finite()).then_some(point)
    }

    /// Unprojects the canvas border; conic lines of latitude bow, so the
    /// extremes are sampled along every edge rather than just the corners.
    fn visible_bounds(&self) -> BBox {
        let mut bbox: Option<BBox> = None;
        let steps = 8;
        for i in 0..=steps {
            let t = i as f64 / steps as f64;
            for screen in [
                DVec2::new(t * self.width, 0.0),
                DVec2::new(t * self.width, self.height),
                DVec2::new(0.0, t * self.height),
                DVec2::new(self.width, t * self.height),
            ] {
                let Some((lon, lat)) = self.unproject(screen) else {
                    continue;
                };
                let b = bbox.get_or_insert(BBox {
                    min_lon: lon,
                    min_lat: lat,
                    max_lon: lon,
                    max_lat: lat,
                });
                b.min_lon = b.min_lon.min(lon);
                b.max_lon = b.max_lon.max(lon);
                b.min_lat = b.min_lat.min(lat);
                b.max_lat = b.max_lat.max(lat);
            }
        }
        match bbox {
            Some(b) if b.max_lon - b.min_lon <= 180.0 => BBox {
                min_lon: (b.min_lon - 1.0).max(-180.0),
                min_lat: (b.min_lat - 1.0).max(-90.0),
                max_lon: (b.max_lon + 1.0).min(180.0),
                max_lat: (b.max_lat + 1.0).min(90.0),
            },
            _ => BBox::WORLD,
        }
    }
}

impl Projection for AlbersUsa {
    type Frame = AlbersFrame;

    fn name(&self) -> &'static str {
        "usa"
    }

    fn base_scale(&self, width: f64, height: f64) -> f64 {
        (width * 1.25).min(height * 2.0)
    }

    fn zoom_extent(&self) -> ZoomExtent {
        ZoomExtent::new(1.0, 8.0)
    }

    fn default_center(&self) -> LonLat {
        (self.central_meridian, 38.7)
    }

    fn resample_edges(&self) -> bool {
        false
    }

    fn supports_bearing(&self) -> bool {
        true
    }

    fn frame(&self, view: &ViewportState) -> AlbersFrame {
        let conic = Conic::new(self);
        let (sin_b, cos_b) = view.bearing.to_radians().sin_cos();
        AlbersFrame {
            conic,
            origin: conic.forward(view.center),
            rotation: DVec2::new(cos_b, sin_b),
            scale: view.scale,
            half: DVec2::new(view.width / 2.0, view.height / 2.0),
            width: view.width,
            height: view.height,
        }
    }
}
