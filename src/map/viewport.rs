use glam::DVec2;

use crate::error::{finite, MapError, Result};
use crate::geo::{clamp_lat, normalize_lon, LonLat};
use crate::map::projection::Projection;

/// Zoom bounds as multiples of the projection's base scale.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ZoomExtent {
    pub min: f64,
    pub max: f64,
}

impl ZoomExtent {
    pub const fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }
}

/// The engine's only mutable view state: where the view looks, how far it is
/// zoomed, and the container it fills.
///
/// Invariants: `scale` stays within `[scale_min(), scale_max()]` and the centre
/// longitude stays in [-180, 180).
#[derive(Clone, Debug, PartialEq)]
pub struct ViewportState {
    /// Geographic point at the container centre
    pub center: LonLat,
    /// Zoom factor in projection units (sphere radius in pixels for the globe)
    pub scale: f64,
    /// Planar rotation in degrees, clockwise. Only flat projections use it.
    pub bearing: f64,
    /// Canvas pixel width
    pub width: f64,
    /// Canvas pixel height
    pub height: f64,
    base_scale: f64,
    extent: ZoomExtent,
}

impl ViewportState {
    /// Default view for a container: projection's default centre at its base scale.
    pub fn initialize<P: Projection>(projection: &P, width: usize, height: usize) -> Result<Self> {
        check_container(width, height)?;
        let (w, h) = (width as f64, height as f64);
        let base_scale = projection.base_scale(w, h);
        let (lon, lat) = projection.default_center();
        Ok(Self {
            center: (normalize_lon(lon), clamp_lat(lat)),
            scale: base_scale,
            bearing: 0.0,
            width: w,
            height: h,
            base_scale,
            extent: projection.zoom_extent(),
        })
    }

    pub fn base_scale(&self) -> f64 {
        self.base_scale
    }

    pub fn scale_min(&self) -> f64 {
        self.base_scale * self.extent.min
    }

    pub fn scale_max(&self) -> f64 {
        self.base_scale * self.extent.max
    }

    /// Current scale relative to the base scale
    pub fn zoom(&self) -> f64 {
        self.scale / self.base_scale
    }

    #[inline]
    fn clamp_scale(&self, scale: f64) -> f64 {
        scale.clamp(self.scale_min(), self.scale_max())
    }

    /// Shift the centre by a pointer delta. Dividing by the current scale keeps
    /// a pixel of drag covering the same screen distance at every zoom level.
    /// On a rotated map the delta is turned back by the bearing first, so the
    /// ground still moves with the pointer.
    pub fn apply_rotation_delta(&mut self, dx: f64, dy: f64, sensitivity: f64) -> Result<()> {
        let dx = finite("dx", dx)?;
        let dy = finite("dy", dy)?;
        let k = finite("sensitivity", sensitivity)?;
        if dx == 0.0 && dy == 0.0 {
            return Ok(());
        }
        let delta = self.unrotate(DVec2::new(dx, dy));
        self.rotate_degrees(-delta.x * k / self.scale, delta.y * k / self.scale)
    }

    /// Screen delta as it would be with zero bearing. Screen y points down,
    /// the bearing turns the map plane counterclockwise.
    fn unrotate(&self, delta: DVec2) -> DVec2 {
        if self.bearing == 0.0 {
            return delta;
        }
        let (sin_b, cos_b) = self.bearing.to_radians().sin_cos();
        let plane = DVec2::new(cos_b, -sin_b).rotate(DVec2::new(delta.x, -delta.y));
        DVec2::new(plane.x, -plane.y)
    }

    /// Move the centre by whole degrees.
    pub fn rotate_degrees(&mut self, dlon: f64, dlat: f64) -> Result<()> {
        let dlon = finite("dlon", dlon)?;
        let dlat = finite("dlat", dlat)?;
        let (lon, lat) = self.center;
        let next = (normalize_lon(lon + dlon), clamp_lat(lat + dlat));
        if next.0.is_finite() && next.1.is_finite() {
            self.center = next;
        }
        Ok(())
    }

    /// Multiply the scale, clamping silently into the zoom range.
    pub fn apply_zoom_delta(&mut self, factor: f64) -> Result<()> {
        let factor = finite("zoom factor", factor)?;
        if factor <= 0.0 {
            return Err(MapError::InvalidGesture {
                what: "zoom factor",
                value: factor,
            });
        }
        self.scale = self.clamp_scale(self.scale * factor);
        Ok(())
    }

    /// Put `point` at the centre and zoom in to at least `min_zoom` (relative
    /// to the base scale). Never zooms out.
    pub fn recenter_on(&mut self, point: LonLat, min_zoom: f64) -> Result<()> {
        let lon = finite("lon", point.0)?;
        let lat = finite("lat", point.1)?;
        let min_zoom = finite("min zoom", min_zoom)?;
        self.center = (normalize_lon(lon), clamp_lat(lat));
        let floor = self.base_scale * min_zoom;
        if self.scale < floor {
            self.scale = self.clamp_scale(floor);
        }
        Ok(())
    }

    pub fn rotate_bearing(&mut self, degrees: f64) -> Result<()> {
        let degrees = finite("bearing", degrees)?;
        self.bearing = (self.bearing + degrees).rem_euclid(360.0);
        Ok(())
    }

    /// Refit to a new container, keeping the relative zoom. A degenerate size
    /// is rejected and leaves the state untouched.
    pub fn update_container_size<P: Projection>(
        &mut self,
        projection: &P,
        width: usize,
        height: usize,
    ) -> Result<()> {
        check_container(width, height)?;
        let zoom = self.zoom();
        self.width = width as f64;
        self.height = height as f64;
        self.base_scale = projection.base_scale(self.width, self.height);
        self.scale = self.clamp_scale(self.base_scale * zoom);
        Ok(())
    }

    /// Back to the default centre and base scale, keeping the container.
    pub fn reset<P: Projection>(&mut self, projection: &P) {
        let (lon, lat) = projection.default_center();
        self.center = (normalize_lon(lon), clamp_lat(lat));
        self.scale = self.clamp_scale(self.base_scale);
        self.bearing = 0.0;
    }
}

fn check_container(width: usize, height: usize) -> Result<()> {
    if width == 0 || height == 0 {
        return Err(MapError::DegenerateContainer { width, height });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::map::projection::{AlbersUsa, Orthographic, Projection, ScreenTransform};

    fn globe() -> ViewportState {
        ViewportState::initialize(&Orthographic, 200, 100).unwrap()
    }

    #[test]
    fn test_initialize_fits_container() {
        let vp = globe();
        assert_eq!(vp.center, (0.0, 0.0));
        assert!((vp.scale - 47.5).abs() < 1e-9);
        assert_eq!(vp.zoom(), 1.0);
    }

    #[test]
    fn test_degenerate_container_fails() {
        assert_eq!(
            ViewportState::initialize(&Orthographic, 0, 100),
            Err(MapError::DegenerateContainer { width: 0, height: 100 })
        );
        assert!(ViewportState::initialize(&AlbersUsa::default(), 100, 0).is_err());
    }

    #[test]
    fn test_zoom_clamped_for_any_sequence() {
        let mut vp = globe();
        let factors = [1e9, 0.5, 3.0, 1e-9, 2.0, 2.0, 2.0, 2.0, 2.0, 0.1, 7.0, f64::MAX, f64::MIN_POSITIVE];
        for f in factors {
            vp.apply_zoom_delta(f).unwrap();
            assert!(vp.scale >= vp.scale_min() && vp.scale <= vp.scale_max(), "{f}: {}", vp.scale);
        }
    }

    #[test]
    fn test_huge_zoom_lands_on_max() {
        let mut vp = globe();
        vp.apply_zoom_delta(1000.0).unwrap();
        assert_eq!(vp.scale, vp.scale_max());
    }

    #[test]
    fn test_bad_zoom_input_is_rejected_without_change() {
        let mut vp = globe();
        let before = vp.clone();
        for f in [f64::NAN, f64::INFINITY, 0.0, -2.0] {
            assert!(matches!(vp.apply_zoom_delta(f), Err(MapError::InvalidGesture { .. })));
        }
        assert_eq!(vp, before);
    }

    #[test]
    fn test_zero_drag_keeps_center() {
        let mut vp = globe();
        vp.center = (12.5, -33.0);
        vp.apply_rotation_delta(0.0, 0.0, 75.0).unwrap();
        assert_eq!(vp.center, (12.5, -33.0));
    }

    #[test]
    fn test_drag_is_scale_invariant() {
        let mut near = globe();
        let mut far = globe();
        near.apply_zoom_delta(4.0).unwrap();

        near.apply_rotation_delta(10.0, 0.0, 75.0).unwrap();
        far.apply_rotation_delta(10.0, 0.0, 75.0).unwrap();
        let near_step = near.center.0.abs();
        let far_step = far.center.0.abs();
        assert!((far_step / near_step - 4.0).abs() < 1e-9);
    }

    #[test]
    fn test_drag_follows_cursor() {
        let mut vp = globe();
        // Dragging right brings western ground into view
        vp.apply_rotation_delta(10.0, 10.0, 75.0).unwrap();
        assert!(vp.center.0 < 0.0);
        assert!(vp.center.1 > 0.0);
    }

    #[test]
    fn test_drag_follows_cursor_on_rotated_map() {
        let albers = AlbersUsa::default();
        let mut vp = ViewportState::initialize(&albers, 200, 100).unwrap();
        vp.rotate_bearing(90.0).unwrap();
        let anchor = vp.center;
        let before = albers.frame(&vp).project(anchor).unwrap();

        vp.apply_rotation_delta(10.0, 0.0, 75.0).unwrap();
        let after = albers.frame(&vp).project(anchor).unwrap();
        let moved = after - before;
        assert!(moved.x > 0.0, "{moved:?}");
        assert!(moved.y.abs() < moved.x * 0.2, "{moved:?}");

        // Unrotated, the same drag only changes longitude
        let mut flat = ViewportState::initialize(&albers, 200, 100).unwrap();
        let lat = flat.center.1;
        flat.apply_rotation_delta(10.0, 0.0, 75.0).unwrap();
        assert_eq!(flat.center.1, lat);
    }

    #[test]
    fn test_rotation_wraps_and_clamps() {
        let mut vp = globe();
        vp.center = (179.0, 89.0);
        vp.rotate_degrees(2.0, 5.0).unwrap();
        assert!((vp.center.0 + 179.0).abs() < 1e-9);
        assert_eq!(vp.center.1, 90.0);
    }

    #[test]
    fn test_nan_drag_is_rejected() {
        let mut vp = globe();
        assert!(vp.apply_rotation_delta(f64::NAN, 1.0, 75.0).is_err());
        assert!(vp.apply_rotation_delta(1.0, f64::NEG_INFINITY, 75.0).is_err());
        assert_eq!(vp.center, (0.0, 0.0));
    }

    #[test]
    fn test_recenter_raises_zoom_but_never_lowers_it() {
        let mut vp = globe();
        vp.recenter_on((200.0, 45.0), 2.0).unwrap();
        assert!((vp.center.0 + 160.0).abs() < 1e-9);
        assert_eq!(vp.zoom(), 2.0);

        vp.apply_zoom_delta(3.0).unwrap();
        vp.recenter_on((0.0, 0.0), 2.0).unwrap();
        assert_eq!(vp.zoom(), 6.0);
    }

    #[test]
    fn test_resize_keeps_relative_zoom() {
        let mut vp = globe();
        vp.apply_zoom_delta(2.0).unwrap();
        vp.update_container_size(&Orthographic, 400, 400).unwrap();
        assert!((vp.scale - 380.0).abs() < 1e-9);
        assert_eq!(vp.zoom(), 2.0);

        let before = vp.clone();
        assert!(vp.update_container_size(&Orthographic, 0, 0).is_err());
        assert_eq!(vp, before);
    }

    #[test]
    fn test_bearing_wraps() {
        let mut vp = ViewportState::initialize(&AlbersUsa::default(), 200, 100).unwrap();
        vp.rotate_bearing(-30.0).unwrap();
        assert_eq!(vp.bearing, 330.0);
    }
}
