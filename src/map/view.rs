use glam::DVec2;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::config::AutoRotate;
use crate::error::Result;
use crate::geo::{self, LonLat};
use crate::map::atlas::{Atlas, FeatureId};
use crate::map::gesture::{Click, GestureTranslator, ZoomDirection, DRAG_SENSITIVITY};
use crate::map::projection::{Projection, ScreenTransform};
use crate::map::renderer::{
    auto_center_on_selection_change, compute_marker_eligibility, render_marker, MapRenderer,
    MarkerIcon, Palette, RenderedScene, SelectionChange, SelectionTracker,
};
use crate::map::viewport::ViewportState;
use crate::timer::{TimerHandle, Timers};

/// Degrees of longitude per auto-rotate tick
const AUTO_ROTATE_STEP: f64 = 1.0;

/// Where the view is in its render cycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RenderPhase {
    Idle,
    GestureActive,
    SelectionChanged,
    Recentering,
    Recomputing,
}

#[derive(Clone, Debug)]
pub struct ViewSettings {
    pub show_borders: bool,
    pub show_markers: bool,
    pub show_zoom_controls: bool,
    pub sensitivity: f64,
    /// Steradians
    pub marker_area_threshold: f64,
    pub min_focus_zoom: f64,
    pub palette: Palette,
    pub icon: Arc<MarkerIcon>,
}

impl Default for ViewSettings {
    fn default() -> Self {
        Self {
            show_borders: true,
            show_markers: true,
            show_zoom_controls: true,
            sensitivity: DRAG_SENSITIVITY,
            marker_area_threshold: crate::config::DEFAULT_MARKER_AREA_THRESHOLD,
            min_focus_zoom: 2.0,
            palette: Palette::default(),
            icon: Arc::new(crate::config::MarkerAsset::default().icon()),
        }
    }
}

struct Spin {
    handle: TimerHandle,
    direction: f64,
}

/// Interactive map over one projection.
///
/// Owns the viewport and everything derived from it. Input methods only mutate
/// state and raise a render request; [`MapView::render`] does the work at most
/// once per frame.
pub struct MapView<P: Projection> {
    projection: P,
    atlas: Arc<Atlas>,
    viewport: ViewportState,
    gestures: GestureTranslator,
    renderer: MapRenderer,
    selection: SelectionTracker,
    selected_name: Option<String>,
    eligible: HashSet<FeatureId>,
    settings: ViewSettings,
    spin: Option<Spin>,
    phase: RenderPhase,
    frames: u64,
    on_region_clicked: Option<Box<dyn FnMut(&str)>>,
}

impl<P: Projection> MapView<P> {
    /// Mount a view on a container of `width` x `height` pixels.
    pub fn new(
        projection: P,
        atlas: Arc<Atlas>,
        width: usize,
        height: usize,
        settings: ViewSettings,
    ) -> Result<Self> {
        let viewport = ViewportState::initialize(&projection, width, height)?;
        let renderer = MapRenderer::new(&atlas, projection.resample_edges());
        let eligible = compute_marker_eligibility(&atlas, settings.marker_area_threshold);
        let mut gestures = GestureTranslator::new(settings.sensitivity);
        gestures.request_render();

        tracing::debug!(
            projection = projection.name(),
            width,
            height,
            features = atlas.len(),
            "mounted map view"
        );

        Ok(Self {
            projection,
            atlas,
            viewport,
            gestures,
            renderer,
            selection: SelectionTracker::default(),
            selected_name: None,
            eligible,
            settings,
            spin: None,
            phase: RenderPhase::Idle,
            frames: 0,
            on_region_clicked: None,
        })
    }

    pub fn projection(&self) -> &P {
        &self.projection
    }

    pub fn atlas(&self) -> &Arc<Atlas> {
        &self.atlas
    }

    pub fn viewport(&self) -> &ViewportState {
        &self.viewport
    }

    pub fn settings(&self) -> &ViewSettings {
        &self.settings
    }

    pub fn phase(&self) -> RenderPhase {
        self.phase
    }

    /// Render passes run so far
    pub fn frames(&self) -> u64 {
        self.frames
    }

    /// The last rendered scene
    pub fn scene(&self) -> &RenderedScene {
        self.renderer.scene()
    }

    pub fn selected(&self) -> Option<FeatureId> {
        self.selection.selected()
    }

    pub fn selected_name(&self) -> Option<&str> {
        self.selected_name.as_deref()
    }

    pub fn gestures_rejected(&self) -> u64 {
        self.gestures.rejected()
    }

    pub fn on_region_clicked(&mut self, callback: impl FnMut(&str) + 'static) {
        self.on_region_clicked = Some(Box::new(callback));
    }

    fn mark(&mut self, phase: RenderPhase) {
        // A pending selection change outranks plain gestures until rendered
        if self.phase != RenderPhase::SelectionChanged {
            self.phase = phase;
        }
        self.gestures.request_render();
    }

    fn after_gesture(&mut self, changed: bool) -> bool {
        if changed && self.phase != RenderPhase::SelectionChanged {
            self.phase = RenderPhase::GestureActive;
        }
        changed
    }

    /// Replace the dataset. Selection is re-resolved against the new names.
    pub fn set_dataset(&mut self, atlas: Arc<Atlas>) {
        self.renderer = MapRenderer::new(&atlas, self.projection.resample_edges());
        self.eligible = compute_marker_eligibility(&atlas, self.settings.marker_area_threshold);
        self.atlas = atlas;
        self.selection = SelectionTracker::default();
        if self.selected_name.is_some() {
            self.phase = RenderPhase::SelectionChanged;
        }
        self.gestures.request_render();
    }

    pub fn set_selected_name(&mut self, name: Option<&str>) {
        if self.selected_name.as_deref() == name {
            return;
        }
        self.selected_name = name.map(str::to_owned);
        self.phase = RenderPhase::SelectionChanged;
        self.gestures.request_render();
    }

    pub fn set_show_borders(&mut self, show: bool) {
        if self.settings.show_borders != show {
            self.settings.show_borders = show;
            self.mark(RenderPhase::Recomputing);
        }
    }

    pub fn set_show_markers(&mut self, show: bool) {
        if self.settings.show_markers != show {
            self.settings.show_markers = show;
            self.mark(RenderPhase::Recomputing);
        }
    }

    pub fn set_show_zoom_controls(&mut self, show: bool) {
        self.settings.show_zoom_controls = show;
    }

    pub fn update_container_size(&mut self, width: usize, height: usize) -> Result<()> {
        self.viewport
            .update_container_size(&self.projection, width, height)?;
        self.mark(RenderPhase::Recomputing);
        Ok(())
    }

    pub fn on_drag_delta(&mut self, dx: f64, dy: f64) -> bool {
        let changed = self.gestures.on_drag_delta(&mut self.viewport, dx, dy);
        self.after_gesture(changed)
    }

    pub fn on_wheel(&mut self, sign: f64) -> bool {
        let changed = self.gestures.on_wheel(&mut self.viewport, sign);
        self.after_gesture(changed)
    }

    pub fn on_zoom_button_click(&mut self, direction: ZoomDirection) -> bool {
        let changed = self.gestures.on_zoom_button_click(&mut self.viewport, direction);
        self.after_gesture(changed)
    }

    pub fn on_pinch(&mut self, ratio: f64) -> bool {
        let changed = self.gestures.on_pinch(&mut self.viewport, ratio);
        self.after_gesture(changed)
    }

    pub fn press(&mut self, pos: DVec2) {
        self.gestures.press(pos);
    }

    pub fn drag_to(&mut self, pos: DVec2) -> bool {
        let changed = self.gestures.drag_to(&mut self.viewport, pos);
        self.after_gesture(changed)
    }

    /// Finish a press. A click reports the region under it to the host
    /// callback; a double click zooms in on the clicked point.
    pub fn release(&mut self, now: Instant, pos: DVec2) -> Option<Click> {
        let click = self.gestures.release(now, pos)?;
        match click {
            Click::Single(at) => {
                if let Some(id) = self.feature_at(at) {
                    let name = self.atlas.get(id).map(|f| f.name.as_str());
                    if let (Some(name), Some(callback)) = (name, self.on_region_clicked.as_mut()) {
                        callback(name);
                    }
                }
            }
            Click::Double(at) => {
                if let Some(point) = self.unproject(at) {
                    if self.viewport.recenter_on(point, 0.0).is_ok() {
                        self.mark(RenderPhase::GestureActive);
                    }
                }
                self.on_zoom_button_click(ZoomDirection::In);
            }
        }
        Some(click)
    }

    /// Keyboard panning: degrees at the fitted scale, less when zoomed in.
    pub fn pan_degrees(&mut self, dlon: f64, dlat: f64) -> bool {
        let zoom = self.viewport.zoom();
        let before = self.viewport.center;
        match self.viewport.rotate_degrees(dlon / zoom, dlat / zoom) {
            Ok(()) if self.viewport.center != before => {
                self.mark(RenderPhase::GestureActive);
                true
            }
            Ok(()) => false,
            Err(err) => {
                tracing::debug!(%err, "ignoring pan");
                false
            }
        }
    }

    /// Screen rotation for flat maps; globes ignore it.
    pub fn rotate_bearing(&mut self, degrees: f64) -> bool {
        if !self.projection.supports_bearing() {
            return false;
        }
        match self.viewport.rotate_bearing(degrees) {
            Ok(()) => {
                self.mark(RenderPhase::GestureActive);
                true
            }
            Err(err) => {
                tracing::debug!(%err, "ignoring bearing change");
                false
            }
        }
    }

    pub fn reset_view(&mut self) {
        self.viewport.reset(&self.projection);
        self.mark(RenderPhase::Recomputing);
    }

    pub fn is_auto_rotating(&self) -> bool {
        self.spin.is_some()
    }

    /// Start (or restart) continuous rotation on `timers`.
    pub fn start_auto_rotate(&mut self, timers: &Timers, now: Instant, auto: AutoRotate) {
        self.stop_auto_rotate();
        let handle = timers.schedule_repeating(now, Duration::from_millis(auto.speed_ms));
        tracing::info!(speed_ms = auto.speed_ms, direction = ?auto.direction, "auto-rotate started");
        self.spin = Some(Spin {
            handle,
            direction: auto.direction.sign(),
        });
    }

    pub fn stop_auto_rotate(&mut self) {
        if let Some(spin) = self.spin.take() {
            spin.handle.cancel();
            tracing::info!("auto-rotate stopped");
        }
    }

    /// Apply auto-rotate ticks that came due. Ticks during a drag are
    /// consumed without rotating.
    pub fn poll_timers(&mut self, now: Instant) -> bool {
        let Some(spin) = &self.spin else {
            return false;
        };
        let ticks = spin.handle.poll(now);
        let direction = spin.direction;
        if ticks == 0 || self.gestures.is_active() {
            return false;
        }
        let step = -direction * AUTO_ROTATE_STEP * f64::from(ticks);
        match self.viewport.rotate_degrees(step, 0.0) {
            Ok(()) => {
                self.mark(RenderPhase::Recomputing);
                true
            }
            Err(err) => {
                tracing::debug!(%err, "auto-rotate step rejected");
                false
            }
        }
    }

    /// Release everything that outlives a frame: the rotation timer and the
    /// host callback.
    pub fn teardown(&mut self) {
        self.stop_auto_rotate();
        self.on_region_clicked = None;
    }

    /// Run one render pass if anything changed since the last one. Returns
    /// whether a pass ran.
    pub fn render(&mut self) -> bool {
        if !self.gestures.take_render_request() {
            return false;
        }

        if self.phase == RenderPhase::SelectionChanged {
            self.phase = RenderPhase::Recentering;
            let change = auto_center_on_selection_change(
                &mut self.selection,
                self.selected_name.as_deref(),
                &self.atlas,
                &mut self.viewport,
                self.settings.min_focus_zoom,
            );
            tracing::debug!(?change, "selection changed");
            if let SelectionChange::Mismatch = change {
                tracing::debug!(name = ?self.selected_name, "rendering without highlight");
            }
        }

        self.phase = RenderPhase::Recomputing;
        let frame = self.projection.frame(&self.viewport);
        let selected = self.selection.selected();
        self.renderer.render_polygons(
            &self.atlas,
            &frame,
            selected,
            self.settings.show_borders,
            &self.settings.palette,
        );
        let marker = render_marker(
            &self.atlas,
            selected,
            &self.eligible,
            &frame,
            self.settings.show_markers,
            &self.settings.icon,
        );
        self.renderer.place_marker(marker);

        self.frames += 1;
        self.phase = RenderPhase::Idle;
        true
    }

    pub fn project(&self, point: LonLat) -> Option<DVec2> {
        self.projection.frame(&self.viewport).project(point)
    }

    pub fn unproject(&self, screen: DVec2) -> Option<LonLat> {
        self.projection.frame(&self.viewport).unproject(screen)
    }

    /// Smallest feature containing the geographic point under `screen`.
    pub fn feature_at(&self, screen: DVec2) -> Option<FeatureId> {
        let point = self.unproject(screen)?;
        self.atlas
            .iter()
            .filter_map(|(id, feature)| {
                let stats = self.atlas.stats(id)?;
                let inside = stats.bbox.contains_point(point) && geo::contains(&feature.geometry, point);
                inside.then_some((id, stats.area))
            })
            .min_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(id, _)| id)
    }

    pub fn region_at(&self, screen: DVec2) -> Option<&str> {
        let id = self.feature_at(screen)?;
        self.atlas.get(id).map(|f| f.name.as_str())
    }
}

impl<P: Projection> Drop for MapView<P> {
    fn drop(&mut self) {
        self.teardown();
    }
}
