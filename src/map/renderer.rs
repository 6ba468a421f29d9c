use glam::DVec2;
use ratatui::style::Color;
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;

use crate::error::MapError;
use crate::geo::{self, LonLat};
use crate::map::atlas::{Atlas, FeatureId, PolygonFeature};
use crate::map::projection::ScreenTransform;
use crate::map::spatial::FeatureGrid;
use crate::map::viewport::ViewportState;

/// Grid cell size in degrees for visibility culling
const CULL_CELL_DEGREES: f64 = 10.0;

/// A projected vertex in canvas pixels
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ScreenPoint {
    pub pos: DVec2,
    /// Pulled onto the globe limb from the far side
    pub clipped: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Palette {
    pub default_fill: Color,
    pub selected_fill: Color,
    pub border: Color,
    pub marker: Color,
}

impl Default for Palette {
    fn default() -> Self {
        Self {
            default_fill: Color::Green,
            selected_fill: Color::Yellow,
            border: Color::Gray,
            marker: Color::Red,
        }
    }
}

/// The pin asset. The engine only passes it along to whatever draws markers.
#[derive(Clone, Debug, PartialEq)]
pub struct MarkerIcon {
    /// Resolved image reference (`base_path` joined with the icon name)
    pub source: PathBuf,
    /// Character the terminal surface draws in place of the image
    pub glyph: char,
}

#[derive(Clone, Debug, PartialEq)]
pub struct MarkerRenderSpec {
    pub id: FeatureId,
    pub position: DVec2,
    pub icon: Arc<MarkerIcon>,
}

/// One feature's screen geometry and style for the current frame
pub struct RenderedPolygon {
    pub id: FeatureId,
    /// The feature is the current selection
    pub selected: bool,
    pub fill: Color,
    pub stroke: Option<Color>,
    rings: Vec<Vec<ScreenPoint>>,
    ring_count: usize,
}

impl RenderedPolygon {
    fn empty() -> Self {
        Self {
            id: FeatureId(0),
            selected: false,
            fill: Color::Reset,
            stroke: None,
            rings: Vec::new(),
            ring_count: 0,
        }
    }

    /// Visible rings, exteriors each followed by their holes
    pub fn rings(&self) -> &[Vec<ScreenPoint>] {
        &self.rings[..self.ring_count]
    }

    fn reset(&mut self, id: FeatureId, selected: bool, fill: Color, stroke: Option<Color>) {
        self.id = id;
        self.selected = selected;
        self.fill = fill;
        self.stroke = stroke;
        self.ring_count = 0;
    }

    /// Scratch ring for the next vertices; kept only after `commit_ring`.
    fn next_ring(&mut self) -> &mut Vec<ScreenPoint> {
        if self.ring_count == self.rings.len() {
            self.rings.push(Vec::new());
        }
        let ring = &mut self.rings[self.ring_count];
        ring.clear();
        ring
    }

    fn commit_ring(&mut self) {
        self.ring_count += 1;
    }
}

/// Output of one render pass.
///
/// Polygon slots and their ring buffers live for the whole session; a pass
/// rewrites them in place, so steady-state frames allocate nothing.
pub struct RenderedScene {
    polygons: Vec<RenderedPolygon>,
    len: usize,
    /// FeatureId -> slot in `polygons` for this frame
    handles: Vec<Option<u32>>,
    marker: Option<MarkerRenderSpec>,
}

impl RenderedScene {
    fn new() -> Self {
        Self {
            polygons: Vec::new(),
            len: 0,
            handles: Vec::new(),
            marker: None,
        }
    }

    pub fn polygons(&self) -> &[RenderedPolygon] {
        &self.polygons[..self.len]
    }

    pub fn get(&self, id: FeatureId) -> Option<&RenderedPolygon> {
        let slot = (*self.handles.get(id.index())?)?;
        self.polygons.get(slot as usize)
    }

    pub fn marker(&self) -> Option<&MarkerRenderSpec> {
        self.marker.as_ref()
    }

    fn begin(&mut self, feature_count: usize) {
        self.len = 0;
        self.marker = None;
        self.handles.clear();
        self.handles.resize(feature_count, None);
    }

    fn next_slot(
        &mut self,
        id: FeatureId,
        selected: bool,
        fill: Color,
        stroke: Option<Color>,
    ) -> &mut RenderedPolygon {
        if self.len == self.polygons.len() {
            self.polygons.push(RenderedPolygon::empty());
        }
        let slot = &mut self.polygons[self.len];
        slot.reset(id, selected, fill, stroke);
        slot
    }

    fn commit_slot(&mut self) {
        let id = self.polygons[self.len].id;
        if let Some(handle) = self.handles.get_mut(id.index()) {
            *handle = Some(self.len as u32);
        }
        self.len += 1;
    }
}

/// Builds a [`RenderedScene`] per frame from the dataset and a projection frame.
pub struct MapRenderer {
    scene: RenderedScene,
    grid: FeatureGrid,
    candidates: Vec<FeatureId>,
    resample: bool,
}

impl MapRenderer {
    /// `resample` follows edges along great circles (globe); flat maps draw
    /// straight edges between projected vertices.
    pub fn new(atlas: &Atlas, resample: bool) -> Self {
        Self {
            scene: RenderedScene::new(),
            grid: FeatureGrid::build(atlas, CULL_CELL_DEGREES),
            candidates: Vec::with_capacity(atlas.len()),
            resample,
        }
    }

    pub fn scene(&self) -> &RenderedScene {
        &self.scene
    }

    /// Project every visible feature and style it. The selected feature gets
    /// the selected fill in this same pass.
    pub fn render_polygons<T: ScreenTransform>(
        &mut self,
        atlas: &Atlas,
        frame: &T,
        selected: Option<FeatureId>,
        show_borders: bool,
        palette: &Palette,
    ) -> &RenderedScene {
        let bounds = frame.visible_bounds();
        self.grid.query_into(&bounds, &mut self.candidates);
        self.scene.begin(atlas.len());

        let stroke = show_borders.then_some(palette.border);
        for &id in &self.candidates {
            let Some(feature) = atlas.get(id) else {
                continue;
            };
            let is_selected = selected == Some(id);
            let fill = if is_selected {
                palette.selected_fill
            } else {
                palette.default_fill
            };

            let slot = self.scene.next_slot(id, is_selected, fill, stroke);
            if project_feature(frame, feature, self.resample, slot) {
                self.scene.commit_slot();
            }
        }

        tracing::trace!(
            candidates = self.candidates.len(),
            drawn = self.scene.len,
            "rendered polygons"
        );
        &self.scene
    }

    pub fn place_marker(&mut self, marker: Option<MarkerRenderSpec>) {
        self.scene.marker = marker;
    }
}

/// Project one feature into `out`. False when nothing of it faces the viewer.
///
/// Rings that failed validation never reach here: [`Atlas::new`] drops them
/// with a warning, so a malformed feature costs nothing per frame.
fn project_feature<T: ScreenTransform>(
    frame: &T,
    feature: &PolygonFeature,
    resample: bool,
    out: &mut RenderedPolygon,
) -> bool {
    for polygon in &feature.geometry {
        let mut exterior_visible = false;
        for (ring_idx, ring) in polygon.iter().enumerate() {
            if ring_idx > 0 && !exterior_visible {
                break;
            }
            let buf = out.next_ring();
            project_ring(frame, ring, resample, buf);

            let visible = buf.len() >= 3 && !buf.iter().all(|p| p.clipped);
            if visible {
                out.commit_ring();
            }
            if ring_idx == 0 {
                exterior_visible = visible;
            }
        }
    }
    out.ring_count > 0
}

fn project_ring<T: ScreenTransform>(frame: &T, ring: &[LonLat], resample: bool, out: &mut Vec<ScreenPoint>) {
    let ring = geo::open_ring(ring);
    let mut push = |point: LonLat| {
        let (pos, clipped) = frame.project_clamped(point);
        out.push(ScreenPoint { pos, clipped });
    };

    if !resample {
        ring.iter().copied().for_each(&mut push);
        return;
    }

    let Some(&first) = ring.first() else {
        return;
    };
    push(first);
    for (i, &from) in ring.iter().enumerate() {
        let to = ring[(i + 1) % ring.len()];
        geo::walk_great_circle(from, to, &mut push);
    }
    // The closing edge ends back on the first vertex
    out.pop();
}

/// Features small enough to need a pin: area below `threshold` (steradians)
/// and a label position to put it on.
pub fn compute_marker_eligibility(atlas: &Atlas, threshold: f64) -> HashSet<FeatureId> {
    atlas
        .iter()
        .filter(|(id, feature)| {
            feature.label_position.is_some()
                && atlas.stats(*id).is_some_and(|stats| stats.area < threshold)
        })
        .map(|(id, _)| id)
        .collect()
}

/// Marker for the selected feature, if it has one and it faces the viewer.
pub fn render_marker<T: ScreenTransform>(
    atlas: &Atlas,
    selected: Option<FeatureId>,
    eligible: &HashSet<FeatureId>,
    frame: &T,
    show_markers: bool,
    icon: &Arc<MarkerIcon>,
) -> Option<MarkerRenderSpec> {
    if !show_markers {
        return None;
    }
    let id = selected?;
    if !eligible.contains(&id) {
        return None;
    }
    let label = atlas.get(id)?.label_position?;
    let position = frame.project(label)?;
    Some(MarkerRenderSpec {
        id,
        position,
        icon: Arc::clone(icon),
    })
}

/// Outcome of checking the selection against the last one seen.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SelectionChange {
    Unchanged,
    Cleared,
    /// Selected, but the feature has no usable centroid to move to
    Selected(FeatureId),
    Recentered(FeatureId),
    /// Name not found in the dataset
    Mismatch,
}

/// Remembers the last selection name the view reacted to.
#[derive(Debug, Default)]
pub struct SelectionTracker {
    last: Option<String>,
    resolved: Option<FeatureId>,
}

impl SelectionTracker {
    /// The feature currently highlighted
    pub fn selected(&self) -> Option<FeatureId> {
        self.resolved
    }

    pub fn selected_name(&self) -> Option<&str> {
        self.last.as_deref()
    }
}

/// React to a selection change: look the name up and move the view onto the
/// feature's centroid. A name with no matching feature is logged and leaves
/// the viewport alone.
pub fn auto_center_on_selection_change(
    tracker: &mut SelectionTracker,
    selected: Option<&str>,
    atlas: &Atlas,
    viewport: &mut ViewportState,
    min_zoom: f64,
) -> SelectionChange {
    if tracker.last.as_deref() == selected {
        return SelectionChange::Unchanged;
    }
    tracker.last = selected.map(str::to_owned);

    let Some(name) = selected else {
        tracker.resolved = None;
        return SelectionChange::Cleared;
    };

    let Some(id) = atlas.find(name) else {
        tracker.resolved = None;
        let err = MapError::SelectionMismatch(name.to_string());
        tracing::warn!(%err, "selection ignored");
        return SelectionChange::Mismatch;
    };
    tracker.resolved = Some(id);

    let Some(stats) = atlas.stats(id) else {
        tracing::warn!(name, "selected region has no geometry to center on");
        return SelectionChange::Selected(id);
    };
    match viewport.recenter_on(stats.centroid, min_zoom) {
        Ok(()) => SelectionChange::Recentered(id),
        Err(err) => {
            tracing::warn!(name, %err, "could not center on selection");
            SelectionChange::Selected(id)
        }
    }
}
