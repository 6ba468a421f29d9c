use anyhow::{Context, Result};
use glam::DVec2;
use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tui_globe::config::AutoRotate;
use tui_globe::map::{Atlas, MapLayers, MapView, Projection, ViewSettings, ZoomDirection};
use tui_globe::timer::Timers;

/// Frame budget when nothing is scheduled sooner (~60fps)
const FRAME: Duration = Duration::from_millis(16);

/// Keyboard pan step in degrees at the fitted zoom
const PAN_STEP: f64 = 10.0;

/// Bearing step for `[` / `]`
const BEARING_STEP: f64 = 5.0;

/// Width in cells of one zoom control (`[+]`)
pub const ZOOM_CONTROL_WIDTH: u16 = 3;

/// Terminal cells taken by the map border and status bar
fn inner_cells(width: usize, height: usize) -> (usize, usize) {
    // 2 for border horizontally; 2 for border + 1 for status bar vertically
    (width.saturating_sub(2), height.saturating_sub(3))
}

/// Column (inside the map border) where the zoom controls start
pub fn zoom_controls_col(inner_cols: usize) -> Option<u16> {
    let col = inner_cols.checked_sub(ZOOM_CONTROL_WIDTH as usize + 1)?;
    u16::try_from(col).ok()
}

/// Application state
pub struct App<P: Projection> {
    pub view: MapView<P>,
    pub layers: MapLayers,
    pub timers: Timers,
    pub should_quit: bool,
    /// Last mouse position, for the cursor marker
    pub mouse_pos: Option<(u16, u16)>,
    /// Region names in cycling order
    names: Vec<String>,
    cursor: Option<usize>,
    auto_rotate: Option<AutoRotate>,
    /// Filled by the view's click callback, drained after each event
    clicked: Rc<RefCell<Option<String>>>,
    inner: (usize, usize),
}

impl<P: Projection> App<P> {
    /// `width` x `height` is the terminal size in cells.
    pub fn new(
        projection: P,
        atlas: Arc<Atlas>,
        settings: ViewSettings,
        width: usize,
        height: usize,
    ) -> Result<Self> {
        let inner = inner_cells(width, height);
        // Braille gives 2x4 resolution per character
        let mut view = MapView::new(projection, Arc::clone(&atlas), inner.0 * 2, inner.1 * 4, settings)
            .context("Terminal too small for the map")?;

        let clicked = Rc::new(RefCell::new(None));
        let sink = Rc::clone(&clicked);
        view.on_region_clicked(move |name| *sink.borrow_mut() = Some(name.to_string()));

        let mut names: Vec<String> = atlas.names().map(str::to_string).collect();
        names.sort();
        names.dedup();

        Ok(Self {
            view,
            layers: MapLayers::new(inner.0, inner.1),
            timers: Timers::new(),
            should_quit: false,
            mouse_pos: None,
            names,
            cursor: None,
            auto_rotate: None,
            clicked,
            inner,
        })
    }

    /// Update viewport size when terminal resizes
    pub fn resize(&mut self, width: usize, height: usize) {
        let inner = inner_cells(width, height);
        match self.view.update_container_size(inner.0 * 2, inner.1 * 4) {
            Ok(()) => {
                self.inner = inner;
                self.layers.resize(inner.0, inner.1);
            }
            Err(err) => tracing::warn!(%err, "keeping previous map size"),
        }
    }

    pub fn inner_cols(&self) -> usize {
        self.inner.0
    }

    /// Select a region by name, as the quiz host would.
    pub fn select(&mut self, name: Option<&str>) {
        self.cursor = name.and_then(|n| self.names.iter().position(|x| x == n));
        self.view.set_selected_name(name);
    }

    /// Step through regions alphabetically
    pub fn cycle_selection(&mut self, forward: bool) {
        if self.names.is_empty() {
            return;
        }
        let len = self.names.len();
        let next = match (self.cursor, forward) {
            (None, true) => 0,
            (None, false) => len - 1,
            (Some(i), true) => (i + 1) % len,
            (Some(i), false) => (i + len - 1) % len,
        };
        self.cursor = Some(next);
        let name = self.names[next].clone();
        self.view.set_selected_name(Some(&name));
    }

    pub fn clear_selection(&mut self) {
        self.select(None);
    }

    pub fn pan(&mut self, dx: i32, dy: i32) {
        self.view
            .pan_degrees(f64::from(dx) * PAN_STEP, f64::from(dy) * PAN_STEP);
    }

    pub fn zoom_in(&mut self) {
        self.view.on_zoom_button_click(ZoomDirection::In);
    }

    pub fn zoom_out(&mut self) {
        self.view.on_zoom_button_click(ZoomDirection::Out);
    }

    pub fn wheel(&mut self, sign: f64) {
        self.view.on_wheel(sign);
    }

    pub fn rotate_bearing(&mut self, clockwise: bool) {
        let step = if clockwise { BEARING_STEP } else { -BEARING_STEP };
        self.view.rotate_bearing(step);
    }

    pub fn toggle_borders(&mut self) {
        let show = !self.view.settings().show_borders;
        self.view.set_show_borders(show);
    }

    pub fn toggle_markers(&mut self) {
        let show = !self.view.settings().show_markers;
        self.view.set_show_markers(show);
    }

    pub fn toggle_zoom_controls(&mut self) {
        let show = !self.view.settings().show_zoom_controls;
        self.view.set_show_zoom_controls(show);
    }

    /// Remember the configured rotation so it can be toggled later
    pub fn set_auto_rotate(&mut self, auto: Option<AutoRotate>, now: Instant) {
        self.auto_rotate = auto;
        match auto {
            Some(auto) => self.view.start_auto_rotate(&self.timers, now, auto),
            None => self.view.stop_auto_rotate(),
        }
    }

    pub fn toggle_auto_rotate(&mut self, now: Instant) {
        if self.view.is_auto_rotating() {
            self.view.stop_auto_rotate();
        } else if let Some(auto) = self.auto_rotate {
            self.view.start_auto_rotate(&self.timers, now, auto);
        }
    }

    pub fn reset_view(&mut self) {
        self.view.reset_view();
    }

    /// Map-area pixel at the centre of a terminal cell. The map starts one
    /// cell in from the border.
    fn cell_to_pixel(col: u16, row: u16) -> DVec2 {
        let px = f64::from(col.saturating_sub(1)) * 2.0 + 1.0;
        let py = f64::from(row.saturating_sub(1)) * 4.0 + 2.0;
        DVec2::new(px, py)
    }

    /// Mouse position in braille pixel coordinates, for the cursor marker
    pub fn mouse_pixel_pos(&self) -> Option<DVec2> {
        self.mouse_pos.map(|(col, row)| Self::cell_to_pixel(col, row))
    }

    pub fn set_mouse_pos(&mut self, col: u16, row: u16) {
        self.mouse_pos = Some((col, row));
    }

    /// Zoom control under a terminal cell, when controls are shown
    pub fn zoom_control_at(&self, col: u16, row: u16) -> Option<ZoomDirection> {
        if !self.view.settings().show_zoom_controls {
            return None;
        }
        let start = zoom_controls_col(self.inner.0)? + 1;
        if col < start || col >= start + ZOOM_CONTROL_WIDTH {
            return None;
        }
        match row {
            1 => Some(ZoomDirection::In),
            2 => Some(ZoomDirection::Out),
            _ => None,
        }
    }

    pub fn mouse_down(&mut self, col: u16, row: u16) {
        if let Some(direction) = self.zoom_control_at(col, row) {
            self.view.on_zoom_button_click(direction);
            return;
        }
        self.view.press(Self::cell_to_pixel(col, row));
    }

    pub fn mouse_drag(&mut self, col: u16, row: u16) {
        self.view.drag_to(Self::cell_to_pixel(col, row));
    }

    /// A click on a region selects it
    pub fn mouse_up(&mut self, col: u16, row: u16, now: Instant) {
        self.view.release(now, Self::cell_to_pixel(col, row));
        let clicked = self.clicked.borrow_mut().take();
        if let Some(name) = clicked {
            self.select(Some(&name));
        }
    }

    /// Apply due timers and re-render if anything changed.
    pub fn tick(&mut self, now: Instant) {
        self.view.poll_timers(now);
        if self.view.render() {
            let palette = self.view.settings().palette;
            self.layers.paint(self.view.scene(), &palette);
        }
    }

    /// How long the event loop may block before the next tick is due
    pub fn poll_timeout(&self, now: Instant) -> Duration {
        self.timers
            .next_deadline()
            .map(|due| due.saturating_duration_since(now))
            .map_or(FRAME, |wait| wait.min(FRAME))
    }

    pub fn quit(&mut self) {
        self.view.teardown();
        self.should_quit = true;
    }

    pub fn zoom_level(&self) -> String {
        format!("{:.1}x", self.view.viewport().zoom())
    }

    pub fn center_coords(&self) -> String {
        let (lon, lat) = self.view.viewport().center;
        format!(
            "{:.1}°{}, {:.1}°{}",
            lat.abs(),
            if lat >= 0.0 { "N" } else { "S" },
            lon.abs(),
            if lon >= 0.0 { "E" } else { "W" }
        )
    }

    /// Region under the mouse cursor
    pub fn hovered(&self) -> Option<&str> {
        self.view.region_at(self.mouse_pixel_pos()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tui_globe::config::{MapMode, RotateDirection};
    use tui_globe::data::sample_atlas;
    use tui_globe::map::Orthographic;

    fn app() -> App<Orthographic> {
        let atlas = Arc::new(sample_atlas(MapMode::Globe));
        App::new(Orthographic, atlas, ViewSettings::default(), 82, 43).unwrap()
    }

    #[test]
    fn test_tiny_terminal_is_an_error() {
        let atlas = Arc::new(sample_atlas(MapMode::Globe));
        assert!(App::new(Orthographic, atlas, ViewSettings::default(), 2, 3).is_err());
    }

    #[test]
    fn test_cycle_selection_wraps() {
        let mut app = app();
        app.cycle_selection(false);
        let last = app.view.selected_name().map(str::to_string);
        app.cycle_selection(true);
        assert_eq!(app.view.selected_name(), Some("Africa"));
        assert_ne!(last.as_deref(), Some("Africa"));
        app.clear_selection();
        assert_eq!(app.view.selected_name(), None);
    }

    #[test]
    fn test_zoom_controls_hit_test() {
        let mut app = app();
        // 80 inner columns: controls span inner cols 76..79, terminal cols 77..80
        assert_eq!(app.zoom_control_at(77, 1), Some(ZoomDirection::In));
        assert_eq!(app.zoom_control_at(79, 2), Some(ZoomDirection::Out));
        assert_eq!(app.zoom_control_at(80, 1), None);
        assert_eq!(app.zoom_control_at(77, 3), None);

        let before = app.view.viewport().zoom();
        app.mouse_down(77, 1);
        assert_eq!(app.view.viewport().zoom(), before * 2.0);

        app.toggle_zoom_controls();
        assert_eq!(app.zoom_control_at(77, 1), None);
    }

    #[test]
    fn test_click_selects_region() {
        let mut app = app();
        app.tick(Instant::now());
        let target = app.view.project((20.0, 0.0)).unwrap();
        let col = (target.x / 2.0) as u16 + 1;
        let row = (target.y / 4.0) as u16 + 1;

        app.mouse_down(col, row);
        app.mouse_up(col, row, Instant::now());
        assert_eq!(app.view.selected_name(), Some("Africa"));
    }

    #[test]
    fn test_tick_paints_layers() {
        let mut app = app();
        app.tick(Instant::now());
        assert!(app.layers.land.dot_count() > 0);
        assert!(app.layers.borders.dot_count() > 0);
    }

    #[test]
    fn test_auto_rotate_toggle() {
        let mut app = app();
        let now = Instant::now();
        app.set_auto_rotate(
            Some(AutoRotate {
                speed_ms: 40,
                direction: RotateDirection::Forward,
            }),
            now,
        );
        assert_eq!(app.timers.active(), 1);
        assert!(app.poll_timeout(now) <= Duration::from_millis(16));

        app.toggle_auto_rotate(now);
        assert_eq!(app.timers.active(), 0);
        app.toggle_auto_rotate(now);
        assert_eq!(app.timers.active(), 1);

        app.quit();
        assert_eq!(app.timers.active(), 0);
    }
}
