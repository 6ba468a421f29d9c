use glam::DVec2;
use std::time::{Duration, Instant};

use crate::error::{MapError, Result};
use crate::map::viewport::ViewportState;

/// Degrees of rotation per pixel of drag at scale 1, shared by globe and map.
pub const DRAG_SENSITIVITY: f64 = 75.0;

/// Zoom factor for one wheel tick
pub const WHEEL_STEP: f64 = 1.1;

/// Zoom factor for the on-screen zoom buttons
pub const BUTTON_STEP: f64 = 2.0;

/// Two clicks closer together than this count as a double click
pub const DOUBLE_CLICK_WINDOW: Duration = Duration::from_millis(350);

/// Pointer travel (pixels) under which a press-release is still a click
const CLICK_SLOP: f64 = 2.0;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ZoomDirection {
    In,
    Out,
}

impl ZoomDirection {
    /// Wheel convention: positive deltas zoom in. Zero and NaN give nothing.
    pub fn from_sign(sign: f64) -> Option<Self> {
        if sign > 0.0 {
            Some(ZoomDirection::In)
        } else if sign < 0.0 {
            Some(ZoomDirection::Out)
        } else {
            None
        }
    }

    fn factor(self, step: f64) -> f64 {
        match self {
            ZoomDirection::In => step,
            ZoomDirection::Out => 1.0 / step,
        }
    }
}

/// What a completed press-release turned out to be
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Click {
    Single(DVec2),
    Double(DVec2),
}

/// Turns raw pointer and wheel input into viewport updates.
///
/// Every call is applied to the viewport immediately. Calls that change the
/// viewport raise a render request; the frame loop takes it with
/// [`GestureTranslator::take_render_request`], so any number of events inside
/// one frame still cost a single re-render.
pub struct GestureTranslator {
    sensitivity: f64,
    /// Last pointer position while a drag is in progress
    last_pointer: Option<DVec2>,
    /// Where the current press started, for click detection
    press_origin: Option<DVec2>,
    /// Time and place of the previous single click
    last_click: Option<(Instant, DVec2)>,
    render_requested: bool,
    rejected: u64,
}

impl GestureTranslator {
    pub fn new(sensitivity: f64) -> Self {
        Self {
            sensitivity,
            last_pointer: None,
            press_origin: None,
            last_click: None,
            render_requested: false,
            rejected: 0,
        }
    }

    pub fn sensitivity(&self) -> f64 {
        self.sensitivity
    }

    /// Whether a drag is in progress
    pub fn is_active(&self) -> bool {
        self.last_pointer.is_some()
    }

    /// Gesture events dropped as malformed since creation
    pub fn rejected(&self) -> u64 {
        self.rejected
    }

    /// Apply one update and track its outcome. Malformed input is dropped.
    fn apply(&mut self, outcome: Result<bool>) -> bool {
        match outcome {
            Ok(changed) => {
                self.render_requested |= changed;
                changed
            }
            Err(err) => {
                self.rejected += 1;
                tracing::debug!(%err, "ignoring gesture input");
                false
            }
        }
    }

    pub fn on_drag_delta(&mut self, viewport: &mut ViewportState, dx: f64, dy: f64) -> bool {
        let before = viewport.center;
        let outcome = viewport
            .apply_rotation_delta(dx, dy, self.sensitivity)
            .map(|()| viewport.center != before);
        self.apply(outcome)
    }

    /// Continuous wheel: one small step per tick in the direction of `sign`.
    pub fn on_wheel(&mut self, viewport: &mut ViewportState, sign: f64) -> bool {
        if !sign.is_finite() {
            return self.apply(Err(MapError::InvalidGesture {
                what: "wheel delta",
                value: sign,
            }));
        }
        match ZoomDirection::from_sign(sign) {
            Some(direction) => self.zoom(viewport, direction.factor(WHEEL_STEP)),
            None => false,
        }
    }

    pub fn on_zoom_button_click(&mut self, viewport: &mut ViewportState, direction: ZoomDirection) -> bool {
        self.zoom(viewport, direction.factor(BUTTON_STEP))
    }

    /// Pinch with the ratio of current to previous finger distance.
    pub fn on_pinch(&mut self, viewport: &mut ViewportState, ratio: f64) -> bool {
        self.zoom(viewport, ratio)
    }

    fn zoom(&mut self, viewport: &mut ViewportState, factor: f64) -> bool {
        let before = viewport.scale;
        let outcome = viewport
            .apply_zoom_delta(factor)
            .map(|()| viewport.scale != before);
        self.apply(outcome)
    }

    /// Pointer pressed: start tracking a possible drag or click.
    pub fn press(&mut self, pos: DVec2) {
        if !pos.is_finite() {
            self.apply(Err(MapError::InvalidGesture {
                what: "pointer",
                value: if pos.x.is_finite() { pos.y } else { pos.x },
            }));
            return;
        }
        self.last_pointer = Some(pos);
        self.press_origin = Some(pos);
    }

    /// Pointer moved with the button held. The ground follows the pointer.
    pub fn drag_to(&mut self, viewport: &mut ViewportState, pos: DVec2) -> bool {
        let Some(last) = self.last_pointer else {
            return false;
        };
        if !pos.is_finite() {
            return self.apply(Err(MapError::InvalidGesture {
                what: "pointer",
                value: if pos.x.is_finite() { pos.y } else { pos.x },
            }));
        }
        self.last_pointer = Some(pos);
        let delta = pos - last;
        self.on_drag_delta(viewport, delta.x, delta.y)
    }

    /// Pointer released. Returns the click this press amounted to, if any.
    pub fn release(&mut self, now: Instant, pos: DVec2) -> Option<Click> {
        self.last_pointer = None;
        let origin = self.press_origin.take()?;
        if !pos.is_finite() || origin.distance(pos) > CLICK_SLOP {
            return None;
        }

        match self.last_click.take() {
            Some((at, prev))
                if now.saturating_duration_since(at) <= DOUBLE_CLICK_WINDOW
                    && prev.distance(pos) <= CLICK_SLOP * 2.0 =>
            {
                Some(Click::Double(pos))
            }
            _ => {
                self.last_click = Some((now, pos));
                Some(Click::Single(pos))
            }
        }
    }

    /// Ask for a re-render without a gesture (selection, resize, timers).
    pub fn request_render(&mut self) {
        self.render_requested = true;
    }

    /// Take the pending render request. At most one per frame.
    pub fn take_render_request(&mut self) -> bool {
        std::mem::take(&mut self.render_requested)
    }
}

impl Default for GestureTranslator {
    fn default() -> Self {
        Self::new(DRAG_SENSITIVITY)
    }
}
