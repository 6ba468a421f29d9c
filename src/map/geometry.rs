use crate::braille::BrailleCanvas;
use crate::map::renderer::ScreenPoint;

/// Dot pattern used when filling polygons
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Stipple {
    /// Every dot
    Solid,
    /// One dot in four, staggered between rows
    Sparse,
}

impl Stipple {
    #[inline(always)]
    fn allows(self, x: i32, y: i32) -> bool {
        match self {
            Stipple::Solid => true,
            Stipple::Sparse => y % 2 == 0 && (x + y / 2) % 2 == 0,
        }
    }
}

/// Draw a line using Bresenham's algorithm
pub fn draw_line(canvas: &mut BrailleCanvas, x0: i32, y0: i32, x1: i32, y1: i32) {
    let dx = (x1 - x0).abs();
    let dy = -(y1 - y0).abs();
    let sx = if x0 < x1 { 1 } else { -1 };
    let sy = if y0 < y1 { 1 } else { -1 };
    let mut err = dx + dy;

    let mut x = x0;
    let mut y = y0;

    loop {
        canvas.set_pixel_signed(x, y);

        if x == x1 && y == y1 {
            break;
        }

        let e2 = 2 * err;

        if e2 >= dy {
            if x == x1 {
                break;
            }
            err += dy;
            x += sx;
        }

        if e2 <= dx {
            if y == y1 {
                break;
            }
            err += dx;
            y += sy;
        }
    }
}

/// Check if a line segment might be visible (rough bounding box check)
#[inline]
fn segment_might_be_visible(canvas: &BrailleCanvas, x0: i32, y0: i32, x1: i32, y1: i32) -> bool {
    x0.max(x1) >= 0
        && x0.min(x1) < canvas.pixel_width() as i32
        && y0.max(y1) >= 0
        && y0.min(y1) < canvas.pixel_height() as i32
}

/// Outline a ring. Segments running between two limb-clipped points are the
/// horizon, not a border, and are skipped.
pub fn stroke_ring(canvas: &mut BrailleCanvas, ring: &[ScreenPoint]) {
    let Some(last) = ring.last() else {
        return;
    };
    let mut prev = last;
    for point in ring {
        if !(prev.clipped && point.clipped) {
            let (x0, y0) = (prev.pos.x.round() as i32, prev.pos.y.round() as i32);
            let (x1, y1) = (point.pos.x.round() as i32, point.pos.y.round() as i32);
            if segment_might_be_visible(canvas, x0, y0, x1, y1) {
                draw_line(canvas, x0, y0, x1, y1);
            }
        }
        prev = point;
    }
}

/// Even-odd scanline fill over all rings of a polygon, so holes stay empty.
/// `crossings` is scratch space reused between calls.
pub fn fill_rings(
    canvas: &mut BrailleCanvas,
    rings: &[Vec<ScreenPoint>],
    stipple: Stipple,
    crossings: &mut Vec<f64>,
) {
    let height = canvas.pixel_height() as i32;
    let width = canvas.pixel_width() as i32;
    if height == 0 || width == 0 {
        return;
    }

    let (mut min_y, mut max_y) = (f64::INFINITY, f64::NEG_INFINITY);
    for p in rings.iter().flatten() {
        min_y = min_y.min(p.pos.y);
        max_y = max_y.max(p.pos.y);
    }
    if !min_y.is_finite() || !max_y.is_finite() {
        return;
    }
    let y_start = (min_y.floor() as i32).max(0);
    let y_end = (max_y.ceil() as i32).min(height - 1);

    for y in y_start..=y_end {
        let sample = y as f64 + 0.5;
        crossings.clear();
        for ring in rings {
            let Some(last) = ring.last() else {
                continue;
            };
            let mut a = last.pos;
            for point in ring {
                let b = point.pos;
                if (a.y <= sample) != (b.y <= sample) {
                    crossings.push(a.x + (sample - a.y) * (b.x - a.x) / (b.y - a.y));
                }
                a = b;
            }
        }
        crossings.sort_unstable_by(f64::total_cmp);

        for span in crossings.chunks_exact(2) {
            let x_start = ((span[0] - 0.5).ceil() as i32).max(0);
            let x_end = ((span[1] - 0.5).floor() as i32).min(width - 1);
            for x in x_start..=x_end {
                if stipple.allows(x, y) {
                    canvas.set_pixel_signed(x, y);
                }
            }
        }
    }
}

/// Draw a circle outline (marker halo)
pub fn draw_circle(canvas: &mut BrailleCanvas, cx: i32, cy: i32, radius: i32) {
    let inner = (radius - 1) * (radius - 1);
    for dy in -radius..=radius {
        for dx in -radius..=radius {
            let d = dx * dx + dy * dy;
            if d <= radius * radius && d > inner {
                canvas.set_pixel_signed(cx + dx, cy + dy);
            }
        }
    }
}
