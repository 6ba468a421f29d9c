use crate::braille::BrailleCanvas;
use crate::map::geometry::{self, Stipple};
use crate::map::renderer::{Palette, RenderedScene};

/// Radius in dots of the ring drawn around a marker
const MARKER_HALO: i32 = 3;

/// Braille layers a scene is rasterized into, painted back to front by the
/// terminal surface.
pub struct MapLayers {
    /// Default-fill regions, stippled
    pub land: BrailleCanvas,
    /// Selected region, solid
    pub highlight: BrailleCanvas,
    pub borders: BrailleCanvas,
    /// Marker halos
    pub markers: BrailleCanvas,
    crossings: Vec<f64>,
}

impl MapLayers {
    /// Layers covering `cols` x `rows` terminal cells
    pub fn new(cols: usize, rows: usize) -> Self {
        Self {
            land: BrailleCanvas::new(cols, rows),
            highlight: BrailleCanvas::new(cols, rows),
            borders: BrailleCanvas::new(cols, rows),
            markers: BrailleCanvas::new(cols, rows),
            crossings: Vec::new(),
        }
    }

    pub fn resize(&mut self, cols: usize, rows: usize) {
        if self.land.width() == cols && self.land.height() == rows {
            return;
        }
        self.land.resize(cols, rows);
        self.highlight.resize(cols, rows);
        self.borders.resize(cols, rows);
        self.markers.resize(cols, rows);
    }

    /// Rasterize a scene, replacing whatever was painted before.
    pub fn paint(&mut self, scene: &RenderedScene, palette: &Palette) {
        self.land.clear();
        self.highlight.clear();
        self.borders.clear();
        self.markers.clear();

        for polygon in scene.polygons() {
            let selected = polygon.selected;
            let (canvas, stipple) = if selected {
                (&mut self.highlight, Stipple::Solid)
            } else {
                (&mut self.land, Stipple::Sparse)
            };
            geometry::fill_rings(canvas, polygon.rings(), stipple, &mut self.crossings);

            if polygon.stroke.is_some() {
                for ring in polygon.rings() {
                    geometry::stroke_ring(&mut self.borders, ring);
                }
            } else if !selected {
                // Without borders the coastline still needs an edge
                for ring in polygon.rings() {
                    geometry::stroke_ring(&mut self.land, ring);
                }
            }
        }

        if let Some(marker) = scene.marker() {
            geometry::draw_circle(
                &mut self.markers,
                marker.position.x.round() as i32,
                marker.position.y.round() as i32,
                MARKER_HALO,
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::map::atlas::tests::square_feature;
    use crate::map::atlas::Atlas;
    use crate::map::projection::{Orthographic, Projection};
    use crate::map::renderer::MapRenderer;
    use crate::map::viewport::ViewportState;

    fn painted(palette: &Palette) -> MapLayers {
        let atlas = Atlas::new(vec![
            square_feature("West", -20.0, 0.0, 8.0),
            square_feature("East", 20.0, 0.0, 8.0),
        ]);
        let vp = ViewportState::initialize(&Orthographic, 160, 160).unwrap();
        let mut renderer = MapRenderer::new(&atlas, true);
        let scene = renderer.render_polygons(&atlas, &Orthographic.frame(&vp), atlas.find("East"), true, palette);
        let mut layers = MapLayers::new(80, 40);
        layers.paint(scene, palette);
        layers
    }

    /// Dots set in the left or right half of a canvas
    fn halves(canvas: &BrailleCanvas) -> (usize, usize) {
        let mid = canvas.width() / 2;
        let mut left = 0;
        let mut right = 0;
        for row in 0..canvas.height() {
            for col in 0..canvas.width() {
                if canvas.cell(col, row).is_some() {
                    if col < mid {
                        left += 1;
                    } else {
                        right += 1;
                    }
                }
            }
        }
        (left, right)
    }

    #[test]
    fn test_only_selected_region_on_highlight() {
        let layers = painted(&Palette::default());
        let (left, right) = halves(&layers.highlight);
        assert_eq!(left, 0);
        assert!(right > 0);
        assert!(layers.land.dot_count() > 0);
        assert!(layers.borders.dot_count() > 0);
    }

    #[test]
    fn test_highlight_independent_of_palette_colours() {
        let palette = Palette {
            selected_fill: Palette::default().default_fill,
            ..Palette::default()
        };
        let layers = painted(&palette);
        let (left, right) = halves(&layers.highlight);
        assert_eq!(left, 0);
        assert!(right > 0);
        let (land_left, _) = halves(&layers.land);
        assert!(land_left > 0);
    }
}
