use std::collections::HashMap;

use crate::geo::BBox;
use crate::map::atlas::{Atlas, FeatureId};

/// Spatial index for features using conservative approximation.
/// Each feature's bounding box is indexed into every cell it overlaps,
/// guaranteeing no false negatives while allowing false positives
/// (the projection still decides what actually lands on screen).
pub struct FeatureGrid {
    cells: HashMap<(i32, i32), Vec<FeatureId>>,
    cell_size: f64,
}

impl FeatureGrid {
    pub fn new(cell_size: f64) -> Self {
        Self {
            cells: HashMap::new(),
            cell_size,
        }
    }

    #[inline(always)]
    fn to_cell(&self, lon: f64, lat: f64) -> (i32, i32) {
        let x = (lon / self.cell_size).floor() as i32;
        let y = (lat / self.cell_size).floor() as i32;
        (x, y)
    }

    fn insert(&mut self, id: FeatureId, bbox: &BBox) {
        let min_cell = self.to_cell(bbox.min_lon, bbox.min_lat);
        let max_cell = self.to_cell(bbox.max_lon, bbox.max_lat);
        for y in min_cell.1..=max_cell.1 {
            for x in min_cell.0..=max_cell.0 {
                self.cells.entry((x, y)).or_default().push(id);
            }
        }
    }

    /// Index every feature that has geometry
    pub fn build(atlas: &Atlas, cell_size: f64) -> Self {
        let mut grid = Self::new(cell_size);
        for (id, _) in atlas.iter() {
            if let Some(stats) = atlas.stats(id) {
                grid.insert(id, &stats.bbox);
            }
        }
        grid
    }

    /// Append feature ids for the given bounds into `results`, sorted and
    /// without duplicates. `results` is cleared first so callers can reuse it.
    pub fn query_into(&self, bounds: &BBox, results: &mut Vec<FeatureId>) {
        results.clear();
        let min_cell = self.to_cell(bounds.min_lon, bounds.min_lat);
        let max_cell = self.to_cell(bounds.max_lon, bounds.max_lat);
        for y in min_cell.1..=max_cell.1 {
            for x in min_cell.0..=max_cell.0 {
                if let Some(ids) = self.cells.get(&(x, y)) {
                    results.extend_from_slice(ids);
                }
            }
        }
        results.sort_unstable();
        results.dedup();
    }
}
