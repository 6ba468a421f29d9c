/// Braille Unicode canvas for high-resolution terminal graphics.
/// Each character cell represents a 2x4 pixel grid (8 dots).
/// Unicode Braille patterns: U+2800 to U+28FF
///
/// The cell buffer is kept across frames; [`BrailleCanvas::clear`] and
/// [`BrailleCanvas::resize`] reuse its allocation.
pub struct BrailleCanvas {
    width: usize,  // Characters
    height: usize, // Characters
    cells: Vec<u8>, // Bit patterns per char, row-major
}

const BLANK: u32 = 0x2800;

impl BrailleCanvas {
    /// Create a new canvas with the given character dimensions.
    /// Effective pixel resolution: width*2 x height*4
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            cells: vec![0u8; width * height],
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn pixel_width(&self) -> usize {
        self.width * 2
    }

    pub fn pixel_height(&self) -> usize {
        self.height * 4
    }

    /// Blank every cell
    pub fn clear(&mut self) {
        self.cells.fill(0);
    }

    /// Change dimensions and blank the canvas
    pub fn resize(&mut self, width: usize, height: usize) {
        self.width = width;
        self.height = height;
        self.cells.clear();
        self.cells.resize(width * height, 0);
    }

    /// Set a pixel at the given coordinates.
    /// Braille dot layout per character:
    /// ```text
    /// (0,0) (1,0)   bits: 0x01 0x08
    /// (0,1) (1,1)   bits: 0x02 0x10
    /// (0,2) (1,2)   bits: 0x04 0x20
    /// (0,3) (1,3)   bits: 0x40 0x80
    /// ```
    #[inline]
    pub fn set_pixel(&mut self, x: usize, y: usize) {
        let cx = x / 2;
        let cy = y / 4;

        if cx >= self.width || cy >= self.height {
            return;
        }

        let bit = match (x % 2, y % 4) {
            (0, 0) => 0x01,
            (1, 0) => 0x08,
            (0, 1) => 0x02,
            (1, 1) => 0x10,
            (0, 2) => 0x04,
            (1, 2) => 0x20,
            (0, 3) => 0x40,
            (1, 3) => 0x80,
            _ => 0,
        };

        self.cells[cy * self.width + cx] |= bit;
    }

    /// Set a pixel using signed coordinates (ignores negative values)
    #[inline]
    pub fn set_pixel_signed(&mut self, x: i32, y: i32) {
        if x >= 0 && y >= 0 {
            self.set_pixel(x as usize, y as usize);
        }
    }

    /// Braille character at a cell, `None` when the cell is blank or outside.
    pub fn cell(&self, col: usize, row: usize) -> Option<char> {
        if col >= self.width || row >= self.height {
            return None;
        }
        match self.cells[row * self.width + col] {
            0 => None,
            bits => char::from_u32(BLANK + bits as u32),
        }
    }

    /// Number of dots set
    pub fn dot_count(&self) -> usize {
        self.cells.iter().map(|b| b.count_ones() as usize).sum()
    }

    /// Get a specific row as a string (for line-by-line rendering)
    pub fn row_to_string(&self, row: usize) -> String {
        if row >= self.height {
            return String::new();
        }
        self.cells[row * self.width..(row + 1) * self.width]
            .iter()
            .map(|&b| char::from_u32(BLANK + b as u32).unwrap_or(' '))
            .collect()
    }

    /// Get all rows as an iterator of strings
    pub fn rows(&self) -> impl Iterator<Item = String> + '_ {
        (0..self.height).map(|i| self.row_to_string(i))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn render(canvas: &BrailleCanvas) -> String {
        canvas.rows().collect::<Vec<_>>().join("\n")
    }

    #[test]
    fn test_single_pixel() {
        let mut canvas = BrailleCanvas::new(1, 1);
        canvas.set_pixel(0, 0);
        assert_eq!(render(&canvas), "⠁"); // U+2801
    }

    #[test]
    fn test_all_dots() {
        let mut canvas = BrailleCanvas::new(1, 1);
        // Set all 8 dots
        for x in 0..2 {
            for y in 0..4 {
                canvas.set_pixel(x, y);
            }
        }
        assert_eq!(render(&canvas), "⣿"); // U+28FF (all dots)
        assert_eq!(canvas.dot_count(), 8);
    }

    #[test]
    fn test_diagonal() {
        let mut canvas = BrailleCanvas::new(2, 1);
        canvas.set_pixel(0, 0);
        canvas.set_pixel(1, 1);
        canvas.set_pixel(2, 2);
        canvas.set_pixel(3, 3);
        // First char: (0,0) and (1,1) = 0x01 | 0x10 = 0x11
        // Second char: (0,2) and (1,3) = 0x04 | 0x80 = 0x84
        assert_eq!(render(&canvas), "⠑⢄");
    }

    #[test]
    fn test_out_of_bounds_ignored() {
        let mut canvas = BrailleCanvas::new(2, 2);
        canvas.set_pixel(4, 0);
        canvas.set_pixel(0, 8);
        canvas.set_pixel_signed(-1, 3);
        assert_eq!(canvas.dot_count(), 0);
        assert_eq!(canvas.cell(0, 0), None);
    }

    #[test]
    fn test_clear_and_resize() {
        let mut canvas = BrailleCanvas::new(2, 2);
        canvas.set_pixel(3, 7);
        assert_eq!(canvas.cell(1, 1), Some('⢀'));
        canvas.clear();
        assert_eq!(canvas.dot_count(), 0);

        canvas.resize(3, 1);
        assert_eq!(canvas.pixel_width(), 6);
        assert_eq!(canvas.pixel_height(), 4);
        canvas.set_pixel(5, 3);
        assert_eq!(canvas.row_to_string(0), "⠀⠀⢀");
    }
}
