//! Affine georeferencing for rasters

use serde::{Deserialize, Serialize};

/// Affine mapping between pixel (col, row) and map (x, y) coordinates:
///
/// ```text
/// x = origin_x + col * pixel_width + row * row_rotation
/// y = origin_y + col * col_rotation + row * pixel_height
/// ```
///
/// North-up rasters have zero rotation terms and a negative `pixel_height`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoTransform {
    /// X of the upper-left corner of pixel (0, 0)
    pub origin_x: f64,
    /// Y of the upper-left corner of pixel (0, 0)
    pub origin_y: f64,
    pub pixel_width: f64,
    pub pixel_height: f64,
    pub row_rotation: f64,
    pub col_rotation: f64,
}

impl GeoTransform {
    /// North-up transform without rotation
    pub fn new(origin_x: f64, origin_y: f64, pixel_width: f64, pixel_height: f64) -> Self {
        Self {
            origin_x,
            origin_y,
            pixel_width,
            pixel_height,
            row_rotation: 0.0,
            col_rotation: 0.0,
        }
    }

    /// Map coordinates of the upper-left corner of a pixel
    pub fn pixel_corner(&self, col: usize, row: usize) -> (f64, f64) {
        self.apply(col as f64, row as f64)
    }

    /// Map coordinates of a pixel center
    pub fn pixel_center(&self, col: usize, row: usize) -> (f64, f64) {
        self.apply(col as f64 + 0.5, row as f64 + 0.5)
    }

    /// Fractional pixel position of a map coordinate.
    ///
    /// Returns NaN for a degenerate (non-invertible) transform.
    pub fn geo_to_pixel(&self, x: f64, y: f64) -> (f64, f64) {
        let det = self.pixel_width * self.pixel_height - self.row_rotation * self.col_rotation;
        if det.abs() < 1e-12 {
            return (f64::NAN, f64::NAN);
        }

        let dx = x - self.origin_x;
        let dy = y - self.origin_y;
        let col = (self.pixel_height * dx - self.row_rotation * dy) / det;
        let row = (self.pixel_width * dy - self.col_rotation * dx) / det;
        (col, row)
    }

    /// Transform of the sub-window whose upper-left pixel is (col, row)
    pub fn window(&self, col: usize, row: usize) -> Self {
        let (x, y) = self.pixel_corner(col, row);
        Self {
            origin_x: x,
            origin_y: y,
            ..*self
        }
    }

    /// Same origin, pixels enlarged by (sx, sy); used for overview levels
    pub fn scaled(&self, sx: f64, sy: f64) -> Self {
        Self {
            pixel_width: self.pixel_width * sx,
            pixel_height: self.pixel_height * sy,
            row_rotation: self.row_rotation * sy,
            col_rotation: self.col_rotation * sx,
            ..*self
        }
    }

    /// Ground size of one pixel along x
    pub fn cell_size(&self) -> f64 {
        self.pixel_width.abs()
    }

    /// Envelope `(min_x, min_y, max_x, max_y)` of a `cols` × `rows` grid
    pub fn bounds(&self, cols: usize, rows: usize) -> (f64, f64, f64, f64) {
        let corners = [
            self.pixel_corner(0, 0),
            self.pixel_corner(cols, 0),
            self.pixel_corner(0, rows),
            self.pixel_corner(cols, rows),
        ];
        corners.iter().fold(
            (f64::INFINITY, f64::INFINITY, f64::NEG_INFINITY, f64::NEG_INFINITY),
            |(min_x, min_y, max_x, max_y), &(x, y)| {
                (min_x.min(x), min_y.min(y), max_x.max(x), max_y.max(y))
            },
        )
    }

    fn apply(&self, col: f64, row: f64) -> (f64, f64) {
        (
            self.origin_x + col * self.pixel_width + row * self.row_rotation,
            self.origin_y + col * self.col_rotation + row * self.pixel_height,
        )
    }
}

impl Default for GeoTransform {
    fn default() -> Self {
        Self::new(0.0, 0.0, 1.0, -1.0)
    }
}
