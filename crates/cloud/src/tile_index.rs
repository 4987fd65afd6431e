//! Tile grid math for COG files.
//!
//! Maps a map-space window to the tiles that cover it and picks the
//! overview level that matches a requested ground resolution.

use ndvits_core::GeoTransform;
use serde::{Deserialize, Serialize};

/// Axis-aligned bounding box `(min_x, min_y, max_x, max_y)`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BBox {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl BBox {
    pub fn new(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Self {
        Self { min_x, min_y, max_x, max_y }
    }

    /// Inverted box that any `expand` replaces.
    pub fn empty() -> Self {
        Self::new(f64::INFINITY, f64::INFINITY, f64::NEG_INFINITY, f64::NEG_INFINITY)
    }

    /// Smallest box holding `self` and the point.
    pub fn expand(self, x: f64, y: f64) -> Self {
        Self::new(self.min_x.min(x), self.min_y.min(y), self.max_x.max(x), self.max_y.max(y))
    }

    pub fn width(&self) -> f64 {
        self.max_x - self.min_x
    }

    pub fn height(&self) -> f64 {
        self.max_y - self.min_y
    }

    /// Whether the box has positive, finite extent.
    pub fn is_valid(&self) -> bool {
        [self.min_x, self.min_y, self.max_x, self.max_y]
            .iter()
            .all(|v| v.is_finite())
            && self.width() > 0.0
            && self.height() > 0.0
    }

    /// Whether two boxes overlap with positive area.
    pub fn intersects(&self, other: &BBox) -> bool {
        self.min_x < other.max_x
            && self.max_x > other.min_x
            && self.min_y < other.max_y
            && self.max_y > other.min_y
    }

    /// `[min_x, min_y, max_x, max_y]`, the STAC bbox order.
    pub fn to_array(&self) -> [f64; 4] {
        [self.min_x, self.min_y, self.max_x, self.max_y]
    }
}

/// A tile to fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileRequest {
    /// Linear index into TileOffsets / TileByteCounts.
    pub tile_idx: usize,
    pub tile_col: usize,
    pub tile_row: usize,
}

/// A pixel window and the tiles covering it.
#[derive(Debug, Clone)]
pub struct TileMapping {
    pub tiles: Vec<TileRequest>,
    pub tiles_across: usize,
    /// `(min_col, min_row, max_col, max_row)`, max exclusive.
    pub pixel_window: (usize, usize, usize, usize),
    /// `(rows, cols)` of the output raster.
    pub output_shape: (usize, usize),
}

/// Tiles needed to read `bbox` (in the image CRS) from one level.
///
/// Returns `None` when the window misses the image.
pub fn tiles_for_bbox(
    bbox: &BBox,
    geo_transform: &GeoTransform,
    image_size: (u32, u32),
    tile_size: (u32, u32),
) -> Option<TileMapping> {
    let (iw, ih) = (image_size.0 as usize, image_size.1 as usize);
    let (tw, th) = (tile_size.0 as usize, tile_size.1 as usize);
    if tw == 0 || th == 0 {
        return None;
    }

    let (col_a, row_a) = geo_transform.geo_to_pixel(bbox.min_x, bbox.max_y);
    let (col_b, row_b) = geo_transform.geo_to_pixel(bbox.max_x, bbox.min_y);
    if !(col_a.is_finite() && row_a.is_finite() && col_b.is_finite() && row_b.is_finite()) {
        return None;
    }

    let clamp = |v: f64, hi: usize| (v.max(0.0) as usize).min(hi);
    let min_col = clamp(col_a.min(col_b).floor(), iw);
    let max_col = clamp(col_a.max(col_b).ceil(), iw);
    let min_row = clamp(row_a.min(row_b).floor(), ih);
    let max_row = clamp(row_a.max(row_b).ceil(), ih);

    if min_col >= max_col || min_row >= max_row {
        return None;
    }

    let tiles_across = iw.div_ceil(tw);
    let tiles_down = ih.div_ceil(th);
    let col_range = (min_col / tw)..max_col.div_ceil(tw).min(tiles_across);
    let row_range = (min_row / th)..max_row.div_ceil(th).min(tiles_down);

    let tiles = row_range
        .flat_map(|tile_row| {
            col_range.clone().map(move |tile_col| TileRequest {
                tile_idx: tile_row * tiles_across + tile_col,
                tile_col,
                tile_row,
            })
        })
        .collect();

    Some(TileMapping {
        tiles,
        tiles_across,
        pixel_window: (min_col, min_row, max_col, max_row),
        output_shape: (max_row - min_row, max_col - min_col),
    })
}

/// Index of the coarsest level whose pixel size does not exceed `scale`.
///
/// `pixel_sizes` lists ground pixel sizes per level, full resolution first.
/// A `scale` finer than every level selects full resolution.
pub fn select_level(pixel_sizes: &[f64], scale: f64) -> usize {
    let tolerance = 1e-6 * scale.abs().max(1.0);
    pixel_sizes
        .iter()
        .enumerate()
        .filter(|(_, &size)| size <= scale + tolerance)
        .max_by(|a, b| a.1.total_cmp(b.1))
        .map(|(i, _)| i)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn window_inside_one_tile_row() {
        let gt = GeoTransform::new(0.0, 100.0, 1.0, -1.0);
        let bbox = BBox::new(10.0, 10.0, 30.0, 30.0);

        let mapping = tiles_for_bbox(&bbox, &gt, (100, 100), (32, 32)).unwrap();
        // col 10..30, row 70..90
        assert_eq!(mapping.pixel_window, (10, 70, 30, 90));
        assert_eq!(mapping.output_shape, (20, 20));
        let idx: Vec<usize> = mapping.tiles.iter().map(|t| t.tile_idx).collect();
        // tile rows 2..3, tile col 0, 4 tiles across
        assert_eq!(idx, vec![8, 12]);
    }

    #[test]
    fn window_clipped_to_image() {
        let gt = GeoTransform::new(0.0, 100.0, 1.0, -1.0);
        let bbox = BBox::new(-50.0, 90.0, 10.0, 150.0);
        let mapping = tiles_for_bbox(&bbox, &gt, (100, 100), (32, 32)).unwrap();
        assert_eq!(mapping.pixel_window, (0, 0, 10, 10));
        assert_eq!(mapping.tiles.len(), 1);
    }

    #[test]
    fn window_outside_image() {
        let gt = GeoTransform::new(0.0, 100.0, 1.0, -1.0);
        let bbox = BBox::new(200.0, 200.0, 300.0, 300.0);
        assert!(tiles_for_bbox(&bbox, &gt, (100, 100), (32, 32)).is_none());
    }

    #[test]
    fn bbox_helpers() {
        let a = BBox::new(0.0, 0.0, 10.0, 10.0);
        assert!(a.intersects(&BBox::new(5.0, 5.0, 15.0, 15.0)));
        assert!(!a.intersects(&BBox::new(10.0, 0.0, 20.0, 10.0)));
        assert!(a.is_valid());
        assert!(!BBox::empty().is_valid());

        let grown = BBox::empty().expand(3.0, -1.0).expand(-2.0, 4.0);
        assert_eq!(grown, BBox::new(-2.0, -1.0, 3.0, 4.0));
    }

    #[test]
    fn level_selection_by_scale() {
        let sizes = [30.0, 60.0, 120.0, 240.0];
        assert_eq!(select_level(&sizes, 30.0), 0);
        assert_eq!(select_level(&sizes, 10.0), 0);
        assert_eq!(select_level(&sizes, 100.0), 1);
        assert_eq!(select_level(&sizes, 120.0), 2);
        assert_eq!(select_level(&sizes, 1000.0), 3);
        assert_eq!(select_level(&[], 30.0), 0);
    }
}
