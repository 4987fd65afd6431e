//! Spatial mean of a raster
//!
//! Two-step reduction: each row is averaged over its valid cells, then the
//! row means are averaged. Rows with no valid cell drop out of the second
//! step instead of pulling the result to NaN. Note this weights rows
//! equally, so it differs from the plain cell mean when rows carry
//! different numbers of valid cells.

use crate::maybe_rayon::*;
use ndvits_core::raster::Raster;
use serde::Serialize;

/// Result of [`spatial_mean`]
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SpatialMean {
    /// Mean of the row means, NaN when no cell is valid
    pub mean: f64,
    /// Cells that contributed (not NaN, not nodata)
    pub valid_pixels: usize,
}

impl SpatialMean {
    pub fn is_valid(&self) -> bool {
        self.valid_pixels > 0 && self.mean.is_finite()
    }
}

/// Mean over columns per row, then over rows, skipping NaN and nodata.
pub fn spatial_mean(raster: &Raster<f64>) -> SpatialMean {
    let (rows, cols) = raster.shape();

    let row_stats: Vec<(f64, usize)> = (0..rows)
        .into_par_iter()
        .map(|row| {
            let mut sum = 0.0;
            let mut count = 0usize;
            for col in 0..cols {
                let v = unsafe { raster.get_unchecked(row, col) };
                if raster.is_nodata(v) {
                    continue;
                }
                sum += v;
                count += 1;
            }
            (sum, count)
        })
        .collect();

    let mut mean_sum = 0.0;
    let mut valid_rows = 0usize;
    let mut valid_pixels = 0usize;
    for (sum, count) in row_stats {
        if count == 0 {
            continue;
        }
        mean_sum += sum / count as f64;
        valid_rows += 1;
        valid_pixels += count;
    }

    let mean = if valid_rows > 0 {
        mean_sum / valid_rows as f64
    } else {
        f64::NAN
    };

    SpatialMean { mean, valid_pixels }
}
