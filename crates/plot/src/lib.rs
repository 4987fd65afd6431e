//! # ndvits plot
//!
//! PNG charts of NDVI time series: one chart per product and an overlay of
//! all products.

pub mod axes;
mod chart;
pub mod error;

pub use chart::{plot_combined, plot_series};
pub use error::{PlotError, Result};

use std::path::{Path, PathBuf};

/// Size of a single-product chart, pixels.
pub const SERIES_SIZE: (u32, u32) = (1000, 500);
/// Size of the overlay chart, pixels.
pub const COMBINED_SIZE: (u32, u32) = (1200, 600);
/// Title of the overlay chart.
pub const COMBINED_TITLE: &str = "NDVI Timeseries for Different Landsat Products";
/// File name of the overlay chart.
pub const COMBINED_FILE_NAME: &str = "NDVI_Timeseries_Combined.png";

/// Title of a single-product chart.
pub fn series_title(product: &str) -> String {
    format!("{product} NDVI Timeseries")
}

/// `<output_dir>/<product>_NDVI_Timeseries.png`
pub fn series_path(output_dir: &Path, product: &str) -> PathBuf {
    output_dir.join(format!("{product}_NDVI_Timeseries.png"))
}

/// `<output_dir>/NDVI_Timeseries_Combined.png`
pub fn combined_path(output_dir: &Path) -> PathBuf {
    output_dir.join(COMBINED_FILE_NAME)
}
