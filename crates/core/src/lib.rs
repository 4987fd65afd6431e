//! # ndvits core
//!
//! Shared raster types for the ndvits workspace:
//! - [`Raster`]: a georeferenced 2D grid backed by `ndarray`
//! - [`GeoTransform`]: affine pixel ↔ map coordinate mapping
//! - [`CRS`]: EPSG-based coordinate reference system tag
//! - [`RasterElement`]: numeric cell types a raster may hold

pub mod crs;
pub mod error;
pub mod raster;

pub use crs::CRS;
pub use error::{Error, Result};
pub use raster::{GeoTransform, Raster, RasterElement};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::crs::CRS;
    pub use crate::error::{Error, Result};
    pub use crate::raster::{GeoTransform, Raster, RasterElement};
}
