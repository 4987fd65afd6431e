//! # ndvits algorithms
//!
//! Raster kernels behind the NDVI time series.
//!
//! ## Available Algorithm Categories
//!
//! - **imagery**: Landsat scale factors, NDVI
//! - **statistics**: NaN-aware spatial mean

pub mod imagery;
pub(crate) mod maybe_rayon;
pub mod statistics;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::imagery::{apply_scale_factors, ndvi, normalized_difference, BandKind};
    pub use crate::statistics::{spatial_mean, SpatialMean};
    pub use ndvits_core::prelude::*;
}
