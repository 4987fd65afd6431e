//! Statistical reductions of raster data
//!
//! - **spatial_mean**: mean over rows of per-row means, skipping NaN

pub mod spatial_mean;

pub use spatial_mean::{spatial_mean, SpatialMean};
