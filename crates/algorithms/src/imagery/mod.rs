//! Imagery algorithms
//!
//! - Scale factors: Landsat Level-2 digital numbers to reflectance/Kelvin
//! - Spectral indices: NDVI and the generic normalized difference

mod indices;
mod scale;

pub use indices::{ndvi, normalized_difference};
pub use scale::{apply_scale_factors, BandKind, LANDSAT_FILL};
