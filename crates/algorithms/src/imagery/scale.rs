//! Landsat Collection 2 Level-2 radiometric scale factors
//!
//! Level-2 products ship scaled integers. Surface reflectance bands map to
//! reflectance with `DN * 0.0000275 - 0.2`, surface temperature bands to
//! Kelvin with `DN * 0.00341802 + 149.0`.

use crate::maybe_rayon::*;
use ndarray::Array2;
use ndvits_core::raster::{Raster, RasterElement};
use ndvits_core::{Error, Result};
use tracing::debug;

/// Reflectance multiplier for `SR_B*` bands
pub const OPTICAL_SCALE: f64 = 0.0000275;
/// Reflectance offset for `SR_B*` bands
pub const OPTICAL_OFFSET: f64 = -0.2;
/// Kelvin multiplier for `ST_B*` bands
pub const THERMAL_SCALE: f64 = 0.00341802;
/// Kelvin offset for `ST_B*` bands
pub const THERMAL_OFFSET: f64 = 149.0;

/// Fill value of Landsat Level-2 integer bands
pub const LANDSAT_FILL: f64 = 0.0;

/// STAC common names of the surface reflectance assets
const OPTICAL_COMMON_NAMES: &[&str] = &[
    "coastal", "blue", "green", "red", "nir08", "swir16", "swir22",
];

/// STAC common names of the surface temperature assets
const THERMAL_COMMON_NAMES: &[&str] = &["lwir", "lwir11"];

/// Radiometric family of a band
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BandKind {
    /// Surface reflectance
    Optical,
    /// Surface temperature
    Thermal,
    /// QA, angle or anything else left unscaled
    Other,
}

impl BandKind {
    /// Classify a band by its Landsat file name (`SR_B4`) or STAC asset key (`red`).
    pub fn classify(band_name: &str) -> Self {
        let upper = band_name.to_ascii_uppercase();
        let lower = band_name.to_ascii_lowercase();
        if upper.starts_with("SR_B") || OPTICAL_COMMON_NAMES.contains(&lower.as_str()) {
            BandKind::Optical
        } else if upper.starts_with("ST_B") || THERMAL_COMMON_NAMES.contains(&lower.as_str()) {
            BandKind::Thermal
        } else {
            BandKind::Other
        }
    }

    /// `(scale, offset)` applied to raw values, if any
    pub fn factors(self) -> Option<(f64, f64)> {
        match self {
            BandKind::Optical => Some((OPTICAL_SCALE, OPTICAL_OFFSET)),
            BandKind::Thermal => Some((THERMAL_SCALE, THERMAL_OFFSET)),
            BandKind::Other => None,
        }
    }
}

/// Apply the Level-2 scale factors for `band_name` to `raster`.
///
/// Nodata cells become NaN in the output. The raster's declared nodata is
/// used when present; otherwise the Landsat fill value `0` is treated as
/// nodata. Bands that are neither optical nor thermal are only cast to f64,
/// with their nodata cells still turned into NaN.
pub fn apply_scale_factors<T: RasterElement>(
    band_name: &str,
    raster: &Raster<T>,
) -> Result<Raster<f64>> {
    let kind = BandKind::classify(band_name);
    let (rows, cols) = raster.shape();
    let nodata = raster
        .nodata()
        .and_then(|nd| nd.to_f64())
        .unwrap_or(LANDSAT_FILL);
    let (scale, offset) = kind.factors().unwrap_or_else(|| {
        debug!("{band_name}: no scale factors, values cast only");
        (1.0, 0.0)
    });

    let view = raster.view();
    let data: Vec<f64> = (0..rows)
        .into_par_iter()
        .flat_map(|row| {
            let mut row_data = vec![f64::NAN; cols];
            for (col, out) in row_data.iter_mut().enumerate() {
                let value = match view[[row, col]].to_f64() {
                    Some(v) if !v.is_nan() && v != nodata => v,
                    _ => continue,
                };
                *out = value * scale + offset;
            }
            row_data
        })
        .collect();

    let array = Array2::from_shape_vec((rows, cols), data)
        .map_err(|e| Error::Other(e.to_string()))?;
    let mut output = Raster::from_array(array);
    output.set_transform(*raster.transform());
    output.set_crs(raster.crs().copied());
    output.set_nodata(Some(f64::NAN));
    Ok(output)
}
