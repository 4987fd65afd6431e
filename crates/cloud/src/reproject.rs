//! WGS84 → UTM reprojection of search windows (Snyder 1987, USGS formulas).
//!
//! Landsat Collection 2 COGs are delivered in WGS84 / UTM (EPSG 326xx and
//! 327xx), so the lon/lat AOI bounds only ever need this one projection.

use ndvits_core::CRS;
use tracing::warn;

use crate::tile_index::BBox;

// WGS84 ellipsoid
const A: f64 = 6_378_137.0;
const F: f64 = 1.0 / 298.257_223_563;
const E2: f64 = 2.0 * F - F * F;
const E_PRIME2: f64 = E2 / (1.0 - E2);

// UTM
const K0: f64 = 0.9996;
const FALSE_EASTING: f64 = 500_000.0;
const FALSE_NORTHING_SOUTH: f64 = 10_000_000.0;

/// Reproject a WGS84 bbox into `target`.
///
/// The envelope of all four projected corners is returned, since UTM
/// bends lines of constant latitude. WGS84 targets return the bbox as-is;
/// other non-UTM targets are not supported and also pass through, with a
/// warning.
pub fn reproject_bbox(bbox: &BBox, target: &CRS) -> BBox {
    if target.is_geographic() {
        return *bbox;
    }

    let Some((zone, north)) = target.utm_zone() else {
        warn!("no reprojection to {target}, using lon/lat window unchanged");
        return *bbox;
    };

    let corners = [
        (bbox.min_x, bbox.min_y),
        (bbox.min_x, bbox.max_y),
        (bbox.max_x, bbox.min_y),
        (bbox.max_x, bbox.max_y),
    ];

    corners
        .iter()
        .map(|&(lon, lat)| wgs84_to_utm(lon, lat, zone, north))
        .fold(BBox::empty(), |acc, (e, n)| acc.expand(e, n))
}

/// Longitude/latitude in degrees to UTM easting/northing in metres.
pub fn wgs84_to_utm(lon_deg: f64, lat_deg: f64, zone: u32, north: bool) -> (f64, f64) {
    let lat = lat_deg.to_radians();
    let lon = lon_deg.to_radians();
    let central_meridian = (zone as f64 * 6.0 - 183.0).to_radians();

    let (sin_lat, cos_lat) = lat.sin_cos();
    let tan_lat = lat.tan();

    let n = A / (1.0 - E2 * sin_lat * sin_lat).sqrt();
    let t = tan_lat * tan_lat;
    let c = E_PRIME2 * cos_lat * cos_lat;
    let a = cos_lat * (lon - central_meridian);
    let (a2, a3) = (a * a, a * a * a);
    let (a4, a5, a6) = (a2 * a2, a2 * a3, a3 * a3);

    // Snyder eq. 8-9 and 8-10
    let easting = FALSE_EASTING
        + K0 * n
            * (a + (1.0 - t + c) * a3 / 6.0
                + (5.0 - 18.0 * t + t * t + 72.0 * c - 58.0 * E_PRIME2) * a5 / 120.0);
    let northing = K0
        * (meridional_arc(lat)
            + n * tan_lat
                * (a2 / 2.0
                    + (5.0 - t + 9.0 * c + 4.0 * c * c) * a4 / 24.0
                    + (61.0 - 58.0 * t + t * t + 600.0 * c - 330.0 * E_PRIME2) * a6 / 720.0));

    if north {
        (easting, northing)
    } else {
        (easting, northing + FALSE_NORTHING_SOUTH)
    }
}

/// Distance along the meridian from the equator (Snyder eq. 3-21).
fn meridional_arc(lat: f64) -> f64 {
    let e4 = E2 * E2;
    let e6 = e4 * E2;

    A * ((1.0 - E2 / 4.0 - 3.0 * e4 / 64.0 - 5.0 * e6 / 256.0) * lat
        - (3.0 * E2 / 8.0 + 3.0 * e4 / 32.0 + 45.0 * e6 / 1024.0) * (2.0 * lat).sin()
        + (15.0 * e4 / 256.0 + 45.0 * e6 / 1024.0) * (4.0 * lat).sin()
        - (35.0 * e6 / 3072.0) * (6.0 * lat).sin())
}
