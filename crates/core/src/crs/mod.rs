//! Coordinate reference system tags
//!
//! Landsat COGs are delivered in WGS84 / UTM, so a CRS is carried as its
//! EPSG code. Classification helpers decide whether a bbox needs
//! reprojection before it can index a raster.

use serde::{Deserialize, Serialize};
use std::fmt;

/// EPSG code of WGS84 geographic coordinates.
pub const EPSG_WGS84: u32 = 4326;

/// Coordinate reference system identified by EPSG code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CRS {
    epsg: u32,
}

impl CRS {
    /// Create a CRS from an EPSG code
    pub fn from_epsg(code: u32) -> Self {
        Self { epsg: code }
    }

    /// WGS84 geographic CRS (EPSG:4326)
    pub fn wgs84() -> Self {
        Self::from_epsg(EPSG_WGS84)
    }

    /// UTM zone CRS on the WGS84 datum.
    ///
    /// Returns `None` for zones outside 1..=60.
    pub fn utm(zone: u32, north: bool) -> Option<Self> {
        if !(1..=60).contains(&zone) {
            return None;
        }
        let base = if north { 32600 } else { 32700 };
        Some(Self::from_epsg(base + zone))
    }

    /// EPSG code
    pub fn epsg(&self) -> u32 {
        self.epsg
    }

    /// Whether this is WGS84 geographic
    pub fn is_geographic(&self) -> bool {
        self.epsg == EPSG_WGS84
    }

    /// UTM zone and hemisphere, `Some((zone, is_north))` for EPSG 326xx/327xx
    pub fn utm_zone(&self) -> Option<(u32, bool)> {
        match self.epsg {
            32601..=32660 => Some((self.epsg - 32600, true)),
            32701..=32760 => Some((self.epsg - 32700, false)),
            _ => None,
        }
    }
}

impl fmt::Display for CRS {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EPSG:{}", self.epsg)
    }
}

impl Default for CRS {
    fn default() -> Self {
        Self::wgs84()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_uses_epsg_prefix() {
        assert_eq!(CRS::from_epsg(32615).to_string(), "EPSG:32615");
        assert_eq!(CRS::default().to_string(), "EPSG:4326");
    }

    #[test]
    fn utm_zone_roundtrip() {
        let north = CRS::utm(15, true).unwrap();
        assert_eq!(north.epsg(), 32615);
        assert_eq!(north.utm_zone(), Some((15, true)));

        let south = CRS::utm(21, false).unwrap();
        assert_eq!(south.epsg(), 32721);
        assert_eq!(south.utm_zone(), Some((21, false)));

        assert!(CRS::utm(0, true).is_none());
        assert!(CRS::utm(61, false).is_none());
    }

    #[test]
    fn non_utm_codes_have_no_zone() {
        assert!(CRS::wgs84().utm_zone().is_none());
        assert!(CRS::wgs84().is_geographic());
        assert!(CRS::from_epsg(3857).utm_zone().is_none());
    }
}
