//! Area of interest: a closed WGS84 polygon.
//!
//! Imagery is read over the polygon's lon/lat envelope, not the exact
//! outline.

use std::fmt;
use std::str::FromStr;

use geo::{BoundingRect, Coord, LineString, Polygon};
use ndvits_cloud::BBox;

use crate::error::{PipelineError, Result};

/// Vertices of the default AOI, lon/lat degrees.
pub const DEFAULT_AOI: [[f64; 2]; 4] = [
    [-91.3625, 46.1597],
    [-91.3625, 46.1416],
    [-91.33, 46.1416],
    [-91.33, 46.1597],
];

/// A validated lon/lat polygon.
#[derive(Debug, Clone, PartialEq)]
pub struct Aoi {
    polygon: Polygon<f64>,
}

impl Aoi {
    /// Build from `[lon, lat]` vertices; the ring is closed automatically.
    pub fn new(vertices: &[[f64; 2]]) -> Result<Self> {
        let ring: Vec<Coord<f64>> = vertices.iter().map(|&[x, y]| Coord { x, y }).collect();
        Self::from_polygon(Polygon::new(LineString::new(ring), vec![]))
    }

    /// Wrap a polygon after checking its exterior ring.
    pub fn from_polygon(polygon: Polygon<f64>) -> Result<Self> {
        let mut distinct: Vec<Coord<f64>> = Vec::new();
        for c in polygon.exterior().coords() {
            if !(-180.0..=180.0).contains(&c.x) || !(-90.0..=90.0).contains(&c.y) {
                return Err(PipelineError::InvalidAoi(format!(
                    "vertex ({}, {}) outside lon [-180, 180] / lat [-90, 90]",
                    c.x, c.y
                )));
            }
            if !distinct.contains(c) {
                distinct.push(*c);
            }
        }
        if distinct.len() < 3 {
            return Err(PipelineError::InvalidAoi(format!(
                "polygon needs at least 3 distinct vertices, got {}",
                distinct.len()
            )));
        }
        Ok(Self { polygon })
    }

    pub fn polygon(&self) -> &Polygon<f64> {
        &self.polygon
    }

    /// Lon/lat envelope of the polygon.
    pub fn bounds(&self) -> BBox {
        match self.polygon.bounding_rect() {
            Some(rect) => BBox::new(rect.min().x, rect.min().y, rect.max().x, rect.max().y),
            None => BBox::empty(),
        }
    }
}

impl Default for Aoi {
    fn default() -> Self {
        let ring: Vec<Coord<f64>> = DEFAULT_AOI.iter().map(|&[x, y]| Coord { x, y }).collect();
        Self {
            polygon: Polygon::new(LineString::new(ring), vec![]),
        }
    }
}

/// Parses `"lon,lat;lon,lat;..."`.
impl FromStr for Aoi {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self> {
        let mut vertices = Vec::new();
        for pair in s.split(';').map(str::trim).filter(|p| !p.is_empty()) {
            let (lon, lat) = pair
                .split_once(',')
                .ok_or_else(|| PipelineError::InvalidAoi(format!("expected 'lon,lat', got '{pair}'")))?;
            let parse = |v: &str| {
                v.trim()
                    .parse::<f64>()
                    .map_err(|e| PipelineError::InvalidAoi(format!("'{v}': {e}")))
            };
            vertices.push([parse(lon)?, parse(lat)?]);
        }
        Self::new(&vertices)
    }
}

impl fmt::Display for Aoi {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let b = self.bounds();
        write!(
            f,
            "[{:.4}, {:.4}, {:.4}, {:.4}]",
            b.min_x, b.min_y, b.max_x, b.max_y
        )
    }
}
