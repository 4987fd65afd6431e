//! GeoTIFF georeferencing from IFD tags.
//!
//! Reads ModelPixelScale + ModelTiepoint (or ModelTransformation),
//! the GeoKeyDirectory and GDAL_NODATA to place a COG on the ground.

use ndvits_core::{GeoTransform, CRS};

use crate::ifd::{tags, TagValues};

/// GeoKey holding the EPSG code of a projected CRS.
const PROJECTED_CS_TYPE: u64 = 3072;
/// GeoKey holding the EPSG code of a geographic CRS.
const GEOGRAPHIC_TYPE: u64 = 2048;
/// GeoKey value meaning "user defined", not an EPSG code.
const USER_DEFINED: u64 = 32767;

/// Georeferencing of the full-resolution image.
#[derive(Debug, Clone)]
pub struct GeoTiffMeta {
    pub geo_transform: GeoTransform,
    pub crs: Option<CRS>,
    pub nodata: Option<f64>,
}

/// Extract georeferencing from the tags of the first IFD.
pub fn extract_geotiff_meta(values: &TagValues) -> GeoTiffMeta {
    GeoTiffMeta {
        geo_transform: extract_geotransform(values),
        crs: extract_crs(values),
        nodata: values
            .ascii(tags::GDAL_NODATA)
            .and_then(|s| s.trim().parse::<f64>().ok()),
    }
}

fn extract_geotransform(values: &TagValues) -> GeoTransform {
    let scale = values.f64s(tags::MODEL_PIXEL_SCALE);
    let tiepoint = values.f64s(tags::MODEL_TIEPOINT);

    if let (Some(s), Some(t)) = (&scale, &tiepoint) {
        if s.len() >= 2 && t.len() >= 6 {
            // tiepoint = (i, j, k, x, y, z): raster (i, j) sits at map (x, y)
            return GeoTransform::new(t[3] - t[0] * s[0], t[4] + t[1] * s[1], s[0], -s[1]);
        }
    }

    if let Some(m) = values.f64s(tags::MODEL_TRANSFORMATION).filter(|m| m.len() >= 16) {
        return GeoTransform {
            origin_x: m[3],
            origin_y: m[7],
            pixel_width: m[0],
            pixel_height: m[5],
            row_rotation: m[1],
            col_rotation: m[4],
        };
    }

    GeoTransform::default()
}

/// EPSG code from the GeoKeyDirectory, projected key first.
fn extract_crs(values: &TagValues) -> Option<CRS> {
    // header: version, revision, minor, key count; then 4 shorts per key
    let dir = values.u64s(tags::GEO_KEY_DIRECTORY)?;
    let count = *dir.get(3)? as usize;

    let keys: Vec<(u64, u64, u64)> = dir[4..]
        .chunks_exact(4)
        .take(count)
        .map(|k| (k[0], k[1], k[3]))
        .collect();

    [PROJECTED_CS_TYPE, GEOGRAPHIC_TYPE].iter().find_map(|&wanted| {
        keys.iter()
            .find(|(id, location, value)| {
                *id == wanted && *location == 0 && *value > 0 && *value != USER_DEFINED
            })
            .map(|&(_, _, value)| CRS::from_epsg(value as u32))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ifd::{field_type, RawIfd, RawTagEntry, TiffByteOrder};

    fn external(tag: u16, type_id: u16, count: u32) -> RawTagEntry {
        RawTagEntry {
            tag,
            type_id,
            count,
            value_bytes: [0; 4],
        }
    }

    fn doubles(vals: &[f64]) -> Vec<u8> {
        vals.iter().flat_map(|v| v.to_le_bytes()).collect()
    }

    fn shorts(vals: &[u16]) -> Vec<u8> {
        vals.iter().flat_map(|v| v.to_le_bytes()).collect()
    }

    fn empty_values() -> TagValues {
        let ifd = RawIfd {
            entries: Vec::new(),
            next_ifd_offset: 0,
        };
        TagValues::from_ifd(TiffByteOrder::LittleEndian, &ifd).0
    }

    #[test]
    fn landsat_utm_tags() {
        let mut values = empty_values();
        values.insert(
            external(tags::MODEL_PIXEL_SCALE, field_type::DOUBLE, 3),
            doubles(&[30.0, 30.0, 0.0]),
        );
        values.insert(
            external(tags::MODEL_TIEPOINT, field_type::DOUBLE, 6),
            doubles(&[0.0, 0.0, 0.0, 569_085.0, 5_129_715.0, 0.0]),
        );
        values.insert(
            external(tags::GEO_KEY_DIRECTORY, field_type::SHORT, 16),
            shorts(&[1, 1, 0, 3, 1024, 0, 1, 1, 1025, 0, 1, 1, 3072, 0, 1, 32615]),
        );
        values.insert(
            external(tags::GDAL_NODATA, field_type::ASCII, 2),
            b"0\0".to_vec(),
        );

        let meta = extract_geotiff_meta(&values);
        assert_eq!(meta.geo_transform.origin_x, 569_085.0);
        assert_eq!(meta.geo_transform.origin_y, 5_129_715.0);
        assert_eq!(meta.geo_transform.pixel_width, 30.0);
        assert_eq!(meta.geo_transform.pixel_height, -30.0);
        assert_eq!(meta.crs, Some(CRS::from_epsg(32615)));
        assert_eq!(meta.nodata, Some(0.0));
    }

    #[test]
    fn model_transformation_fallback() {
        let mut values = empty_values();
        let mut m = [0.0; 16];
        m[0] = 10.0;
        m[3] = 100.0;
        m[5] = -10.0;
        m[7] = 200.0;
        m[15] = 1.0;
        values.insert(external(tags::MODEL_TRANSFORMATION, field_type::DOUBLE, 16), doubles(&m));

        let meta = extract_geotiff_meta(&values);
        assert_eq!(meta.geo_transform.origin_x, 100.0);
        assert_eq!(meta.geo_transform.pixel_height, -10.0);
        assert!(meta.crs.is_none());
        assert!(meta.nodata.is_none());
    }

    #[test]
    fn user_defined_crs_is_ignored() {
        let mut values = empty_values();
        values.insert(
            external(tags::GEO_KEY_DIRECTORY, field_type::SHORT, 8),
            shorts(&[1, 1, 0, 1, 3072, 0, 1, 32767]),
        );
        assert!(extract_geotiff_meta(&values).crs.is_none());
    }
}
