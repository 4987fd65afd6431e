//! Read a STAC asset over a lon/lat window.
//!
//! Glues [`StacClient`] (href signing) to [`CogReader`] (range reads): the
//! asset href is signed, the COG opened, the WGS84 window reprojected into
//! the COG's CRS and the matching level read.

use ndvits_core::{Raster, RasterElement, CRS};
use tracing::debug;

use crate::cog_reader::{CogReader, CogReaderOptions};
use crate::error::{CloudError, Result};
use crate::reproject::reproject_bbox;
use crate::source::RangeSource;
use crate::stac_client::StacClient;
use crate::stac_models::StacItem;
use crate::tile_index::BBox;

/// Read asset `asset_key` of `item` over the WGS84 window `bbox`.
///
/// `scale` (ground metres) picks the resolution level, see
/// [`CogReader::select_level`]; `None` reads full resolution. The raster
/// CRS comes from the COG GeoKeys, falling back to the item's `proj:epsg`.
pub async fn read_stac_asset<T: RasterElement>(
    client: &StacClient,
    item: &StacItem,
    asset_key: &str,
    bbox: &BBox,
    scale: Option<f64>,
    options: CogReaderOptions,
) -> Result<Raster<T>> {
    let asset = item.asset(asset_key).ok_or_else(|| CloudError::MissingAsset {
        item: item.id.clone(),
        asset: asset_key.to_string(),
    })?;

    let collection = item.collection.as_deref().unwrap_or_default();
    let href = client.sign_asset_href(&asset.href, collection).await?;

    let reader = CogReader::open_url(&href, client.auth(), options).await?;
    debug!("{} {}: opened {}", item.id, asset_key, reader.metadata().location);

    read_lonlat_window(&reader, bbox, scale, item.epsg().map(CRS::from_epsg)).await
}

/// Read an open COG over the WGS84 window `bbox`.
///
/// The window is reprojected into the COG's CRS, or `fallback_crs` when the
/// GeoKeys carry none. `scale` picks the level as in [`read_stac_asset`].
pub async fn read_lonlat_window<S: RangeSource, T: RasterElement>(
    reader: &CogReader<S>,
    bbox: &BBox,
    scale: Option<f64>,
    fallback_crs: Option<CRS>,
) -> Result<Raster<T>> {
    let crs = reader.crs().or(fallback_crs).unwrap_or_default();
    let window = reproject_bbox(bbox, &crs);
    let level = scale.map_or(0, |s| reader.select_level(s));

    debug!("level {level}, window {window:?} in {crs}");

    let mut raster = reader.read_window::<T>(&window, level).await?;
    if raster.crs().is_none() {
        raster.set_crs(Some(crs));
    }
    Ok(raster)
}
