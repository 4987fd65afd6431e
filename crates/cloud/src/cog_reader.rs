//! Cloud Optimized GeoTIFF reader: open a COG and read map windows.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use ndarray::Array2;
use ndvits_core::{GeoTransform, Raster, RasterElement, CRS};
use tracing::debug;

use crate::auth::CloudAuth;
use crate::cache::{TileCache, TileKey};
use crate::decompress;
use crate::error::{CloudError, Result};
use crate::geotiff_keys::{self, GeoTiffMeta};
use crate::ifd::{self, tags, IfdInfo, TagValues, TiffByteOrder};
use crate::source::{HttpSource, RangeSource};
use crate::tile_index::{self, BBox, TileMapping};

/// Bytes fetched up front; usually covers the header, all IFDs and tag data.
const PREFETCH_BYTES: u64 = 64 * 1024;

/// Tags needed to decode the tiles of any level.
const STRUCTURE_TAGS: [u16; 12] = [
    tags::NEW_SUBFILE_TYPE,
    tags::IMAGE_WIDTH,
    tags::IMAGE_LENGTH,
    tags::BITS_PER_SAMPLE,
    tags::COMPRESSION,
    tags::SAMPLES_PER_PIXEL,
    tags::PREDICTOR,
    tags::TILE_WIDTH,
    tags::TILE_LENGTH,
    tags::TILE_OFFSETS,
    tags::TILE_BYTE_COUNTS,
    tags::SAMPLE_FORMAT,
];

/// Tags read from the full-resolution IFD only.
const GEO_TAGS: [u16; 5] = [
    tags::MODEL_PIXEL_SCALE,
    tags::MODEL_TIEPOINT,
    tags::MODEL_TRANSFORMATION,
    tags::GEO_KEY_DIRECTORY,
    tags::GDAL_NODATA,
];

/// NewSubfileType bit marking a transparency mask.
const SUBFILE_MASK: u64 = 4;

/// Tuning for [`CogReader`].
#[derive(Debug, Clone)]
pub struct CogReaderOptions {
    /// Tiles requested concurrently per batch (default: 8).
    pub max_concurrent_fetches: usize,
    /// Decoded tiles kept in the LRU cache (default: 128).
    pub cache_capacity: usize,
    /// Timeout per HTTP request (default: 30 s).
    pub request_timeout: Duration,
    /// Retries on timeouts and connection failures (default: 3).
    pub max_retries: u32,
}

impl Default for CogReaderOptions {
    fn default() -> Self {
        Self {
            max_concurrent_fetches: 8,
            cache_capacity: 128,
            request_timeout: Duration::from_secs(30),
            max_retries: 3,
        }
    }
}

/// Summary of an opened COG.
#[derive(Debug, Clone)]
pub struct CogMetadata {
    pub location: String,
    pub width: u32,
    pub height: u32,
    pub tile_width: u32,
    pub tile_height: u32,
    pub bits_per_sample: u16,
    pub sample_format: u16,
    pub compression: u16,
    pub predictor: u16,
    pub geo_transform: GeoTransform,
    pub crs: Option<CRS>,
    pub nodata: Option<f64>,
    pub num_overviews: usize,
}

/// One resolution level: index 0 is full resolution, then overviews.
#[derive(Debug, Clone)]
pub struct CogLevel {
    pub index: usize,
    pub width: u32,
    pub height: u32,
    /// Ground size of one pixel, in CRS units.
    pub pixel_size: f64,
    pub geo_transform: GeoTransform,
}

/// Cloud Optimized GeoTIFF reader over any [`RangeSource`].
///
/// Tiles are fetched on demand and decoded tiles are cached, so repeated
/// windows over the same file cost no extra requests.
pub struct CogReader<S> {
    source: S,
    byte_order: TiffByteOrder,
    ifds: Vec<IfdInfo>,
    geo_meta: GeoTiffMeta,
    cache: TileCache,
    options: CogReaderOptions,
}

impl CogReader<HttpSource> {
    /// Open a remote COG by URL.
    pub async fn open_url(
        url: &str,
        auth: Arc<dyn CloudAuth>,
        options: CogReaderOptions,
    ) -> Result<Self> {
        let source =
            HttpSource::new(url, options.request_timeout, options.max_retries)?.with_auth(auth);
        Self::open(source, options).await
    }
}

impl<S: RangeSource> CogReader<S> {
    /// Read the header and every IFD of the file.
    pub async fn open(source: S, options: CogReaderOptions) -> Result<Self> {
        let file_size = source.size().await?;
        let prefetch_len = file_size.map_or(PREFETCH_BYTES, |n| n.min(PREFETCH_BYTES));
        let prefetch = source.fetch(0, prefetch_len).await?;

        let header = ifd::parse_header(&prefetch)?;
        let order = header.byte_order;
        let reader = ByteWindow {
            source: &source,
            prefetch: &prefetch,
        };

        let mut ifds = Vec::new();
        let mut geo_meta = None;
        let mut seen = HashSet::new();
        let mut offset = header.first_ifd_offset;

        while offset > 0 {
            if !seen.insert(offset) {
                return Err(CloudError::InvalidTiff {
                    reason: format!("IFD chain loops back to offset {offset}"),
                });
            }

            let count_bytes = reader.read(offset, 2).await?;
            let count = ifd::ifd_entry_count(order, &count_bytes)?;
            let ifd_bytes = reader.read(offset, ifd::ifd_size(count) as u64).await?;
            let raw = ifd::parse_ifd(order, &ifd_bytes)?;

            let (mut values, pending) = TagValues::from_ifd(order, &raw);
            let first = geo_meta.is_none();
            for entry in pending {
                let wanted = STRUCTURE_TAGS.contains(&entry.tag)
                    || (first && GEO_TAGS.contains(&entry.tag));
                if wanted {
                    let data = reader
                        .read(entry.value_offset(order), entry.value_size())
                        .await?;
                    values.insert(entry, data);
                }
            }

            let subfile = values.u64(tags::NEW_SUBFILE_TYPE).unwrap_or(0);
            if subfile & SUBFILE_MASK == 0 {
                if first {
                    geo_meta = Some(geotiff_keys::extract_geotiff_meta(&values));
                }
                let info = ifd_info(&values)?;
                info.validate()?;
                ifds.push(info);
            }

            offset = raw.next_ifd_offset;
        }

        let geo_meta = geo_meta.ok_or(CloudError::NoIfd)?;
        if ifds.is_empty() {
            return Err(CloudError::NoIfd);
        }

        debug!(
            "opened {} ({}x{}, {} overviews, crs {:?})",
            source.location(),
            ifds[0].width,
            ifds[0].height,
            ifds.len() - 1,
            geo_meta.crs.map(|c| c.epsg())
        );

        Ok(Self {
            source,
            byte_order: order,
            ifds,
            geo_meta,
            cache: TileCache::new(options.cache_capacity),
            options,
        })
    }

    pub fn metadata(&self) -> CogMetadata {
        let full = &self.ifds[0];
        CogMetadata {
            location: self.source.location().to_string(),
            width: full.width,
            height: full.height,
            tile_width: full.tile_width,
            tile_height: full.tile_height,
            bits_per_sample: full.bits_per_sample,
            sample_format: full.sample_format,
            compression: full.compression,
            predictor: full.predictor,
            geo_transform: self.geo_meta.geo_transform,
            crs: self.geo_meta.crs,
            nodata: self.geo_meta.nodata,
            num_overviews: self.ifds.len() - 1,
        }
    }

    pub fn crs(&self) -> Option<CRS> {
        self.geo_meta.crs
    }

    /// All resolution levels, full resolution first.
    pub fn levels(&self) -> Vec<CogLevel> {
        (0..self.ifds.len())
            .map(|index| {
                let gt = self.level_transform(index);
                CogLevel {
                    index,
                    width: self.ifds[index].width,
                    height: self.ifds[index].height,
                    pixel_size: gt.cell_size(),
                    geo_transform: gt,
                }
            })
            .collect()
    }

    /// Coarsest level whose pixels are no larger than `scale`.
    pub fn select_level(&self, scale: f64) -> usize {
        let sizes: Vec<f64> = self.levels().iter().map(|l| l.pixel_size).collect();
        tile_index::select_level(&sizes, scale)
    }

    /// Read the window `bbox` (in the COG's CRS) from one level.
    ///
    /// Cells not covered by any stored tile hold `T::fill_value()`. The
    /// declared nodata, if representable in `T`, is set on the raster.
    pub async fn read_window<T: RasterElement>(&self, bbox: &BBox, level: usize) -> Result<Raster<T>> {
        let ifd = self.ifds.get(level).ok_or_else(|| CloudError::InvalidTiff {
            reason: format!("level {level} out of range (have {})", self.ifds.len()),
        })?;
        let gt = self.level_transform(level);

        let mapping = tile_index::tiles_for_bbox(
            bbox,
            &gt,
            (ifd.width, ifd.height),
            (ifd.tile_width, ifd.tile_height),
        )
        .ok_or(CloudError::BBoxOutside)?;

        self.load_tiles(level, ifd, &mapping).await?;
        let data = self.assemble::<T>(level, ifd, &mapping)?;

        let (min_col, min_row, _, _) = mapping.pixel_window;
        let mut raster = Raster::from_array(data);
        raster.set_transform(gt.window(min_col, min_row));
        raster.set_crs(self.geo_meta.crs);
        raster.set_nodata(self.geo_meta.nodata.and_then(num_traits::cast));
        Ok(raster)
    }

    fn level_transform(&self, level: usize) -> GeoTransform {
        let full = &self.ifds[0];
        let ifd = &self.ifds[level];
        self.geo_meta.geo_transform.scaled(
            full.width as f64 / ifd.width as f64,
            full.height as f64 / ifd.height as f64,
        )
    }

    /// Fetch and decode every tile of the mapping not already cached.
    async fn load_tiles(&self, level: usize, ifd: &IfdInfo, mapping: &TileMapping) -> Result<()> {
        let mut missing = Vec::new();
        for tile in &mapping.tiles {
            let (Some(&offset), Some(&length)) = (
                ifd.tile_offsets.get(tile.tile_idx),
                ifd.tile_byte_counts.get(tile.tile_idx),
            ) else {
                return Err(CloudError::InvalidTiff {
                    reason: format!(
                        "tile {} missing from a table of {}",
                        tile.tile_idx,
                        ifd.tile_offsets.len()
                    ),
                });
            };
            let key = TileKey {
                level,
                tile_idx: tile.tile_idx,
            };
            // sparse tiles (length 0) stay at the fill value
            if length > 0 && self.cache.get(&key).is_none() {
                missing.push((key, offset, length));
            }
        }

        debug!(
            "{}: {} tiles in window, {} to fetch",
            self.source.location(),
            mapping.tiles.len(),
            missing.len()
        );

        for batch in missing.chunks(self.options.max_concurrent_fetches.max(1)) {
            let ranges: Vec<(u64, u64)> = batch.iter().map(|&(_, o, l)| (o, l)).collect();
            let fetched = self.source.fetch_many(&ranges).await?;

            for (&(key, _, _), compressed) in batch.iter().zip(fetched) {
                let mut raw = decompress::decompress_tile(&compressed, ifd.compression, ifd.tile_bytes())?;
                decompress::undo_predictor(
                    &mut raw,
                    ifd.predictor,
                    ifd.bits_per_sample,
                    ifd.sample_format,
                    ifd.tile_width as usize,
                    self.byte_order,
                )?;
                self.cache.insert(key, Arc::new(raw));
            }
        }
        Ok(())
    }

    /// Copy the window's pixels out of the cached tiles.
    fn assemble<T: RasterElement>(&self, level: usize, ifd: &IfdInfo, mapping: &TileMapping) -> Result<Array2<T>> {
        let (tw, th) = (ifd.tile_width as usize, ifd.tile_height as usize);
        let (min_col, min_row, max_col, max_row) = mapping.pixel_window;
        let mut out = Array2::from_elem(mapping.output_shape, T::fill_value());

        for tile in &mapping.tiles {
            let key = TileKey {
                level,
                tile_idx: tile.tile_idx,
            };
            let Some(raw) = self.cache.get(&key) else {
                continue;
            };
            let values: Vec<T> =
                decompress::bytes_to_typed(&raw, ifd.bits_per_sample, ifd.sample_format, self.byte_order)?;

            let (tile_col0, tile_row0) = (tile.tile_col * tw, tile.tile_row * th);
            let rows = tile_row0.max(min_row)..(tile_row0 + th).min(max_row);
            let cols = tile_col0.max(min_col)..(tile_col0 + tw).min(max_col);

            for img_row in rows {
                for img_col in cols.clone() {
                    let local = (img_row - tile_row0) * tw + (img_col - tile_col0);
                    if let Some(&v) = values.get(local) {
                        out[(img_row - min_row, img_col - min_col)] = v;
                    }
                }
            }
        }
        Ok(out)
    }
}

/// Structure of one IFD from its tag values.
fn ifd_info(values: &TagValues) -> Result<IfdInfo> {
    let required = |tag: u16, name: &str| {
        values.u64(tag).ok_or_else(|| CloudError::InvalidTiff {
            reason: format!("missing {name} tag"),
        })
    };

    if !values.contains(tags::TILE_WIDTH) || !values.contains(tags::TILE_OFFSETS) {
        return Err(CloudError::UnsupportedLayout(
            "striped TIFF (COGs must be tiled)".into(),
        ));
    }

    Ok(IfdInfo {
        width: required(tags::IMAGE_WIDTH, "ImageWidth")? as u32,
        height: required(tags::IMAGE_LENGTH, "ImageLength")? as u32,
        tile_width: required(tags::TILE_WIDTH, "TileWidth")? as u32,
        tile_height: required(tags::TILE_LENGTH, "TileLength")? as u32,
        tile_offsets: values.u64s(tags::TILE_OFFSETS).unwrap_or_default(),
        tile_byte_counts: values.u64s(tags::TILE_BYTE_COUNTS).unwrap_or_default(),
        bits_per_sample: values.u64(tags::BITS_PER_SAMPLE).unwrap_or(1) as u16,
        sample_format: values.u64(tags::SAMPLE_FORMAT).unwrap_or(1) as u16,
        compression: values.u64(tags::COMPRESSION).unwrap_or(1) as u16,
        predictor: values.u64(tags::PREDICTOR).unwrap_or(1) as u16,
        samples_per_pixel: values.u64(tags::SAMPLES_PER_PIXEL).unwrap_or(1) as u16,
    })
}

/// Reads byte ranges, served from the prefetched head of the file when
/// it covers them.
struct ByteWindow<'a, S> {
    source: &'a S,
    prefetch: &'a [u8],
}

impl<S: RangeSource> ByteWindow<'_, S> {
    async fn read(&self, offset: u64, length: u64) -> Result<Vec<u8>> {
        let end = offset.saturating_add(length);
        if end <= self.prefetch.len() as u64 {
            return Ok(self.prefetch[offset as usize..end as usize].to_vec());
        }
        let data = self.source.fetch(offset, length).await?;
        if (data.len() as u64) < length {
            return Err(CloudError::InvalidTiff {
                reason: format!("{} ends before byte {end}", self.source.location()),
            });
        }
        Ok(data)
    }
}
