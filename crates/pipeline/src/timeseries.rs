//! NDVI time series: query, cube, per-frame NDVI, spatial mean.

use chrono::{DateTime, Utc};
use ndvits_algorithms::imagery::ndvi;
use ndvits_algorithms::statistics::spatial_mean;
use serde::Serialize;
use tracing::{info, warn};

use crate::aoi::Aoi;
use crate::cube::{load_scene_cube, SceneCube, DEFAULT_SCALE};
use crate::error::Result;
use crate::product::ProductQuery;
use crate::query::{search, QueryOptions};
use crate::session::ImagerySession;

/// Mean NDVI of one acquisition.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NdviSample {
    pub datetime: DateTime<Utc>,
    pub item_id: String,
    /// NaN (`null` in JSON) when no cell was valid
    pub mean_ndvi: f64,
    pub valid_pixels: usize,
}

/// Time series of one product.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NdviSeries {
    pub product: String,
    pub samples: Vec<NdviSample>,
}

impl NdviSeries {
    pub fn new(product: impl Into<String>, mut samples: Vec<NdviSample>) -> Self {
        samples.sort_by_key(|s| s.datetime);
        Self {
            product: product.into(),
            samples,
        }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// `(datetime, mean)` pairs with a finite mean.
    pub fn finite_points(&self) -> impl Iterator<Item = (DateTime<Utc>, f64)> + '_ {
        self.samples
            .iter()
            .filter(|s| s.mean_ndvi.is_finite())
            .map(|s| (s.datetime, s.mean_ndvi))
    }

    /// Min and max of the finite means.
    pub fn value_range(&self) -> Option<(f64, f64)> {
        self.finite_points().fold(None, |acc, (_, v)| match acc {
            None => Some((v, v)),
            Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
        })
    }

    /// First and last sample time.
    pub fn time_range(&self) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
        Some((self.samples.first()?.datetime, self.samples.last()?.datetime))
    }
}

/// Options for [`extract_ndvi_timeseries`].
#[derive(Debug, Clone, Copy)]
pub struct ExtractOptions {
    /// Ground resolution in metres.
    pub scale: f64,
    pub query: QueryOptions,
}

impl Default for ExtractOptions {
    fn default() -> Self {
        Self {
            scale: DEFAULT_SCALE,
            query: QueryOptions::default(),
        }
    }
}

/// Callbacks fired while a series is extracted.
pub trait ExtractProgress: Sync {
    /// Search finished with `count` items to read.
    fn items_found(&self, _count: usize) {}
    /// One item was read or skipped.
    fn item_done(&self, _item_id: &str) {}
}

impl ExtractProgress for () {}

/// Reduce each frame of `cube` to its spatial-mean NDVI.
pub fn reduce_cube(product: &str, cube: &SceneCube) -> Result<NdviSeries> {
    let mut samples = Vec::with_capacity(cube.len());
    for frame in cube.frames() {
        let index = ndvi(&frame.nir, &frame.red)?;
        let mean = spatial_mean(&index);
        if !mean.is_valid() {
            warn!("{}: no valid NDVI cell over the AOI", frame.item_id);
        }
        samples.push(NdviSample {
            datetime: frame.datetime,
            item_id: frame.item_id.clone(),
            mean_ndvi: mean.mean,
            valid_pixels: mean.valid_pixels,
        });
    }
    Ok(NdviSeries::new(product, samples))
}

/// Mean NDVI per acquisition of `product` over `aoi`.
pub async fn extract_ndvi_timeseries(
    session: &ImagerySession,
    aoi: &Aoi,
    product: &ProductQuery,
    options: &ExtractOptions,
    progress: &dyn ExtractProgress,
) -> Result<NdviSeries> {
    let items = search(session, product, aoi, &options.query).await?;
    progress.items_found(items.len());

    let cube = load_scene_cube(session, &items, aoi, options.scale, |item| {
        progress.item_done(&item.id)
    })
    .await?;

    let series = reduce_cube(&product.name, &cube)?;
    info!(
        "{}: {} samples, {} skipped",
        product.name,
        series.len(),
        cube.skipped().len()
    );
    Ok(series)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cube::SceneFrame;
    use approx::assert_relative_eq;
    use ndvits_core::Raster;

    fn sample(datetime: &str, mean: f64) -> NdviSample {
        NdviSample {
            datetime: datetime.parse().unwrap(),
            item_id: datetime.to_string(),
            mean_ndvi: mean,
            valid_pixels: if mean.is_nan() { 0 } else { 100 },
        }
    }

    #[test]
    fn reduce_frames_to_means() {
        let mut red = Raster::filled(2, 2, 0.1);
        red.set(0, 0, f64::NAN).unwrap();
        let cube = SceneCube::new(vec![
            SceneFrame {
                datetime: "2023-08-11T16:50:00Z".parse().unwrap(),
                item_id: "second".into(),
                red: Raster::filled(2, 2, 0.2),
                nir: Raster::filled(2, 2, 0.2),
            },
            SceneFrame {
                datetime: "2023-07-10T16:50:00Z".parse().unwrap(),
                item_id: "first".into(),
                red,
                nir: Raster::filled(2, 2, 0.5),
            },
        ]);

        let series = reduce_cube("LANDSAT 9 Tier 1", &cube).unwrap();
        assert_eq!(series.product, "LANDSAT 9 Tier 1");
        assert_eq!(series.len(), 2);
        assert_eq!(series.samples[0].item_id, "first");
        assert_relative_eq!(series.samples[0].mean_ndvi, 0.4 / 0.6, epsilon = 1e-12);
        assert_eq!(series.samples[0].valid_pixels, 3);
        assert_relative_eq!(series.samples[1].mean_ndvi, 0.0, epsilon = 1e-12);
    }

    #[test]
    fn empty_frame_gives_nan_sample() {
        let cube = SceneCube::new(vec![SceneFrame {
            datetime: "2023-07-10T16:50:00Z".parse().unwrap(),
            item_id: "cloud".into(),
            red: Raster::filled(2, 2, f64::NAN),
            nir: Raster::filled(2, 2, f64::NAN),
        }]);
        let series = reduce_cube("p", &cube).unwrap();
        assert!(series.samples[0].mean_ndvi.is_nan());
        assert_eq!(series.samples[0].valid_pixels, 0);
        assert_eq!(series.value_range(), None);
    }

    #[test]
    fn ranges_skip_nan() {
        let series = NdviSeries::new(
            "p",
            vec![
                sample("2023-09-01T00:00:00Z", 0.1),
                sample("2023-07-01T00:00:00Z", f64::NAN),
                sample("2023-08-01T00:00:00Z", 0.7),
            ],
        );
        assert_eq!(series.value_range(), Some((0.1, 0.7)));
        assert_eq!(series.finite_points().count(), 2);
        let (first, last) = series.time_range().unwrap();
        assert_eq!(first.to_rfc3339(), "2023-07-01T00:00:00+00:00");
        assert_eq!(last.to_rfc3339(), "2023-09-01T00:00:00+00:00");
    }

    #[test]
    fn nan_serializes_as_null() {
        let series = NdviSeries::new("p", vec![sample("2023-07-01T00:00:00Z", f64::NAN)]);
        let v = serde_json::to_value(&series).unwrap();
        assert!(v["samples"][0]["mean_ndvi"].is_null());
        assert_eq!(v["samples"][0]["datetime"], "2023-07-01T00:00:00Z");
    }
}
