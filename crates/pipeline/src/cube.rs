//! Scene cube: red and NIR reflectance per acquisition over the AOI.

use chrono::{DateTime, Utc};
use ndvits_algorithms::imagery::apply_scale_factors;
use ndvits_cloud::{read_stac_asset, BBox, CloudError, StacItem};
use ndvits_core::Raster;
use tracing::{debug, warn};

use crate::aoi::Aoi;
use crate::error::{PipelineError, Result};
use crate::session::ImagerySession;

/// STAC common name of the red surface reflectance asset.
pub const RED_ASSET: &str = "red";
/// STAC common name of the near-infrared surface reflectance asset.
pub const NIR_ASSET: &str = "nir08";
/// Ground resolution read by default, metres.
pub const DEFAULT_SCALE: f64 = 30.0;

/// Reflectance bands of one acquisition, on the same grid.
#[derive(Debug, Clone)]
pub struct SceneFrame {
    pub datetime: DateTime<Utc>,
    pub item_id: String,
    pub red: Raster<f64>,
    pub nir: Raster<f64>,
}

/// Frames of one product, ordered by datetime.
#[derive(Debug, Clone, Default)]
pub struct SceneCube {
    frames: Vec<SceneFrame>,
    skipped: Vec<String>,
}

impl SceneCube {
    /// Build from frames in any order.
    pub fn new(mut frames: Vec<SceneFrame>) -> Self {
        frames.sort_by_key(|f| f.datetime);
        Self {
            frames,
            skipped: Vec::new(),
        }
    }

    pub fn frames(&self) -> &[SceneFrame] {
        &self.frames
    }

    /// Ids of items left out (missing assets, window outside the raster).
    pub fn skipped(&self) -> &[String] {
        &self.skipped
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}

/// Read red and NIR for every item over the AOI bounds at `scale` metres.
///
/// `on_item` is called once per item, after it was read or skipped.
pub async fn load_scene_cube(
    session: &ImagerySession,
    items: &[StacItem],
    aoi: &Aoi,
    scale: f64,
    mut on_item: impl FnMut(&StacItem),
) -> Result<SceneCube> {
    let bounds = aoi.bounds();
    let mut frames = Vec::with_capacity(items.len());
    let mut skipped = Vec::new();

    for item in items {
        match load_frame(session, item, &bounds, scale).await {
            Ok(Some(frame)) => frames.push(frame),
            Ok(None) => skipped.push(item.id.clone()),
            Err(PipelineError::ItemRead { item: id, source }) if is_skippable(&source) => {
                warn!("skipping {id}: {source}");
                skipped.push(id);
            }
            Err(e) => return Err(e),
        }
        on_item(item);
    }

    let mut cube = SceneCube::new(frames);
    cube.skipped = skipped;
    Ok(cube)
}

async fn load_frame(
    session: &ImagerySession,
    item: &StacItem,
    bounds: &BBox,
    scale: f64,
) -> Result<Option<SceneFrame>> {
    let Some(datetime) = item.datetime() else {
        warn!("skipping {}: no acquisition datetime", item.id);
        return Ok(None);
    };

    let client = session.client();
    let options = session.cog_options();
    let (red, nir) = futures::try_join!(
        read_stac_asset::<f64>(client, item, RED_ASSET, bounds, Some(scale), options.clone()),
        read_stac_asset::<f64>(client, item, NIR_ASSET, bounds, Some(scale), options.clone()),
    )
    .map_err(|source| PipelineError::ItemRead {
        item: item.id.clone(),
        source,
    })?;

    if red.shape() != nir.shape() {
        warn!(
            "skipping {}: red {:?} and nir {:?} windows differ",
            item.id,
            red.shape(),
            nir.shape()
        );
        return Ok(None);
    }
    debug!("{} {}: {:?} cells", item.id, datetime, red.shape());

    Ok(Some(SceneFrame {
        datetime,
        item_id: item.id.clone(),
        red: apply_scale_factors(RED_ASSET, &red)?,
        nir: apply_scale_factors(NIR_ASSET, &nir)?,
    }))
}

fn is_skippable(err: &CloudError) -> bool {
    matches!(err, CloudError::MissingAsset { .. } | CloudError::BBoxOutside)
}
