//! # ndvits pipeline
//!
//! Landsat NDVI time series over an area of interest:
//!
//! 1. [`session`]: connect to a STAC catalog (and get SAS tokens)
//! 2. [`aoi`] and [`product`]: what to look at and when
//! 3. [`query`]: search and filter items
//! 4. [`cube`]: read red/NIR windows, apply scale factors
//! 5. [`timeseries`]: NDVI and spatial mean per acquisition

pub mod aoi;
pub mod cube;
pub mod error;
pub mod product;
pub mod query;
pub mod session;
pub mod timeseries;

pub use aoi::Aoi;
pub use cube::{load_scene_cube, SceneCube, SceneFrame, DEFAULT_SCALE};
pub use error::{PipelineError, Result};
pub use product::{load_products, parse_products, Preset, ProductId, ProductQuery};
pub use query::{search, QueryOptions};
pub use session::{ImagerySession, SessionOptions};
pub use timeseries::{
    extract_ndvi_timeseries, reduce_cube, ExtractOptions, ExtractProgress, NdviSample, NdviSeries,
};
