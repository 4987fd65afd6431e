//! # ndvits cloud
//!
//! STAC search and Cloud Optimized GeoTIFF (COG) access over HTTP.
//!
//! Only the tiles covering a requested window are fetched, with HTTP Range
//! requests, an LRU cache of decoded tiles and concurrent fetches. Search
//! results come from any STAC API; Planetary Computer hrefs are signed with
//! per-collection SAS tokens.
//!
//! ## Features
//!
//! - `deflate` (default): DEFLATE decompression via `flate2`
//! - `lzw` (default): LZW decompression via `weezl`

pub mod auth;
pub mod cache;
pub mod cog_reader;
pub mod decompress;
pub mod error;
pub mod geotiff_keys;
pub mod ifd;
pub mod reproject;
pub mod source;
pub mod stac_client;
pub mod stac_models;
pub mod stac_reader;
pub mod tile_index;

pub use auth::{CloudAuth, NoAuth, SasToken, SubscriptionKey};
pub use cog_reader::{CogLevel, CogMetadata, CogReader, CogReaderOptions};
pub use error::{CloudError, Result};
pub use reproject::reproject_bbox;
pub use source::{HttpSource, MemorySource, RangeSource};
pub use stac_client::{StacCatalog, StacClient, StacClientOptions};
pub use stac_models::{StacAsset, StacItem, StacItemCollection, StacSearchParams};
pub use stac_reader::{read_lonlat_window, read_stac_asset};
pub use tile_index::BBox;
