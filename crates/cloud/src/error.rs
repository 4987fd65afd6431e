//! Error types for STAC search and COG reading.

use thiserror::Error;

/// Errors produced while searching catalogs or reading remote rasters.
#[derive(Error, Debug)]
pub enum CloudError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("server does not support Range requests for {url}")]
    RangeNotSupported { url: String },

    #[error("invalid TIFF: {reason}")]
    InvalidTiff { reason: String },

    #[error("unsupported compression: {0}")]
    UnsupportedCompression(u16),

    #[error("unsupported predictor {predictor} for {bps}-bit samples")]
    UnsupportedPredictor { predictor: u16, bps: u16 },

    #[error("unsupported data type: bits_per_sample={bps}, sample_format={sf}")]
    UnsupportedDataType { bps: u16, sf: u16 },

    #[error("unsupported layout: {0}")]
    UnsupportedLayout(String),

    #[error("authentication error: {0}")]
    Auth(String),

    #[error("network error: {0}")]
    Network(String),

    #[error("STAC error: {0}")]
    Stac(String),

    #[error("asset '{asset}' not found in item '{item}'")]
    MissingAsset { item: String, asset: String },

    #[error("no IFD entries found in TIFF")]
    NoIfd,

    #[error("bbox does not intersect raster extent")]
    BBoxOutside,

    #[error("decompression failed: {0}")]
    Decompress(String),

    #[error("core error: {0}")]
    Core(#[from] ndvits_core::Error),
}

/// Result alias for cloud operations.
pub type Result<T> = std::result::Result<T, CloudError>;
