//! Error types for the NDVI pipeline.

use ndvits_cloud::CloudError;
use thiserror::Error;

/// Errors raised while building queries or extracting a time series.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("invalid area of interest: {0}")]
    InvalidAoi(String),

    #[error("invalid product identifier '{0}' (expected LANDSAT/<LT05|LE07|LC08|LC09>/C02/<T1|T2>_L2)")]
    InvalidProductId(String),

    #[error("invalid date range for '{product}': {reason}")]
    InvalidDateRange { product: String, reason: String },

    #[error("failed to read item '{item}': {source}")]
    ItemRead {
        item: String,
        #[source]
        source: CloudError,
    },

    #[error(transparent)]
    Cloud(#[from] CloudError),

    #[error(transparent)]
    Core(#[from] ndvits_core::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result alias for pipeline operations.
pub type Result<T> = std::result::Result<T, PipelineError>;
