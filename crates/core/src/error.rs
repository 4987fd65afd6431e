//! Error types for raster handling

use thiserror::Error;

/// Errors raised by core raster operations
#[derive(Error, Debug)]
pub enum Error {
    #[error("invalid raster dimensions: {cols}x{rows} for {len} values")]
    InvalidDimensions { rows: usize, cols: usize, len: usize },

    #[error("index ({row}, {col}) out of bounds for raster of size ({rows}, {cols})")]
    IndexOutOfBounds {
        row: usize,
        col: usize,
        rows: usize,
        cols: usize,
    },

    #[error("raster size mismatch: expected ({er}, {ec}), got ({ar}, {ac})")]
    SizeMismatch { er: usize, ec: usize, ar: usize, ac: usize },

    #[error("{0}")]
    Other(String),
}

/// Result alias for core operations
pub type Result<T> = std::result::Result<T, Error>;
