//! Error types for the BEGAN trainer.

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while configuring, training or sampling.
#[derive(Debug, Error)]
pub enum BeganError {
    #[error("unsupported optimizer `{0}`: only adam is supported")]
    UnsupportedOptimizer(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("no images found in {}", .0.display())]
    EmptyDataset(PathBuf),

    #[error("tensor data conversion failed: {0}")]
    Data(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Image(#[from] image::ImageError),

    #[error(transparent)]
    Record(#[from] burn::record::RecorderError),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

/// Result alias used across the crate.
pub type Result<T> = std::result::Result<T, BeganError>;
