pub mod archive;
pub mod kaggle;

use std::path::PathBuf;

pub use kaggle::{DatasetId, KaggleDatasetSource};

/// Failures while obtaining the raw dataset.
#[derive(thiserror::Error, Debug)]
pub enum DatasetError {
    #[error("dataset API unreachable at {url}: {reason}")]
    Unreachable { url: String, reason: String },
    #[error("dataset API rejected the credentials (HTTP {status})")]
    Unauthorized { status: u16 },
    #[error("dataset '{0}' not found")]
    NotFound(String),
    #[error("dataset API returned HTTP {status}: {message}")]
    Status { status: u16, message: String },
    #[error("invalid dataset archive: {0}")]
    Archive(String),
    #[error("filesystem error: {0}")]
    Io(#[from] std::io::Error),
    #[error("missing dataset API credentials: set KAGGLE_USERNAME and KAGGLE_KEY")]
    MissingCredentials,
    #[error("invalid dataset id '{0}': expected owner/slug")]
    InvalidDatasetId(String),
    #[error("failed to build HTTP client: {0}")]
    Client(String),
    #[error("raw dataset file not found at {}", .0.display())]
    MissingRawFile(PathBuf),
}
