use std::path::PathBuf;

use thiserror::Error;

/// Errors surfaced by the indexer and searcher core.
#[derive(Debug, Error)]
pub enum IndexError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("missing required file: {0}")]
    MissingFile(PathBuf),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Zip(#[from] zip::result::ZipError),

    #[error(transparent)]
    Csv(#[from] csv::Error),
}

pub type Result<T> = std::result::Result<T, IndexError>;
