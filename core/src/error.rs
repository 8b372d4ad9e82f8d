use thiserror::Error;

use crate::GridOffset;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExplorerError {
    #[error("Neither coordinates nor an offset were given")]
    MissingPosition,
    #[error("Grid offset {0} is outside the padded scene bounds")]
    OutOfBounds(GridOffset),
    #[error("Scene update was rejected: {0}")]
    Persistence(String),
    #[error("Scene dimensions are not available")]
    MissingSceneRect,
    #[error("Scene flags could not be read: {0}")]
    InvalidFlags(String),
    #[error("Could not load background image: {0}")]
    AssetLoad(String),
}

pub type Result<T> = core::result::Result<T, ExplorerError>;
