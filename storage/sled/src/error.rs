use offgrid_core::StorageError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SledStorageError {
    #[error("sled error: {0}")]
    Sled(#[from] sled::Error),
    #[error("stored value for {0} is not valid UTF-8")]
    InvalidUtf8(String),
    #[error("blocking task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl From<SledStorageError> for StorageError {
    fn from(err: SledStorageError) -> Self { StorageError::backend(err) }
}

pub fn sled_error(err: sled::Error) -> StorageError { SledStorageError::Sled(err).into() }
