mod engine;
mod error;

pub use engine::SledStorage;
pub use error::SledStorageError;
