//! Top-level error type for the facade.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum WardenError {
    #[error(transparent)]
    Config(#[from] warden_config::ConfigError),

    #[error(transparent)]
    Storage(#[from] warden_storage::StorageError),

    #[error(transparent)]
    Engine(#[from] warden_engine::EngineError),
}

pub type Result<T> = std::result::Result<T, WardenError>;
