//! Error types for Spendwise Core.

use thiserror::Error;

use crate::config::ConfigError;
use crate::learning::PipelineError;
use crate::storage::StorageError;

/// Core error type for Spendwise operations.
#[derive(Error, Debug)]
pub enum SpendwiseError {
    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Storage-related errors
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// Learning run errors
    #[error("Learning error: {0}")]
    Learning(#[from] PipelineError),
}

/// Result type alias for Spendwise operations.
pub type Result<T> = std::result::Result<T, SpendwiseError>;
