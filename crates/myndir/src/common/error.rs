//! Common error types for myndir.

use myndir_transformers::{CancellationError, DecodeConfigError};
use thiserror::Error;

/// Errors that can occur when generating images.
#[derive(Debug, Error)]
pub enum MyndirError {
    /// Invalid pipeline or generation configuration.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// The request's conditioning does not fit the model.
    #[error("Invalid request: {0}")]
    InvalidRequest(#[from] DecodeConfigError),

    /// Transformer config names a class no builder is registered for.
    #[error("Unknown transformer: {0}")]
    UnknownTransformer(String),

    /// Failed to build the transformer from config and weights.
    #[error("Failed to load transformer '{model}': {source}")]
    LoadFailed {
        model: String,
        #[source]
        source: anyhow::Error,
    },

    /// The text encoder failed.
    #[error("Text encoding failed: {0}")]
    EncodingFailed(#[source] anyhow::Error),

    /// The visual codec could not turn tokens into pixels.
    #[error("Image decoding failed: {0}")]
    DecodeFailed(#[source] anyhow::Error),

    /// Generation stopped between rounds.
    #[error("Generation cancelled: {0}")]
    Cancelled(#[from] CancellationError),

    /// Token generation failed.
    #[error("Generation failed: {0}")]
    GenerationFailed(#[from] anyhow::Error),
}

/// Result type for myndir operations.
pub type MyndirResult<T> = Result<T, MyndirError>;

impl MyndirError {
    /// Recovers typed decoder errors that travelled through `anyhow`.
    pub(crate) fn from_decode(err: anyhow::Error) -> Self {
        if let Some(cancel) = err.downcast_ref::<CancellationError>() {
            return MyndirError::Cancelled(*cancel);
        }
        match err.downcast::<DecodeConfigError>() {
            Ok(config) => MyndirError::InvalidRequest(config),
            Err(other) => MyndirError::GenerationFailed(other),
        }
    }
}
