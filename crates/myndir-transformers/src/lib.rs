//! Myndir Transformers: building blocks for masked-token image transformers
//!
//! This crate provides the numeric layers (attention, gated feed-forward,
//! normalization, embeddings) and the iterative parallel decoding core that
//! turns a masked-token model into a token-grid generator.

pub mod activations;
pub mod attention;
pub mod common;
pub mod embeddings;
pub mod feedforward;
pub mod linear_layer;
pub mod masked;
pub mod normalization;
pub mod traits;
pub mod utils;
pub mod weights;

// Re-export commonly used items
pub use crate::{
    attention::MultiHeadAttention,
    common::{
        CancellationError, CancellationHandle, CancellationToken, DecodePolicy, LogitFilter,
        MaskedGenerationConfig,
    },
    embeddings::Embeddings,
    feedforward::GatedFeedForward,
    linear_layer::LinearLayer,
    masked::{
        CodebookLogitModel, ConditioningState, DecodeConfigError, DecodeOutput, GuidanceMode,
        MaskSchedule, MaskedDecoder, RoundTrace,
    },
    normalization::{NormType, Normalization},
    traits::{MaskedModelMetadata, MaskedTokenModel},
    weights::ModelWeights,
};

pub mod prelude {
    pub use crate::common::{DecodePolicy, MaskedGenerationConfig};
    pub use crate::masked::{ConditioningState, MaskedDecoder};
    pub use crate::traits::MaskedTokenModel;
}
