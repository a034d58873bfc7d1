//! Precondition failures raised before any forward pass.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum DecodeConfigError {
    #[error("either encoder hidden states or class ids must be provided")]
    NoConditioning,

    #[error("encoder hidden states and class ids cannot be used together")]
    ConflictingConditioning,

    #[error("encoder hidden states were provided but the model has no cross-attention")]
    CrossAttentionUnsupported,

    #[error("the model uses cross-attention and requires encoder hidden states")]
    MissingEncoderStates,

    #[error("class ids were provided but the model was not trained with class tokens")]
    ClassConditioningUnsupported,

    #[error("class id {class_id} is out of range for {num_classes} classes")]
    ClassIdOutOfRange { class_id: u32, num_classes: usize },

    #[error(
        "vocabulary of {vocab_size} cannot hold {codebook_size} codebook ids, {num_classes} class tokens and the mask token"
    )]
    VocabTooSmall {
        vocab_size: usize,
        codebook_size: usize,
        num_classes: usize,
    },

    #[error("model reports {codebook_size} codebook entries and {num_vq_tokens} grid tokens; both must be at least 1")]
    EmptyTokenSpace {
        codebook_size: usize,
        num_vq_tokens: usize,
    },

    #[error("timesteps must be at least 1, got {0}")]
    InvalidTimesteps(usize),

    #[error("temperature must be finite and positive, got {0}")]
    InvalidTemperature(f32),

    #[error("guidance scale must be finite and non-negative, got {0}")]
    InvalidGuidanceScale(f32),

    #[error("logit filter threshold must lie in [0, 1], got {0}")]
    InvalidFilterThreshold(f32),

    #[error("{what} has batch size {actual}, expected {expected}")]
    BatchSizeMismatch {
        what: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("{what} has sequence length {actual}, expected {expected}")]
    SequenceLengthMismatch {
        what: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("token id {id} at position {position} is neither a codebook id nor the mask token")]
    InvalidTokenId { id: u32, position: usize },

    #[error("{what} has shape {actual:?}, expected {expected:?}")]
    ShapeMismatch {
        what: &'static str,
        expected: Vec<usize>,
        actual: Vec<usize>,
    },
}
