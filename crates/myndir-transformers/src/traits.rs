//! The capability interface the masked decoding core drives.

use std::any::Any;

use anyhow::Result;
use ndarray::{Array3, ArrayView2, ArrayView3};

use crate::masked::error::DecodeConfigError;

/// Static facts about a masked-token transformer that the decoder needs
/// before it runs a single forward pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MaskedModelMetadata {
    /// Number of image codebook entries; valid image ids are `0..codebook_size`.
    pub codebook_size: usize,
    /// Size of the full output vocabulary (codebook, class tokens, mask token).
    pub vocab_size: usize,
    /// Number of image tokens in a grid.
    pub num_vq_tokens: usize,
    /// `Some(n)` when the model was trained with `n` class tokens at ids
    /// `codebook_size..codebook_size + n`.
    pub num_classes: Option<usize>,
    pub supports_cross_attention: bool,
}

impl MaskedModelMetadata {
    /// The reserved "not yet decided" id, always the last vocabulary entry.
    ///
    /// Only meaningful once [`validate`](Self::validate) has passed.
    pub fn mask_token_id(&self) -> u32 {
        self.vocab_size.saturating_sub(1) as u32
    }

    /// The vocabulary must hold the codebook, every class token and the mask
    /// token, in that order, and the grid must have at least one position.
    pub fn validate(&self) -> Result<(), DecodeConfigError> {
        if self.codebook_size == 0 || self.num_vq_tokens == 0 {
            return Err(DecodeConfigError::EmptyTokenSpace {
                codebook_size: self.codebook_size,
                num_vq_tokens: self.num_vq_tokens,
            });
        }
        let num_classes = self.num_classes.unwrap_or(0);
        if self.vocab_size < self.codebook_size + num_classes + 1 {
            return Err(DecodeConfigError::VocabTooSmall {
                vocab_size: self.vocab_size,
                codebook_size: self.codebook_size,
                num_classes,
            });
        }
        Ok(())
    }

    /// Vocabulary id of class `class_id`.
    pub fn class_token_id(&self, class_id: u32) -> u32 {
        self.codebook_size as u32 + class_id
    }
}

/// A bidirectional transformer over a token grid.
pub trait MaskedTokenModel: Send + Sync {
    fn metadata(&self) -> &MaskedModelMetadata;

    /// Raw logits over the full vocabulary.
    ///
    /// # Arguments
    /// * `input_ids` - `[batch, seq]`, may contain the mask token
    /// * `encoder_hidden_states` - `[batch, enc_len, enc_dim]` conditioning
    /// * `encoder_attention_mask` - `[batch, enc_len]`, `0.0` hides a position
    ///
    /// # Returns
    /// `[batch, seq, vocab_size]`
    fn forward(
        &self,
        input_ids: &ArrayView2<u32>,
        encoder_hidden_states: Option<&ArrayView3<f32>>,
        encoder_attention_mask: Option<&ArrayView2<f32>>,
    ) -> Result<Array3<f32>>;

    /// Downcasting support for variant-specific inspection.
    fn as_any(&self) -> &dyn Any;
}
