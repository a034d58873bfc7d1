//! Borrowed conditioning inputs for one generation call.

use ndarray::{ArrayView2, ArrayView3};

use super::error::DecodeConfigError;
use crate::traits::MaskedModelMetadata;

/// Everything the logit model is conditioned on. Immutable for the whole
/// call; the caller keeps ownership of the tensors.
#[derive(Debug, Clone, Default)]
pub struct ConditioningState<'a> {
    /// `[batch, enc_len, enc_dim]` prompt embeddings.
    pub encoder_hidden_states: Option<ArrayView3<'a, f32>>,
    /// Explicit unconditional embeddings used in place of zeros for guidance.
    pub negative_hidden_states: Option<ArrayView3<'a, f32>>,
    /// `[batch, enc_len]` key mask for `encoder_hidden_states`.
    pub encoder_attention_mask: Option<ArrayView2<'a, f32>>,
    /// `[batch, neg_len]` key mask for `negative_hidden_states`.
    pub negative_attention_mask: Option<ArrayView2<'a, f32>>,
    /// Class labels in `0..num_classes`, one per batch row.
    pub class_ids: Option<&'a [u32]>,
}

impl<'a> ConditioningState<'a> {
    pub fn text(encoder_hidden_states: ArrayView3<'a, f32>) -> Self {
        Self {
            encoder_hidden_states: Some(encoder_hidden_states),
            ..Default::default()
        }
    }

    pub fn classes(class_ids: &'a [u32]) -> Self {
        Self {
            class_ids: Some(class_ids),
            ..Default::default()
        }
    }

    pub fn with_negative(mut self, negative_hidden_states: ArrayView3<'a, f32>) -> Self {
        self.negative_hidden_states = Some(negative_hidden_states);
        self
    }

    pub fn with_attention_mask(mut self, mask: ArrayView2<'a, f32>) -> Self {
        self.encoder_attention_mask = Some(mask);
        self
    }

    pub fn with_negative_attention_mask(mut self, mask: ArrayView2<'a, f32>) -> Self {
        self.negative_attention_mask = Some(mask);
        self
    }

    pub fn is_class_conditioned(&self) -> bool {
        self.class_ids.is_some()
    }

    pub fn has_negative(&self) -> bool {
        self.negative_hidden_states.is_some()
    }

    /// Checks the conditioning against the model and returns the batch size.
    pub fn validate(&self, meta: &MaskedModelMetadata) -> Result<usize, DecodeConfigError> {
        match (&self.encoder_hidden_states, self.class_ids) {
            (None, None) => Err(DecodeConfigError::NoConditioning),
            (Some(_), Some(_)) => Err(DecodeConfigError::ConflictingConditioning),
            (None, Some(class_ids)) => {
                let num_classes = meta
                    .num_classes
                    .ok_or(DecodeConfigError::ClassConditioningUnsupported)?;
                if meta.supports_cross_attention {
                    return Err(DecodeConfigError::MissingEncoderStates);
                }
                if let Some(&class_id) = class_ids.iter().find(|&&c| c as usize >= num_classes) {
                    return Err(DecodeConfigError::ClassIdOutOfRange {
                        class_id,
                        num_classes,
                    });
                }
                if self.negative_hidden_states.is_some() || self.encoder_attention_mask.is_some() {
                    return Err(DecodeConfigError::ConflictingConditioning);
                }
                Ok(class_ids.len())
            }
            (Some(states), None) => {
                if !meta.supports_cross_attention {
                    return Err(DecodeConfigError::CrossAttentionUnsupported);
                }
                let (batch, enc_len, dim) = states.dim();
                check_mask("encoder attention mask", self.encoder_attention_mask.as_ref(), batch, enc_len)?;

                if let Some(negative) = &self.negative_hidden_states {
                    let (neg_batch, neg_len, neg_dim) = negative.dim();
                    if neg_batch != batch || neg_dim != dim {
                        return Err(DecodeConfigError::ShapeMismatch {
                            what: "negative hidden states",
                            expected: vec![batch, neg_len, dim],
                            actual: vec![neg_batch, neg_len, neg_dim],
                        });
                    }
                    check_mask("negative attention mask", self.negative_attention_mask.as_ref(), batch, neg_len)?;
                } else if let Some(mask) = &self.negative_attention_mask {
                    // A mask with nothing to mask.
                    return Err(DecodeConfigError::ShapeMismatch {
                        what: "negative attention mask",
                        expected: vec![],
                        actual: mask.shape().to_vec(),
                    });
                }
                Ok(batch)
            }
        }
    }
}

fn check_mask(
    what: &'static str,
    mask: Option<&ArrayView2<'_, f32>>,
    batch: usize,
    len: usize,
) -> Result<(), DecodeConfigError> {
    match mask {
        Some(m) if m.dim() != (batch, len) => Err(DecodeConfigError::ShapeMismatch {
            what,
            expected: vec![batch, len],
            actual: m.shape().to_vec(),
        }),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{Array2, Array3};

    fn text_meta() -> MaskedModelMetadata {
        MaskedModelMetadata {
            codebook_size: 8,
            vocab_size: 9,
            num_vq_tokens: 4,
            num_classes: None,
            supports_cross_attention: true,
        }
    }

    fn class_meta() -> MaskedModelMetadata {
        MaskedModelMetadata {
            codebook_size: 8,
            vocab_size: 12,
            num_vq_tokens: 4,
            num_classes: Some(3),
            supports_cross_attention: false,
        }
    }

    #[test]
    fn test_text_batch_size() {
        let states = Array3::<f32>::zeros((3, 5, 2));
        let cond = ConditioningState::text(states.view());
        assert_eq!(cond.validate(&text_meta()), Ok(3));
    }

    #[test]
    fn test_no_and_both_conditioning() {
        assert_eq!(
            ConditioningState::default().validate(&text_meta()),
            Err(DecodeConfigError::NoConditioning)
        );

        let states = Array3::<f32>::zeros((1, 5, 2));
        let ids = [0u32];
        let mut cond = ConditioningState::text(states.view());
        cond.class_ids = Some(&ids);
        assert_eq!(cond.validate(&text_meta()), Err(DecodeConfigError::ConflictingConditioning));
    }

    #[test]
    fn test_capability_errors() {
        let states = Array3::<f32>::zeros((1, 5, 2));
        assert_eq!(
            ConditioningState::text(states.view()).validate(&class_meta()),
            Err(DecodeConfigError::CrossAttentionUnsupported)
        );

        let ids = [1u32];
        assert_eq!(
            ConditioningState::classes(&ids).validate(&text_meta()),
            Err(DecodeConfigError::ClassConditioningUnsupported)
        );
        assert_eq!(ConditioningState::classes(&ids).validate(&class_meta()), Ok(1));

        let bad = [0u32, 3];
        assert_eq!(
            ConditioningState::classes(&bad).validate(&class_meta()),
            Err(DecodeConfigError::ClassIdOutOfRange {
                class_id: 3,
                num_classes: 3
            })
        );
    }

    #[test]
    fn test_negative_and_mask_shapes() {
        let states = Array3::<f32>::zeros((2, 5, 4));
        let negative = Array3::<f32>::zeros((1, 5, 4));
        let cond = ConditioningState::text(states.view()).with_negative(negative.view());
        assert!(matches!(
            cond.validate(&text_meta()),
            Err(DecodeConfigError::ShapeMismatch { what: "negative hidden states", .. })
        ));

        let mask = Array2::<f32>::ones((2, 4));
        let cond = ConditioningState::text(states.view()).with_attention_mask(mask.view());
        assert!(matches!(
            cond.validate(&text_meta()),
            Err(DecodeConfigError::ShapeMismatch { what: "encoder attention mask", .. })
        ));

        let negative = Array3::<f32>::zeros((2, 7, 4));
        let neg_mask = Array2::<f32>::ones((2, 7));
        let cond = ConditioningState::text(states.view())
            .with_negative(negative.view())
            .with_negative_attention_mask(neg_mask.view());
        assert_eq!(cond.validate(&text_meta()), Ok(2));
    }
}
