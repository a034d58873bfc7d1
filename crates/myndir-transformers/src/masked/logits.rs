//! Codebook logit model: wraps a [`MaskedTokenModel`] forward pass with
//! class-token handling, guidance and codebook truncation.

use std::sync::Arc;

use anyhow::{anyhow, Result};
use ndarray::{concatenate, s, Array2, Array3, ArrayView2, ArrayView3, Axis};

use super::conditioning::ConditioningState;
use super::guidance;
use crate::traits::{MaskedModelMetadata, MaskedTokenModel};

/// Which forward passes a round needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuidanceMode {
    /// One pass with the prompt embeddings.
    Conditional,
    /// One pass with the negative embeddings (scale 0 with an explicit negative).
    Unconditional,
    /// Conditional and unconditional passes mixed by the guidance scale.
    /// `explicit_negative` is false when the unconditional pass uses zeros.
    Guided { explicit_negative: bool },
    /// One pass with a class token prepended to the grid.
    ClassToken,
}

impl GuidanceMode {
    pub fn resolve(conditioning: &ConditioningState<'_>, guidance_scale: f32) -> Self {
        if conditioning.is_class_conditioned() {
            return GuidanceMode::ClassToken;
        }
        match (guidance_scale > 0.0, conditioning.has_negative()) {
            (true, explicit_negative) => GuidanceMode::Guided { explicit_negative },
            (false, true) => GuidanceMode::Unconditional,
            (false, false) => GuidanceMode::Conditional,
        }
    }

    pub fn forward_passes(&self) -> usize {
        match self {
            GuidanceMode::Guided { .. } => 2,
            _ => 1,
        }
    }
}

#[derive(Clone)]
pub struct CodebookLogitModel {
    model: Arc<dyn MaskedTokenModel>,
}

impl CodebookLogitModel {
    pub fn new(model: Arc<dyn MaskedTokenModel>) -> Self {
        Self { model }
    }

    pub fn metadata(&self) -> &MaskedModelMetadata {
        self.model.metadata()
    }

    pub fn model(&self) -> &Arc<dyn MaskedTokenModel> {
        &self.model
    }

    /// Per-position logits over the image codebook.
    ///
    /// # Arguments
    /// * `token_ids` - `[batch, num_vq_tokens]` grid, mask token allowed
    /// * `conditioning` - already validated against this model
    ///
    /// # Returns
    /// `[batch, num_vq_tokens, codebook_size]`; class-token position and
    /// non-codebook vocabulary are removed.
    pub fn compute_logits(
        &self,
        token_ids: &ArrayView2<u32>,
        conditioning: &ConditioningState<'_>,
        guidance_scale: f32,
    ) -> Result<Array3<f32>> {
        let mode = GuidanceMode::resolve(conditioning, guidance_scale);
        let (batch, seq) = token_ids.dim();

        let logits = match mode {
            GuidanceMode::ClassToken => {
                let class_ids = conditioning
                    .class_ids
                    .ok_or_else(|| anyhow!("class-token mode without class ids"))?;
                let input = self.prepend_class_tokens(token_ids, class_ids)?;
                let raw = self.model.forward(&input.view(), None, None)?;
                self.truncate(raw, batch, seq + 1)?
                    .slice(s![.., 1.., ..])
                    .to_owned()
            }
            GuidanceMode::Conditional => {
                let states = required(conditioning.encoder_hidden_states.as_ref())?;
                let raw = self.model.forward(
                    token_ids,
                    Some(states),
                    conditioning.encoder_attention_mask.as_ref(),
                )?;
                self.truncate(raw, batch, seq)?
            }
            GuidanceMode::Unconditional => {
                let negative = required(conditioning.negative_hidden_states.as_ref())?;
                let raw = self.model.forward(
                    token_ids,
                    Some(negative),
                    conditioning.negative_attention_mask.as_ref(),
                )?;
                self.truncate(raw, batch, seq)?
            }
            GuidanceMode::Guided { explicit_negative } => {
                let states = required(conditioning.encoder_hidden_states.as_ref())?;
                let zeros;
                let (uncond_states, uncond_mask) = if explicit_negative {
                    (
                        required(conditioning.negative_hidden_states.as_ref())?.view(),
                        conditioning.negative_attention_mask.as_ref(),
                    )
                } else {
                    zeros = Array3::<f32>::zeros(states.raw_dim());
                    (zeros.view(), conditioning.encoder_attention_mask.as_ref())
                };

                // The two passes are independent; run them side by side.
                let (cond, uncond) = rayon::join(
                    || {
                        self.model.forward(
                            token_ids,
                            Some(states),
                            conditioning.encoder_attention_mask.as_ref(),
                        )
                    },
                    || self.model.forward(token_ids, Some(&uncond_states), uncond_mask),
                );
                let cond = self.truncate(cond?, batch, seq)?;
                let uncond = self.truncate(uncond?, batch, seq)?;
                guidance::mix(&cond, &uncond, guidance_scale)?
            }
        };
        Ok(logits)
    }

    /// `[batch, seq] -> [batch, 1 + seq]` with `codebook_size + class_id` in front.
    fn prepend_class_tokens(&self, token_ids: &ArrayView2<u32>, class_ids: &[u32]) -> Result<Array2<u32>> {
        let batch = token_ids.nrows();
        if class_ids.len() != batch {
            return Err(anyhow!(
                "{} class ids for a batch of {}",
                class_ids.len(),
                batch
            ));
        }
        let meta = self.model.metadata();
        let class_column = Array2::from_shape_fn((batch, 1), |(b, _)| meta.class_token_id(class_ids[b]));
        Ok(concatenate(Axis(1), &[class_column.view(), token_ids.view()])?)
    }

    /// Checks the forward output and keeps the first `codebook_size` channels.
    fn truncate(&self, raw: Array3<f32>, batch: usize, seq: usize) -> Result<Array3<f32>> {
        let codebook = self.model.metadata().codebook_size;
        let (b, s_len, v) = raw.dim();
        if b != batch || s_len != seq || v < codebook {
            return Err(anyhow!(
                "model returned logits of shape {:?}, expected [{}, {}, >= {}]",
                raw.shape(),
                batch,
                seq,
                codebook
            ));
        }
        if v == codebook {
            return Ok(raw);
        }
        Ok(raw.slice(s![.., .., ..codebook]).to_owned())
    }
}

fn required<'v, 'a>(states: Option<&'v ArrayView3<'a, f32>>) -> Result<&'v ArrayView3<'a, f32>> {
    states.ok_or_else(|| anyhow!("conditioning is missing the embeddings this guidance mode needs"))
}
