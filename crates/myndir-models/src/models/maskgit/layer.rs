use anyhow::Result;
use myndir_transformers::attention::MultiHeadAttention;
use myndir_transformers::feedforward::GatedFeedForward;
use myndir_transformers::linear_layer::LinearLayer;
use myndir_transformers::normalization::{LayerNorm, NormType, Normalization};
use myndir_transformers::weights::ModelWeights;
use ndarray::{Array3, ArrayView2};

use super::config::MaskGitConfig;

/// Cross-attention sub-block over text encoder states.
#[derive(Debug, Clone)]
pub struct CrossAttentionBlock {
    pub norm: Normalization,
    pub attention: MultiHeadAttention,
    pub post_norm: Option<Normalization>,
}

/// One pre-LN transformer layer.
#[derive(Debug, Clone)]
pub struct MaskGitLayer {
    pub attn_layer_norm: Normalization,
    pub attention: MultiHeadAttention,
    pub post_attn_layer_norm: Option<Normalization>,
    pub cross: Option<CrossAttentionBlock>,
    pub ffn: GatedFeedForward,
}

impl MaskGitLayer {
    pub fn from_weights(weights: &ModelWeights, config: &MaskGitConfig, index: usize) -> Result<Self> {
        let p = format!("transformer_layers.{}", index);
        let eps = config.layer_norm_eps;
        let norm = |name: &str| Normalization::from_weights(weights, &format!("{}.{}", p, name), config.norm_type, eps);
        let normformer = |name: &str| -> Result<Option<Normalization>> {
            if config.use_normformer {
                norm(name).map(Some)
            } else {
                Ok(None)
            }
        };

        let cross = if config.add_cross_attention {
            Some(CrossAttentionBlock {
                norm: norm("crossattn_layer_norm")?,
                attention: MultiHeadAttention::from_weights(
                    weights,
                    &format!("{}.crossattention", p),
                    config.num_attention_heads,
                )?,
                post_norm: normformer("post_crossattn_layer_norm")?,
            })
        } else {
            None
        };

        // The pre-MLP norm is a LayerNorm even in RMSNorm checkpoints.
        let ffn_prefix = format!("{}.ffn", p);
        let ffn = GatedFeedForward::new(
            Normalization::LayerNorm(LayerNorm::from_weights(
                weights,
                &format!("{}.pre_mlp_layer_norm", ffn_prefix),
                eps,
            )?),
            LinearLayer::from_weights(weights, &format!("{}.wi_0", ffn_prefix))?,
            LinearLayer::from_weights(weights, &format!("{}.wi_1", ffn_prefix))?,
            if config.use_normformer {
                Some(Normalization::from_weights(
                    weights,
                    &format!("{}.mid_mlp_layer_norm", ffn_prefix),
                    config.norm_type,
                    eps,
                )?)
            } else {
                None
            },
            LinearLayer::from_weights(weights, &format!("{}.wo", ffn_prefix))?,
        )?;

        Ok(Self {
            attn_layer_norm: norm("attn_layer_norm")?,
            attention: MultiHeadAttention::from_weights(
                weights,
                &format!("{}.attention", p),
                config.num_attention_heads,
            )?,
            post_attn_layer_norm: normformer("post_attn_layer_norm")?,
            cross,
            ffn,
        })
    }

    pub fn forward(
        &self,
        hidden_states: Array3<f32>,
        encoder_hidden_states: Option<&Array3<f32>>,
        encoder_attention_mask: Option<&ArrayView2<f32>>,
    ) -> Result<Array3<f32>> {
        let normed = self.attn_layer_norm.forward(&hidden_states);
        let mut attn_out = self.attention.forward(&normed, None, None)?;
        if let Some(post) = &self.post_attn_layer_norm {
            attn_out = post.forward(&attn_out);
        }
        let mut hidden = hidden_states + &attn_out;

        if let (Some(cross), Some(context)) = (&self.cross, encoder_hidden_states) {
            let normed = cross.norm.forward(&hidden);
            let mut cross_out = cross
                .attention
                .forward(&normed, Some(context), encoder_attention_mask)?;
            if let Some(post) = &cross.post_norm {
                cross_out = post.forward(&cross_out);
            }
            hidden += &cross_out;
        }

        let ffn_out = self.ffn.forward(&hidden)?;
        hidden += &ffn_out;
        Ok(hidden)
    }

    pub fn norm_type(&self) -> NormType {
        self.attn_layer_norm.norm_type()
    }
}
