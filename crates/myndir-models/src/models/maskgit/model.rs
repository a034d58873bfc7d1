//! MaskGIT bidirectional transformer.
//!
//! Embeddings, a stack of [`MaskGitLayer`]s, an optional final norm and the
//! MLM head. Exposed to the decoder through [`MaskedTokenModel`].

use std::any::Any;

use anyhow::{anyhow, Result};
use myndir_transformers::activations::{apply_activation, Activation};
use myndir_transformers::embeddings::Embeddings;
use myndir_transformers::linear_layer::LinearLayer;
use myndir_transformers::normalization::Normalization;
use myndir_transformers::traits::{MaskedModelMetadata, MaskedTokenModel};
use myndir_transformers::weights::ModelWeights;
use ndarray::{Array3, ArrayView2, ArrayView3};

use super::config::MaskGitConfig;
use super::layer::MaskGitLayer;

/// Projection of text encoder states into the transformer width.
#[derive(Debug, Clone)]
pub struct EncoderProjection {
    pub proj: LinearLayer,
    pub norm: Normalization,
}

/// `to_logits(norm(gelu(dense(x))))`
#[derive(Debug, Clone)]
pub struct MlmHead {
    pub dense: LinearLayer,
    pub norm: Option<Normalization>,
    pub to_logits: LinearLayer,
}

impl MlmHead {
    fn forward(&self, hidden: &Array3<f32>) -> Result<Array3<f32>> {
        let mut x = self.dense.forward(hidden)?;
        apply_activation(&mut x, Activation::Gelu);
        if let Some(norm) = &self.norm {
            x = norm.forward(&x);
        }
        self.to_logits.forward(&x)
    }
}

#[derive(Debug, Clone)]
pub enum OutputHead {
    Mlm(MlmHead),
    Linear(LinearLayer),
}

pub struct MaskGitTransformer {
    config: MaskGitConfig,
    metadata: MaskedModelMetadata,
    embeddings: Embeddings,
    encoder_proj: Option<EncoderProjection>,
    layers: Vec<MaskGitLayer>,
    encoder_layer_norm: Option<Normalization>,
    head: OutputHead,
}

impl MaskGitTransformer {
    pub fn from_weights(config: MaskGitConfig, weights: &ModelWeights) -> Result<Self> {
        config.validate()?;
        log::info!(
            "Building {}: {} layers, hidden={}, heads={}, vocab={}, cross_attention={}",
            config.class_name,
            config.num_hidden_layers,
            config.hidden_size,
            config.num_attention_heads,
            config.vocab_size,
            config.add_cross_attention
        );

        let eps = config.layer_norm_eps;
        let embeddings = Embeddings::from_weights(weights, "embed")?;
        if embeddings.vocab_size() != config.vocab_size {
            return Err(anyhow!(
                "embedding table has {} rows, config vocab_size is {}",
                embeddings.vocab_size(),
                config.vocab_size
            ));
        }
        if embeddings.max_positions() < config.sequence_length() {
            return Err(anyhow!(
                "{} position embeddings cannot cover {} tokens",
                embeddings.max_positions(),
                config.sequence_length()
            ));
        }

        let encoder_proj = if config.add_cross_attention && config.project_encoder_hidden_states {
            Some(EncoderProjection {
                proj: LinearLayer::from_weights(weights, "encoder_proj")?,
                norm: Normalization::from_weights(weights, "encoder_proj_layer_norm", config.norm_type, eps)?,
            })
        } else {
            None
        };

        let layers = (0..config.num_hidden_layers)
            .map(|i| {
                log::debug!("Loading transformer layer {}", i);
                MaskGitLayer::from_weights(weights, &config, i)
            })
            .collect::<Result<Vec<_>>>()?;

        if let Some(cross) = layers.first().and_then(|l| l.cross.as_ref()) {
            let kv_in = cross.attention.key.in_features();
            if kv_in != config.cross_attention_kv_size() {
                return Err(anyhow!(
                    "cross-attention expects {} features, config implies {}",
                    kv_in,
                    config.cross_attention_kv_size()
                ));
            }
        }

        let encoder_layer_norm = if config.use_encoder_layernorm {
            Some(Normalization::from_weights(weights, "encoder_layer_norm", config.norm_type, eps)?)
        } else {
            None
        };

        let head = if config.use_mlm_layer {
            OutputHead::Mlm(MlmHead {
                dense: LinearLayer::from_weights(weights, "mlm_layer.mlm_dense")?,
                norm: if config.use_mlm_layernorm {
                    Some(Normalization::from_weights(weights, "mlm_layer.mlm_ln", config.norm_type, eps)?)
                } else {
                    None
                },
                to_logits: LinearLayer::from_weights(weights, "mlm_layer.to_logits")?,
            })
        } else {
            OutputHead::Linear(LinearLayer::from_weights(weights, "to_logits")?)
        };

        Ok(Self {
            metadata: config.metadata(),
            config,
            embeddings,
            encoder_proj,
            layers,
            encoder_layer_norm,
            head,
        })
    }

    pub fn config(&self) -> &MaskGitConfig {
        &self.config
    }

    pub fn num_layers(&self) -> usize {
        self.layers.len()
    }

    fn prepare_encoder_states(&self, states: &ArrayView3<f32>) -> Result<Array3<f32>> {
        match &self.encoder_proj {
            Some(p) => Ok(p.norm.forward(&p.proj.forward(&states.to_owned())?)),
            None => Ok(states.to_owned()),
        }
    }
}

impl MaskedTokenModel for MaskGitTransformer {
    fn metadata(&self) -> &MaskedModelMetadata {
        &self.metadata
    }

    fn forward(
        &self,
        input_ids: &ArrayView2<u32>,
        encoder_hidden_states: Option<&ArrayView3<f32>>,
        encoder_attention_mask: Option<&ArrayView2<f32>>,
    ) -> Result<Array3<f32>> {
        let encoder_states = match (self.config.add_cross_attention, encoder_hidden_states) {
            (true, None) => {
                return Err(anyhow!(
                    "model uses cross-attention but no encoder hidden states were given"
                ))
            }
            (false, Some(_)) => {
                return Err(anyhow!(
                    "encoder hidden states given to a model without cross-attention"
                ))
            }
            (true, Some(states)) => Some(self.prepare_encoder_states(states)?),
            (false, None) => None,
        };

        let mut hidden = self.embeddings.forward(input_ids)?;
        for layer in &self.layers {
            hidden = layer.forward(hidden, encoder_states.as_ref(), encoder_attention_mask)?;
        }
        if let Some(norm) = &self.encoder_layer_norm {
            hidden = norm.forward(&hidden);
        }

        match &self.head {
            OutputHead::Mlm(mlm) => mlm.forward(&hidden),
            OutputHead::Linear(linear) => linear.forward(&hidden),
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
