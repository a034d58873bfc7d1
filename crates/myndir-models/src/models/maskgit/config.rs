use anyhow::{anyhow, Result};
use myndir_transformers::normalization::NormType;
use myndir_transformers::traits::MaskedModelMetadata;
use serde::{Deserialize, Serialize};

pub const MASKGIT_CLASS_NAME: &str = "MaskGitTransformer";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MaskGitConfig {
    #[serde(rename = "_class_name", default = "default_class_name")]
    pub class_name: String,

    /// codebook_size + 1 for text conditioning,
    /// codebook_size + num_classes + 1 for class conditioning
    pub vocab_size: usize,
    #[serde(default = "default_hidden_size")]
    pub hidden_size: usize,
    #[serde(default = "default_num_layers")]
    pub num_hidden_layers: usize,
    #[serde(default = "default_num_heads")]
    pub num_attention_heads: usize,
    #[serde(default = "default_intermediate_size")]
    pub intermediate_size: usize,
    #[serde(default = "default_max_positions")]
    pub max_position_embeddings: usize,

    #[serde(default)]
    pub add_cross_attention: bool,
    #[serde(default = "default_encoder_hidden_size")]
    pub encoder_hidden_size: usize,
    #[serde(default)]
    pub project_encoder_hidden_states: bool,

    #[serde(default)]
    pub norm_type: NormType,
    #[serde(default = "default_eps")]
    pub layer_norm_eps: f32,
    #[serde(default = "default_true")]
    pub use_normformer: bool,
    #[serde(default = "default_true")]
    pub use_encoder_layernorm: bool,
    #[serde(default = "default_true")]
    pub use_mlm_layer: bool,
    #[serde(default = "default_true")]
    pub use_mlm_layernorm: bool,
    #[serde(default)]
    pub use_bias: bool,

    #[serde(default = "default_codebook_size")]
    pub codebook_size: usize,
    #[serde(default = "default_num_vq_tokens")]
    pub num_vq_tokens: usize,
    #[serde(default)]
    pub num_classes: Option<usize>,
}

fn default_class_name() -> String {
    MASKGIT_CLASS_NAME.to_string()
}
fn default_hidden_size() -> usize {
    768
}
fn default_num_layers() -> usize {
    12
}
fn default_num_heads() -> usize {
    12
}
fn default_intermediate_size() -> usize {
    3072
}
fn default_max_positions() -> usize {
    256
}
fn default_encoder_hidden_size() -> usize {
    1024 // T5-large
}
fn default_eps() -> f32 {
    1e-5
}
fn default_true() -> bool {
    true
}
fn default_codebook_size() -> usize {
    1024
}
fn default_num_vq_tokens() -> usize {
    256
}

impl MaskGitConfig {
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.num_attention_heads == 0 || self.hidden_size % self.num_attention_heads != 0 {
            return Err(anyhow!(
                "hidden_size {} must be divisible by num_attention_heads {}",
                self.hidden_size,
                self.num_attention_heads
            ));
        }
        let needed = self.codebook_size + self.num_classes.unwrap_or(0) + 1;
        if self.vocab_size < needed {
            return Err(anyhow!(
                "vocab_size {} cannot hold {} codebook entries, {} class tokens and the mask token",
                self.vocab_size,
                self.codebook_size,
                self.num_classes.unwrap_or(0)
            ));
        }
        if self.sequence_length() > self.max_position_embeddings {
            return Err(anyhow!(
                "{} positions needed but max_position_embeddings is {}",
                self.sequence_length(),
                self.max_position_embeddings
            ));
        }
        if self.num_hidden_layers == 0 {
            return Err(anyhow!("num_hidden_layers must be at least 1"));
        }
        Ok(())
    }

    pub fn mask_token_id(&self) -> u32 {
        (self.vocab_size - 1) as u32
    }

    pub fn head_dim(&self) -> usize {
        self.hidden_size / self.num_attention_heads
    }

    /// Grid length plus the leading class token when class-conditioned.
    pub fn sequence_length(&self) -> usize {
        self.num_vq_tokens + usize::from(self.num_classes.is_some())
    }

    /// Width of the key/value inputs of cross-attention.
    pub fn cross_attention_kv_size(&self) -> usize {
        if self.project_encoder_hidden_states {
            self.hidden_size
        } else {
            self.encoder_hidden_size
        }
    }

    pub fn metadata(&self) -> MaskedModelMetadata {
        MaskedModelMetadata {
            codebook_size: self.codebook_size,
            vocab_size: self.vocab_size,
            num_vq_tokens: self.num_vq_tokens,
            num_classes: self.num_classes,
            supports_cross_attention: self.add_cross_attention,
        }
    }
}
