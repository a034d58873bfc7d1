pub mod layer_norm;
pub mod rms_norm;

pub use crate::normalization::{layer_norm::LayerNorm, rms_norm::RMSNorm};

use anyhow::Result;
use ndarray::Array3;
use serde::{Deserialize, Serialize};

use crate::weights::ModelWeights;

/// `norm_type` as written in the transformer config.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum NormType {
    #[default]
    LayerNorm,
    RmsNorm,
}

#[derive(Debug, Clone)]
pub enum Normalization {
    LayerNorm(LayerNorm),
    RMSNorm(RMSNorm),
}

impl Normalization {
    /// Reads `{prefix}.weight`, plus `{prefix}.bias` when a LayerNorm has one.
    pub fn from_weights(weights: &ModelWeights, prefix: &str, norm_type: NormType, eps: f32) -> Result<Self> {
        Ok(match norm_type {
            NormType::LayerNorm => Self::LayerNorm(LayerNorm::from_weights(weights, prefix, eps)?),
            NormType::RmsNorm => {
                let weight = weights.get_array1(&format!("{}.weight", prefix))?;
                Self::RMSNorm(RMSNorm::new(weight, eps))
            }
        })
    }

    pub fn forward(&self, input: &Array3<f32>) -> Array3<f32> {
        match self {
            Self::LayerNorm(norm) => norm.forward_3d(input),
            Self::RMSNorm(norm) => norm.forward_3d(input),
        }
    }

    pub fn norm_type(&self) -> NormType {
        match self {
            Self::LayerNorm(_) => NormType::LayerNorm,
            Self::RMSNorm(_) => NormType::RmsNorm,
        }
    }
}
