//! Mean/variance normalization over the hidden axis.

use anyhow::{anyhow, Result};
use ndarray::{Array1, Array3, Axis, Zip};

use crate::weights::ModelWeights;

/// `y = (x - mean) / sqrt(var + eps) * weight + bias`
///
/// Checkpoints exported with `use_bias = false` carry only the scale.
#[derive(Debug, Clone)]
pub struct LayerNorm {
    pub weight: Array1<f32>,
    pub bias: Option<Array1<f32>>,
    pub eps: f32,
}

impl LayerNorm {
    pub fn new(weight: Array1<f32>, bias: Option<Array1<f32>>, eps: f32) -> Self {
        Self { weight, bias, eps }
    }

    pub fn from_weights(weights: &ModelWeights, prefix: &str, eps: f32) -> Result<Self> {
        let weight = weights.get_array1(&format!("{}.weight", prefix))?;
        let bias = weights.get_optional_array1(&format!("{}.bias", prefix))?;
        if let Some(bias) = &bias {
            if bias.len() != weight.len() {
                return Err(anyhow!(
                    "'{}' has a {}-wide scale but a {}-wide bias",
                    prefix,
                    weight.len(),
                    bias.len()
                ));
            }
        }
        Ok(Self { weight, bias, eps })
    }

    /// Normalizes every `[batch, seq]` row of a `[batch, seq, hidden]` tensor.
    pub fn forward_3d(&self, hidden: &Array3<f32>) -> Array3<f32> {
        let mut out = hidden.to_owned();
        let width = hidden.len_of(Axis(2)) as f32;

        for mut row in out.lanes_mut(Axis(2)) {
            let mean = row.sum() / width;
            row.mapv_inplace(|x| x - mean);
            let var = row.fold(0.0f32, |acc, &x| acc + x * x) / width;
            let inv_std = (var + self.eps).sqrt().recip();

            match &self.bias {
                Some(bias) => Zip::from(&mut row)
                    .and(&self.weight)
                    .and(bias)
                    .for_each(|x, &g, &b| *x = *x * inv_std * g + b),
                None => Zip::from(&mut row)
                    .and(&self.weight)
                    .for_each(|x, &g| *x *= inv_std * g),
            }
        }
        out
    }
}
