//! Dense projection `y = x W^T + b`.
//!
//! Weights are stored in the checkpoint's `[OutFeatures, InFeatures]` layout
//! and multiplied with the transposed faer kernel.

use anyhow::{anyhow, Result};
use ndarray::{Array1, Array2, Array3};

use crate::utils::linear_algebra::{matmul_3d_nt, matmul_nt};
use crate::weights::ModelWeights;

#[derive(Debug, Clone)]
pub struct LinearLayer {
    pub weight: Array2<f32>,
    pub bias: Option<Array1<f32>>,
}

impl LinearLayer {
    pub fn new(weight: Array2<f32>, bias: Option<Array1<f32>>) -> Self {
        Self { weight, bias }
    }

    /// Loads `{prefix}.weight` and, if present, `{prefix}.bias`.
    pub fn from_weights(weights: &ModelWeights, prefix: &str) -> Result<Self> {
        let weight = weights.get_array2(&format!("{}.weight", prefix))?;
        let bias = weights.get_optional_array1(&format!("{}.bias", prefix))?;

        if let Some(b) = &bias {
            if b.len() != weight.shape()[0] {
                return Err(anyhow!(
                    "Bias for '{}' has {} elements, weight has {} output features",
                    prefix,
                    b.len(),
                    weight.shape()[0]
                ));
            }
        }
        Ok(Self { weight, bias })
    }

    pub fn out_features(&self) -> usize {
        self.weight.shape()[0]
    }

    pub fn in_features(&self) -> usize {
        self.weight.shape()[1]
    }

    fn check_input(&self, in_dim: usize) -> Result<()> {
        if in_dim != self.in_features() {
            return Err(anyhow!(
                "Linear layer expects {} input features, got {}",
                self.in_features(),
                in_dim
            ));
        }
        Ok(())
    }

    pub fn matmul(&self, input: &Array2<f32>) -> Result<Array2<f32>> {
        self.check_input(input.shape()[1])?;
        let mut out = matmul_nt(&input.view(), &self.weight.view())?;
        if let Some(bias) = &self.bias {
            out += bias;
        }
        Ok(out)
    }

    pub fn forward(&self, input: &Array3<f32>) -> Result<Array3<f32>> {
        self.check_input(input.shape()[2])?;
        let mut out = matmul_3d_nt(input, &self.weight)?;
        if let Some(bias) = &self.bias {
            out += bias;
        }
        Ok(out)
    }
}
