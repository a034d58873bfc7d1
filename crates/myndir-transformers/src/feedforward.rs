//! Normformer-style gated feed-forward block.
//!
//! `wo(mid_norm(gelu(wi_0(x)) * wi_1(x)))` applied after a pre-MLP norm.

use anyhow::{anyhow, Result};
use ndarray::Array3;

use crate::activations::{apply_activation, Activation};
use crate::linear_layer::LinearLayer;
use crate::normalization::Normalization;

#[derive(Debug, Clone)]
pub struct GatedFeedForward {
    pub pre_norm: Normalization,
    pub wi_0: LinearLayer,
    pub wi_1: LinearLayer,
    pub mid_norm: Option<Normalization>,
    pub wo: LinearLayer,
    pub activation: Activation,
}

impl GatedFeedForward {
    pub fn new(
        pre_norm: Normalization,
        wi_0: LinearLayer,
        wi_1: LinearLayer,
        mid_norm: Option<Normalization>,
        wo: LinearLayer,
    ) -> Result<Self> {
        if wi_0.out_features() != wi_1.out_features() || wo.in_features() != wi_0.out_features() {
            return Err(anyhow!(
                "gated feed-forward projections disagree on intermediate size ({}, {}, {})",
                wi_0.out_features(),
                wi_1.out_features(),
                wo.in_features()
            ));
        }
        Ok(Self {
            pre_norm,
            wi_0,
            wi_1,
            mid_norm,
            wo,
            activation: Activation::Gelu,
        })
    }

    pub fn forward(&self, hidden: &Array3<f32>) -> Result<Array3<f32>> {
        let normed = self.pre_norm.forward(hidden);

        let (gate, linear) = rayon::join(|| self.wi_0.forward(&normed), || self.wi_1.forward(&normed));
        let mut gate = gate?;
        apply_activation(&mut gate, self.activation);
        let mut gated = gate * &linear?;

        if let Some(norm) = &self.mid_norm {
            gated = norm.forward(&gated);
        }
        self.wo.forward(&gated)
    }
}
