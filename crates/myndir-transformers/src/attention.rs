//! Bidirectional multi-head attention.
//!
//! Serves both the self-attention block (context = hidden states) and the
//! cross-attention block (context = encoder hidden states, optional key mask).
//! There is no causal mask and no KV cache: every round of masked decoding
//! re-reads the full token grid.

use anyhow::{anyhow, Result};
use ndarray::{Array3, Array4, ArrayView2};

use crate::activations::softmax_last_axis;
use crate::linear_layer::LinearLayer;
use crate::utils::linear_algebra::batched_matmul;
use crate::utils::masks::apply_padding_mask;
use crate::weights::ModelWeights;

#[derive(Debug, Clone)]
pub struct MultiHeadAttention {
    pub query: LinearLayer,
    pub key: LinearLayer,
    pub value: LinearLayer,
    pub out: LinearLayer,
    pub num_heads: usize,
    pub head_dim: usize,
    scale: f32,
}

impl MultiHeadAttention {
    pub fn new(
        query: LinearLayer,
        key: LinearLayer,
        value: LinearLayer,
        out: LinearLayer,
        num_heads: usize,
    ) -> Result<Self> {
        let hidden_size = query.out_features();
        if num_heads == 0 || hidden_size % num_heads != 0 {
            return Err(anyhow!(
                "hidden size {} must be divisible by num_heads {}",
                hidden_size,
                num_heads
            ));
        }
        if key.out_features() != hidden_size || value.out_features() != hidden_size {
            return Err(anyhow!(
                "key/value projections must produce {} features",
                hidden_size
            ));
        }
        let head_dim = hidden_size / num_heads;
        Ok(Self {
            query,
            key,
            value,
            out,
            num_heads,
            head_dim,
            scale: 1.0 / (head_dim as f32).sqrt(),
        })
    }

    /// Loads `{prefix}.query`, `{prefix}.key`, `{prefix}.value` and `{prefix}.out`.
    pub fn from_weights(weights: &ModelWeights, prefix: &str, num_heads: usize) -> Result<Self> {
        Self::new(
            LinearLayer::from_weights(weights, &format!("{}.query", prefix))?,
            LinearLayer::from_weights(weights, &format!("{}.key", prefix))?,
            LinearLayer::from_weights(weights, &format!("{}.value", prefix))?,
            LinearLayer::from_weights(weights, &format!("{}.out", prefix))?,
            num_heads,
        )
    }

    pub fn hidden_size(&self) -> usize {
        self.num_heads * self.head_dim
    }

    /// `[b, s, h] -> [b, heads, s, head_dim]`
    fn split_heads(&self, x: Array3<f32>) -> Result<Array4<f32>> {
        let (batch, seq, _) = x.dim();
        let split = x.into_shape_with_order((batch, seq, self.num_heads, self.head_dim))?;
        Ok(split.permuted_axes([0, 2, 1, 3]).as_standard_layout().to_owned())
    }

    /// # Arguments
    /// * `hidden_states` - `[batch, q_len, hidden]`
    /// * `context` - `[batch, kv_len, kv_hidden]` for cross-attention, `None` for self-attention
    /// * `key_mask` - `[batch, kv_len]`, `0.0` marks a key that must not be attended
    pub fn forward(
        &self,
        hidden_states: &Array3<f32>,
        context: Option<&Array3<f32>>,
        key_mask: Option<&ArrayView2<f32>>,
    ) -> Result<Array3<f32>> {
        let (batch, q_len, _) = hidden_states.dim();
        let context = context.unwrap_or(hidden_states);
        if context.shape()[0] != batch {
            return Err(anyhow!(
                "context batch {} does not match query batch {}",
                context.shape()[0],
                batch
            ));
        }

        let q = self.split_heads(self.query.forward(hidden_states)?)?;
        let k = self.split_heads(self.key.forward(context)?)?;
        let v = self.split_heads(self.value.forward(context)?)?;

        let k_t = k.permuted_axes([0, 1, 3, 2]).as_standard_layout().to_owned();
        let mut scores = batched_matmul(&q, &k_t)?;
        scores.mapv_inplace(|s| s * self.scale);

        if let Some(mask) = key_mask {
            scores = apply_padding_mask(scores, mask)?;
        }
        softmax_last_axis(&mut scores);

        let ctx = batched_matmul(&scores, &v)?;
        let merged = ctx
            .permuted_axes([0, 2, 1, 3])
            .as_standard_layout()
            .to_owned()
            .into_shape_with_order((batch, q_len, self.hidden_size()))?;

        self.out.forward(&merged)
    }
}
