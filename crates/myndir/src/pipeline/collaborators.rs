//! Components the pipeline drives but does not implement.

use anyhow::Result;
use async_trait::async_trait;
use ndarray::{Array2, Array3, Array4};

/// Turns prompts into encoder hidden states for cross-attention.
#[async_trait]
pub trait TextEncoder: Send + Sync {
    /// `[prompts.len(), seq_len, hidden]`
    async fn encode(&self, prompts: &[String]) -> Result<Array3<f32>>;

    /// Width of the returned states.
    fn hidden_size(&self) -> usize;
}

/// Decodes a token grid into images.
pub trait VisualCodec: Send + Sync {
    /// `[batch, num_vq_tokens]` codebook ids to `[batch, 3, height, width]`
    /// pixels in `[0, 1]`.
    fn decode_code(&self, tokens: &Array2<u32>) -> Result<Array4<f32>>;
}
