//! MaskGIT bidirectional transformer.
//!
//! Pre-LN layers with Normformer extras (post-attention norms and a gated,
//! mid-normalized feed-forward), optional cross-attention over text encoder
//! states, and an MLM head producing logits over the whole vocabulary
//! (codebook, class tokens and the mask token).

mod config;
mod layer;
mod model;

#[cfg(test)]
pub(crate) mod tests;

pub use config::{MaskGitConfig, MASKGIT_CLASS_NAME};
pub use layer::{CrossAttentionBlock, MaskGitLayer};
pub use model::{EncoderProjection, MaskGitTransformer, MlmHead, OutputHead};
