//! Myndir - text- and class-conditioned image generation with iterative
//! masked decoding.
//!
//! A masked-token transformer fills a grid of image codebook ids over a fixed
//! number of rounds, and a visual codec turns the finished grid into pixels.
//! Text encoding and the codec are supplied by the caller.
//!
//! ```ignore
//! use myndir::prelude::*;
//!
//! let generator = ImageGenerator::builder(transformer, vqgan)
//!     .text_encoder(t5)
//!     .build()?;
//! let images = generator
//!     .generate(&GenerationRequest::text(["a watercolor map of Iceland"]).seed(1))
//!     .await?;
//! ```

pub mod common;
pub mod generation;
pub mod pipeline;

pub use common::{MyndirError, MyndirResult};
pub use generation::GenerationOverrides;
pub use pipeline::{
    GenerationRequest, ImageGenerator, ImageGeneratorBuilder, Prompt, RgbImage, TextEncoder,
    VisualCodec,
};

pub use myndir_models::TransformerRegistry;
pub use myndir_transformers::{CancellationHandle, CancellationToken, DecodePolicy, MaskSchedule};

pub mod prelude {
    pub use crate::common::{MyndirError, MyndirResult};
    pub use crate::generation::GenerationOverrides;
    pub use crate::pipeline::{GenerationRequest, ImageGenerator, TextEncoder, VisualCodec};
}
