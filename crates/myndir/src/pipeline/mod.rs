//! Image generation pipeline.
//!
//! Resolves a [`GenerationRequest`] into conditioning (text encoder states or
//! class tokens), runs masked decoding on a blocking task and turns the token
//! grids into [`RgbImage`]s through a [`VisualCodec`].

mod builder;
mod collaborators;
mod generator;
mod image;
mod request;


pub use builder::{pipeline_defaults, ImageGeneratorBuilder};
pub use collaborators::{TextEncoder, VisualCodec};
pub use generator::ImageGenerator;
pub use image::{to_rgb_images, RgbImage};
pub use request::{GenerationRequest, Prompt};
