//! Concrete masked-token transformers built on myndir-transformers.
//!
//! - [`models::maskgit`]: the bidirectional MaskGIT transformer with optional
//!   cross-attention (text conditioning) or class tokens
//! - [`registry`]: builds a model from its config's `_class_name`
//!
//! # Example
//!
//! ```ignore
//! use myndir_models::registry::TransformerRegistry;
//!
//! let registry = TransformerRegistry::with_defaults();
//! let model = registry.build(&config_json, &weights)?;
//! println!("codebook: {}", model.metadata().codebook_size);
//! ```

pub mod models;
pub mod registry;

pub use models::maskgit::{MaskGitConfig, MaskGitTransformer};
pub use registry::TransformerRegistry;
