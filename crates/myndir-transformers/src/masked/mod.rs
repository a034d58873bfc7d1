//! Masked (non-autoregressive) token-grid decoding.

pub mod conditioning;
pub mod decoder;
pub mod error;
pub mod guidance;
pub mod logits;
pub mod remask;
pub mod schedule;

pub use conditioning::ConditioningState;
pub use decoder::{DecodeOutput, MaskedDecoder, RoundTrace};
pub use error::DecodeConfigError;
pub use logits::{CodebookLogitModel, GuidanceMode};
pub use schedule::MaskSchedule;
