pub mod cancellation;
pub mod sampling;

pub use cancellation::{CancellationError, CancellationHandle, CancellationToken};
pub use sampling::*;

use ndarray::Array1;
use serde::{Deserialize, Serialize};

use crate::masked::error::DecodeConfigError;
use crate::masked::schedule::MaskSchedule;

/// Remasking policy used between rounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DecodePolicy {
    /// Each round masks the positions whose last prediction had the highest
    /// `1 - p(token)`, then fills every masked position with a Gumbel-max draw
    /// from the filtered logits.
    ScoreOrdered,
    /// Canonical MaskGIT: only masked positions are sampled, and the least
    /// confident of them (with annealed Gumbel jitter) are masked again.
    #[default]
    Confidence,
}

/// Candidate restriction applied to logits before score-ordered sampling.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LogitFilter {
    None,
    /// Keep the top `ceil((1 - threshold) * V)` logits.
    TopFraction { threshold: f32 },
    /// Keep the smallest prefix whose probability mass exceeds `top_p`.
    Nucleus { top_p: f32 },
}

impl Default for LogitFilter {
    fn default() -> Self {
        LogitFilter::TopFraction { threshold: 0.9 }
    }
}

impl LogitFilter {
    pub fn apply(&self, logits: Array1<f32>) -> Array1<f32> {
        match *self {
            LogitFilter::None => logits,
            LogitFilter::TopFraction { threshold } => top_k_fraction_filtering(logits, threshold),
            LogitFilter::Nucleus { top_p } => top_p_filtering(logits, top_p),
        }
    }

    pub fn validate(&self) -> Result<(), DecodeConfigError> {
        match *self {
            LogitFilter::None => Ok(()),
            LogitFilter::TopFraction { threshold: t } | LogitFilter::Nucleus { top_p: t } => {
                if (0.0..=1.0).contains(&t) {
                    Ok(())
                } else {
                    Err(DecodeConfigError::InvalidFilterThreshold(t))
                }
            }
        }
    }
}

/// Knobs for one masked generation call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MaskedGenerationConfig {
    /// Number of refinement rounds.
    pub timesteps: usize,
    /// Classifier-free guidance scale; `0` disables the second pass.
    pub guidance_scale: f32,
    /// Starting temperature, annealed towards zero over the rounds.
    pub temperature: f32,
    pub filter: LogitFilter,
    pub schedule: MaskSchedule,
    pub policy: DecodePolicy,
}

impl Default for MaskedGenerationConfig {
    fn default() -> Self {
        Self {
            timesteps: 18,
            guidance_scale: 0.0,
            temperature: 1.0,
            filter: LogitFilter::default(),
            schedule: MaskSchedule::Cosine,
            policy: DecodePolicy::Confidence,
        }
    }
}

impl MaskedGenerationConfig {
    pub fn validate(&self) -> Result<(), DecodeConfigError> {
        if self.timesteps < 1 {
            return Err(DecodeConfigError::InvalidTimesteps(self.timesteps));
        }
        if !(self.temperature.is_finite() && self.temperature > 0.0) {
            return Err(DecodeConfigError::InvalidTemperature(self.temperature));
        }
        if !(self.guidance_scale.is_finite() && self.guidance_scale >= 0.0) {
            return Err(DecodeConfigError::InvalidGuidanceScale(self.guidance_scale));
        }
        self.filter.validate()
    }
}
