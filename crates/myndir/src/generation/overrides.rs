//! User- and runtime-provided generation parameter overrides.
//!
//! These do NOT represent a full generation configuration.
//! They are merged over the pipeline defaults at resolution time.

use myndir_transformers::{DecodePolicy, LogitFilter, MaskSchedule, MaskedGenerationConfig};
use serde::{Deserialize, Serialize};

/// Overrides for masked image generation.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct GenerationOverrides {
    /// Number of refinement rounds.
    pub timesteps: Option<usize>,

    /// Classifier-free guidance scale (0.0 = no unconditional pass).
    pub guidance_scale: Option<f32>,

    /// Starting sampling temperature.
    pub temperature: Option<f32>,

    /// Keep only the top `1 - threshold` fraction of logits when sampling.
    /// Score-ordered decoding only; confidence decoding samples unfiltered.
    pub topk_filter_threshold: Option<f32>,

    /// Nucleus filter instead of the top-fraction filter. Score-ordered only.
    pub top_p: Option<f32>,

    pub schedule: Option<MaskSchedule>,

    /// - `Some(true)` => confidence-based remasking
    /// - `Some(false)` => score-ordered remasking
    /// - `None` => keep the default
    pub use_maskgit_generate: Option<bool>,
}

impl GenerationOverrides {
    /// Few rounds, light guidance.
    pub fn fast() -> Self {
        Self {
            timesteps: Some(4),
            guidance_scale: Some(3.0),
            ..Default::default()
        }
    }

    /// Many rounds, the MaskGIT paper setting.
    pub fn quality() -> Self {
        Self {
            timesteps: Some(18),
            ..Default::default()
        }
    }

    /// Single conditional pass per round.
    pub fn unguided() -> Self {
        Self {
            guidance_scale: Some(0.0),
            ..Default::default()
        }
    }

    /// Check if any overrides are set.
    pub fn is_empty(&self) -> bool {
        self.timesteps.is_none()
            && self.guidance_scale.is_none()
            && self.temperature.is_none()
            && self.topk_filter_threshold.is_none()
            && self.top_p.is_none()
            && self.schedule.is_none()
            && self.use_maskgit_generate.is_none()
    }

    /// Returns `base` with every set field replaced. `top_p` wins over
    /// `topk_filter_threshold` when both are set.
    pub fn apply_to(&self, base: &MaskedGenerationConfig) -> MaskedGenerationConfig {
        let mut config = base.clone();
        if let Some(timesteps) = self.timesteps {
            config.timesteps = timesteps;
        }
        if let Some(scale) = self.guidance_scale {
            config.guidance_scale = scale;
        }
        if let Some(temperature) = self.temperature {
            config.temperature = temperature;
        }
        if let Some(threshold) = self.topk_filter_threshold {
            config.filter = LogitFilter::TopFraction { threshold };
        }
        if let Some(top_p) = self.top_p {
            config.filter = LogitFilter::Nucleus { top_p };
        }
        if let Some(schedule) = self.schedule {
            config.schedule = schedule;
        }
        if let Some(maskgit) = self.use_maskgit_generate {
            config.policy = if maskgit {
                DecodePolicy::Confidence
            } else {
                DecodePolicy::ScoreOrdered
            };
        }
        config
    }

    /// `true` when a logit filter was set but `resolved` decodes with the
    /// confidence policy, which never filters.
    pub fn filter_is_ignored(&self, resolved: &MaskedGenerationConfig) -> bool {
        (self.topk_filter_threshold.is_some() || self.top_p.is_some())
            && resolved.policy == DecodePolicy::Confidence
    }

    /// Field-wise merge, `other` taking precedence.
    pub fn merge(&self, other: &GenerationOverrides) -> GenerationOverrides {
        GenerationOverrides {
            timesteps: other.timesteps.or(self.timesteps),
            guidance_scale: other.guidance_scale.or(self.guidance_scale),
            temperature: other.temperature.or(self.temperature),
            topk_filter_threshold: other.topk_filter_threshold.or(self.topk_filter_threshold),
            top_p: other.top_p.or(self.top_p),
            schedule: other.schedule.or(self.schedule),
            use_maskgit_generate: other.use_maskgit_generate.or(self.use_maskgit_generate),
        }
    }
}
