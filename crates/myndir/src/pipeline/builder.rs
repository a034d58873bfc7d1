//! Builder pattern for ImageGenerator configuration.

use std::sync::Arc;
use std::time::Duration;

use myndir_models::TransformerRegistry;
use myndir_transformers::weights::ModelWeights;
use myndir_transformers::{
    CancellationToken, DecodePolicy, LogitFilter, MaskSchedule, MaskedGenerationConfig, MaskedTokenModel,
};

use super::collaborators::{TextEncoder, VisualCodec};
use super::generator::ImageGenerator;
use crate::common::{MyndirError, MyndirResult};
use crate::generation::GenerationOverrides;

/// Decode settings of the image pipeline before any overrides.
pub fn pipeline_defaults() -> MaskedGenerationConfig {
    MaskedGenerationConfig {
        timesteps: 8,
        guidance_scale: 8.0,
        temperature: 1.0,
        filter: LogitFilter::TopFraction { threshold: 0.9 },
        schedule: MaskSchedule::Cosine,
        policy: DecodePolicy::Confidence,
    }
}

/// Builder for configuring an ImageGenerator.
///
/// # Example
///
/// ```ignore
/// let generator = ImageGenerator::builder(transformer, vqgan)
///     .text_encoder(t5)
///     .guidance_scale(4.0)
///     .timeout(Duration::from_secs(30))
///     .build()?;
/// ```
pub struct ImageGeneratorBuilder {
    pub(crate) model: Arc<dyn MaskedTokenModel>,
    pub(crate) codec: Arc<dyn VisualCodec>,
    pub(crate) text_encoder: Option<Arc<dyn TextEncoder>>,

    // Generation defaults
    pub(crate) generation_overrides: GenerationOverrides,

    // Cancellation
    pub(crate) cancellation: CancellationToken,
    pub(crate) timeout: Option<Duration>,
}

impl ImageGeneratorBuilder {
    pub fn new(model: Arc<dyn MaskedTokenModel>, codec: Arc<dyn VisualCodec>) -> Self {
        Self {
            model,
            codec,
            text_encoder: None,
            generation_overrides: GenerationOverrides::default(),
            cancellation: CancellationToken::never(),
            timeout: None,
        }
    }

    /// Builds the transformer named by the config's `_class_name`.
    pub fn from_registry(
        registry: &TransformerRegistry,
        config_json: &str,
        weights: &ModelWeights,
        codec: Arc<dyn VisualCodec>,
    ) -> MyndirResult<Self> {
        let class_name = TransformerRegistry::class_name_of(config_json)
            .map_err(|e| MyndirError::InvalidConfig(e.to_string()))?;
        if !registry.contains(&class_name) {
            return Err(MyndirError::UnknownTransformer(format!(
                "'{}'. Registered: {}",
                class_name,
                registry.names().join(", ")
            )));
        }
        let model = registry
            .build(config_json, weights)
            .map_err(|source| MyndirError::LoadFailed {
                model: class_name,
                source,
            })?;
        Ok(Self::new(model, codec))
    }

    // =========================================================================
    // Collaborators
    // =========================================================================

    /// Text encoder for text-conditioned models.
    pub fn text_encoder(mut self, encoder: Arc<dyn TextEncoder>) -> Self {
        self.text_encoder = Some(encoder);
        self
    }

    // =========================================================================
    // Generation Parameters
    // =========================================================================

    pub fn timesteps(mut self, timesteps: usize) -> Self {
        self.generation_overrides.timesteps = Some(timesteps);
        self
    }

    /// Classifier-free guidance scale. 0 disables the unconditional pass.
    pub fn guidance_scale(mut self, scale: f32) -> Self {
        self.generation_overrides.guidance_scale = Some(scale);
        self
    }

    pub fn temperature(mut self, temperature: f32) -> Self {
        self.generation_overrides.temperature = Some(temperature);
        self
    }

    /// Top-fraction logit filter. Only the score-ordered policy
    /// (`use_maskgit_generate(false)`) applies it.
    pub fn topk_filter_threshold(mut self, threshold: f32) -> Self {
        self.generation_overrides.topk_filter_threshold = Some(threshold);
        self
    }

    /// Nucleus logit filter. Like the top-fraction filter, score-ordered only.
    pub fn top_p(mut self, p: f32) -> Self {
        self.generation_overrides.top_p = Some(p);
        self
    }

    pub fn schedule(mut self, schedule: MaskSchedule) -> Self {
        self.generation_overrides.schedule = Some(schedule);
        self
    }

    /// `true` for confidence-based remasking, `false` for score-ordered.
    pub fn use_maskgit_generate(mut self, enabled: bool) -> Self {
        self.generation_overrides.use_maskgit_generate = Some(enabled);
        self
    }

    /// Set all generation overrides at once.
    pub fn generation_config(mut self, overrides: GenerationOverrides) -> Self {
        self.generation_overrides = overrides;
        self
    }

    // =========================================================================
    // Cancellation
    // =========================================================================

    pub fn cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }

    /// Every call stops between rounds once `timeout` has elapsed since it started.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    // =========================================================================
    // Build
    // =========================================================================

    pub fn build(self) -> MyndirResult<ImageGenerator> {
        let config = self.generation_overrides.apply_to(&pipeline_defaults());
        config.validate()?;
        if self.generation_overrides.filter_is_ignored(&config) {
            log::warn!("logit filter has no effect with confidence-based remasking");
        }

        let meta = self.model.metadata();
        if meta.supports_cross_attention && self.text_encoder.is_none() {
            return Err(MyndirError::InvalidConfig(
                "text-conditioned transformer needs a text encoder".to_string(),
            ));
        }
        if meta.num_classes.is_some() && self.text_encoder.is_some() {
            log::warn!("text encoder is unused by a class-conditioned transformer");
        }

        log::debug!("Image generator config: {:?}", config);
        Ok(ImageGenerator {
            model: self.model,
            text_encoder: self.text_encoder,
            codec: self.codec,
            config,
            cancellation: self.cancellation,
            timeout: self.timeout,
        })
    }
}
