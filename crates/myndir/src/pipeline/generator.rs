use std::sync::Arc;
use std::time::Duration;

use anyhow::anyhow;
use myndir_transformers::{
    CancellationToken, ConditioningState, DecodeConfigError, MaskedDecoder, MaskedGenerationConfig,
    MaskedModelMetadata, MaskedTokenModel,
};
use ndarray::{Array2, Array3};
use rand::rngs::StdRng;
use rand::SeedableRng;

use super::builder::ImageGeneratorBuilder;
use super::collaborators::{TextEncoder, VisualCodec};
use super::image::{to_rgb_images, RgbImage};
use super::request::{repeat_interleave_ids, repeat_interleave_states, GenerationRequest, Prompt};
use crate::common::{MyndirError, MyndirResult};
use crate::generation::GenerationOverrides;

/// Owned conditioning moved onto the blocking decode task.
enum DecodeInputs {
    Text {
        states: Array3<f32>,
        negative: Option<Array3<f32>>,
    },
    Classes(Vec<u32>),
}

impl DecodeInputs {
    fn conditioning(&self) -> ConditioningState<'_> {
        match self {
            DecodeInputs::Text { states, negative } => {
                let cond = ConditioningState::text(states.view());
                match negative {
                    Some(negative) => cond.with_negative(negative.view()),
                    None => cond,
                }
            }
            DecodeInputs::Classes(ids) => ConditioningState::classes(ids),
        }
    }
}

/// Text- or class-conditioned image generation.
///
/// # Example
///
/// ```ignore
/// let generator = ImageGenerator::builder(transformer, vqgan)
///     .text_encoder(t5)
///     .timesteps(12)
///     .build()?;
///
/// let images = generator
///     .generate(&GenerationRequest::text(["a lighthouse at dusk"]).seed(7))
///     .await?;
/// ```
pub struct ImageGenerator {
    pub(crate) model: Arc<dyn MaskedTokenModel>,
    pub(crate) text_encoder: Option<Arc<dyn TextEncoder>>,
    pub(crate) codec: Arc<dyn VisualCodec>,
    pub(crate) config: MaskedGenerationConfig,
    pub(crate) cancellation: CancellationToken,
    pub(crate) timeout: Option<Duration>,
}

impl ImageGenerator {
    pub fn builder(model: Arc<dyn MaskedTokenModel>, codec: Arc<dyn VisualCodec>) -> ImageGeneratorBuilder {
        ImageGeneratorBuilder::new(model, codec)
    }

    /// Resolved decode settings used when a call passes no overrides.
    pub fn config(&self) -> &MaskedGenerationConfig {
        &self.config
    }

    pub fn metadata(&self) -> &MaskedModelMetadata {
        self.model.metadata()
    }

    pub fn is_class_conditioned(&self) -> bool {
        self.metadata().num_classes.is_some()
    }

    /// Generates token grids, `[batch_size, num_vq_tokens]`.
    pub async fn generate_tokens(&self, request: &GenerationRequest) -> MyndirResult<Array2<u32>> {
        self.generate_tokens_with(request, &GenerationOverrides::default())
            .await
    }

    pub async fn generate_tokens_with(
        &self,
        request: &GenerationRequest,
        overrides: &GenerationOverrides,
    ) -> MyndirResult<Array2<u32>> {
        let rng = match request.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let (tokens, _) = self.decode_tokens(request, overrides, rng).await?;
        Ok(tokens)
    }

    /// Draws from `rng` instead of the request seed, which is ignored.
    ///
    /// On success `rng` is left where the decode stopped drawing, so
    /// consecutive calls continue one random stream.
    pub async fn generate_tokens_with_rng(
        &self,
        request: &GenerationRequest,
        overrides: &GenerationOverrides,
        rng: &mut StdRng,
    ) -> MyndirResult<Array2<u32>> {
        if request.seed.is_some() {
            log::warn!("request seed is ignored when a generator is supplied");
        }
        let (tokens, advanced) = self.decode_tokens(request, overrides, rng.clone()).await?;
        *rng = advanced;
        Ok(tokens)
    }

    async fn decode_tokens(
        &self,
        request: &GenerationRequest,
        overrides: &GenerationOverrides,
        mut rng: StdRng,
    ) -> MyndirResult<(Array2<u32>, StdRng)> {
        let config = overrides.apply_to(&self.config);
        config.validate()?;
        if overrides.filter_is_ignored(&config) {
            log::warn!("logit filter has no effect with confidence-based remasking");
        }
        if request.num_images_per_prompt == 0 {
            return Err(MyndirError::InvalidConfig(
                "num_images_per_prompt must be at least 1".to_string(),
            ));
        }

        let inputs = self.prepare_inputs(request, &config).await?;

        let mut token = self.cancellation.clone();
        if let Some(timeout) = self.timeout {
            token = token.with_timeout(timeout);
        }
        let decoder = MaskedDecoder::new(self.model.clone())
            .with_config(config)
            .with_cancellation(token);

        log::info!(
            "Generating {} image grid(s) ({} per prompt)",
            request.batch_size(),
            request.num_images_per_prompt
        );

        let (tokens, rng) = tokio::task::spawn_blocking(move || {
            let tokens = decoder.generate(&inputs.conditioning(), &mut rng);
            (tokens, rng)
        })
        .await
        .map_err(|e| MyndirError::GenerationFailed(anyhow!("decode task panicked: {}", e)))?;
        Ok((tokens.map_err(MyndirError::from_decode)?, rng))
    }

    /// Generates images through the visual codec.
    pub async fn generate(&self, request: &GenerationRequest) -> MyndirResult<Vec<RgbImage>> {
        self.generate_with(request, &GenerationOverrides::default())
            .await
    }

    pub async fn generate_with(
        &self,
        request: &GenerationRequest,
        overrides: &GenerationOverrides,
    ) -> MyndirResult<Vec<RgbImage>> {
        let tokens = self.generate_tokens_with(request, overrides).await?;
        let batch = tokens.nrows();
        let codec = self.codec.clone();

        let pixels = tokio::task::spawn_blocking(move || codec.decode_code(&tokens))
            .await
            .map_err(|e| MyndirError::DecodeFailed(anyhow!("codec task panicked: {}", e)))?
            .map_err(MyndirError::DecodeFailed)?;

        if pixels.shape()[0] != batch {
            return Err(MyndirError::DecodeFailed(anyhow!(
                "codec returned {} images for {} token grids",
                pixels.shape()[0],
                batch
            )));
        }
        to_rgb_images(&pixels).map_err(MyndirError::DecodeFailed)
    }

    async fn prepare_inputs(
        &self,
        request: &GenerationRequest,
        config: &MaskedGenerationConfig,
    ) -> MyndirResult<DecodeInputs> {
        let n = request.num_images_per_prompt;
        match request.prompt()? {
            Prompt::Classes(ids) => {
                if !self.is_class_conditioned() {
                    return Err(DecodeConfigError::ClassConditioningUnsupported.into());
                }
                Ok(DecodeInputs::Classes(repeat_interleave_ids(&ids, n)))
            }
            Prompt::Text { text, negative_text } => {
                if self.is_class_conditioned() {
                    return Err(MyndirError::InvalidConfig(
                        "class-conditioned model requires class ids".to_string(),
                    ));
                }
                let encoder = self.text_encoder.as_ref().ok_or_else(|| {
                    MyndirError::InvalidConfig("text prompts need a text encoder".to_string())
                })?;

                let states = encode(encoder.as_ref(), &text).await?;
                // Without guidance there is no unconditional pass for the
                // negative prompt to replace.
                let negative = match negative_text {
                    Some(_) if config.guidance_scale == 0.0 => {
                        log::warn!("negative prompt ignored: guidance scale is 0");
                        None
                    }
                    Some(negative_text) => Some(encode(encoder.as_ref(), &negative_text).await?),
                    None => None,
                };

                Ok(DecodeInputs::Text {
                    states: repeat_interleave_states(&states, n),
                    negative: negative.map(|neg| repeat_interleave_states(&neg, n)),
                })
            }
        }
    }
}

async fn encode(encoder: &dyn TextEncoder, prompts: &[String]) -> MyndirResult<Array3<f32>> {
    let states = encoder
        .encode(prompts)
        .await
        .map_err(MyndirError::EncodingFailed)?;
    if states.shape()[0] != prompts.len() {
        return Err(MyndirError::EncodingFailed(anyhow!(
            "text encoder returned {} sequences for {} prompts",
            states.shape()[0],
            prompts.len()
        )));
    }
    log::debug!("Encoded {} prompt(s) to {:?}", prompts.len(), states.shape());
    Ok(states)
}
