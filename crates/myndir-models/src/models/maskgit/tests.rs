use std::sync::Arc;

use myndir_transformers::normalization::NormType;
use myndir_transformers::traits::MaskedTokenModel;
use myndir_transformers::weights::ModelWeights;
use myndir_transformers::{ConditioningState, DecodePolicy, MaskedDecoder, MaskedGenerationConfig};
use ndarray::{Array, Array1, Array2, Array3, IxDyn};
use ndarray_rand::rand_distr::Uniform;
use ndarray_rand::RandomExt;
use rand::rngs::StdRng;
use rand::SeedableRng;

use super::*;

const CODEBOOK: usize = 16;
const TOKENS: usize = 4;
const HIDDEN: usize = 8;
const ENCODER: usize = 6;

pub(crate) fn text_config() -> MaskGitConfig {
    MaskGitConfig {
        class_name: MASKGIT_CLASS_NAME.to_string(),
        vocab_size: CODEBOOK + 1,
        hidden_size: HIDDEN,
        num_hidden_layers: 2,
        num_attention_heads: 2,
        intermediate_size: 16,
        max_position_embeddings: TOKENS,
        add_cross_attention: true,
        encoder_hidden_size: ENCODER,
        project_encoder_hidden_states: false,
        norm_type: NormType::LayerNorm,
        layer_norm_eps: 1e-5,
        use_normformer: true,
        use_encoder_layernorm: true,
        use_mlm_layer: true,
        use_mlm_layernorm: true,
        use_bias: false,
        codebook_size: CODEBOOK,
        num_vq_tokens: TOKENS,
        num_classes: None,
    }
}

pub(crate) fn class_config(num_classes: usize) -> MaskGitConfig {
    MaskGitConfig {
        vocab_size: CODEBOOK + num_classes + 1,
        max_position_embeddings: TOKENS + 1,
        add_cross_attention: false,
        norm_type: NormType::RmsNorm,
        use_mlm_layer: false,
        num_classes: Some(num_classes),
        ..text_config()
    }
}

struct WeightBuilder<'a> {
    weights: ModelWeights,
    rng: &'a mut StdRng,
    use_bias: bool,
}

impl WeightBuilder<'_> {
    fn matrix(&mut self, name: &str, rows: usize, cols: usize) {
        let w = Array2::random_using((rows, cols), Uniform::new(-0.2f32, 0.2), &mut *self.rng);
        self.weights.insert(name, w.into_dyn());
    }

    fn linear(&mut self, prefix: &str, out: usize, input: usize) {
        self.matrix(&format!("{}.weight", prefix), out, input);
        if self.use_bias {
            self.weights
                .insert(format!("{}.bias", prefix), Array1::<f32>::zeros(out).into_dyn());
        }
    }

    fn norm(&mut self, prefix: &str, width: usize) {
        self.weights
            .insert(format!("{}.weight", prefix), Array1::<f32>::ones(width).into_dyn());
    }

    fn attention(&mut self, prefix: &str, kv_in: usize) {
        self.linear(&format!("{}.query", prefix), HIDDEN, HIDDEN);
        self.linear(&format!("{}.key", prefix), HIDDEN, kv_in);
        self.linear(&format!("{}.value", prefix), HIDDEN, kv_in);
        self.linear(&format!("{}.out", prefix), HIDDEN, HIDDEN);
    }
}

/// Random weights under the checkpoint tensor names for `config`.
pub(crate) fn random_weights(config: &MaskGitConfig, seed: u64) -> ModelWeights {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut b = WeightBuilder {
        weights: ModelWeights::new(),
        rng: &mut rng,
        use_bias: config.use_bias,
    };
    let h = config.hidden_size;

    b.matrix("embed.word_embeddings.weight", config.vocab_size, h);
    b.matrix("embed.position_embeddings.weight", config.max_position_embeddings, h);

    if config.project_encoder_hidden_states {
        b.linear("encoder_proj", h, config.encoder_hidden_size);
        b.norm("encoder_proj_layer_norm", h);
    }

    for i in 0..config.num_hidden_layers {
        let p = format!("transformer_layers.{}", i);
        b.norm(&format!("{}.attn_layer_norm", p), h);
        b.attention(&format!("{}.attention", p), h);
        if config.use_normformer {
            b.norm(&format!("{}.post_attn_layer_norm", p), h);
        }
        if config.add_cross_attention {
            b.norm(&format!("{}.crossattn_layer_norm", p), h);
            b.attention(&format!("{}.crossattention", p), config.cross_attention_kv_size());
            if config.use_normformer {
                b.norm(&format!("{}.post_crossattn_layer_norm", p), h);
            }
        }
        b.norm(&format!("{}.ffn.pre_mlp_layer_norm", p), h);
        b.linear(&format!("{}.ffn.wi_0", p), config.intermediate_size, h);
        b.linear(&format!("{}.ffn.wi_1", p), config.intermediate_size, h);
        if config.use_normformer {
            b.norm(&format!("{}.ffn.mid_mlp_layer_norm", p), config.intermediate_size);
        }
        b.linear(&format!("{}.ffn.wo", p), h, config.intermediate_size);
    }

    if config.use_encoder_layernorm {
        b.norm("encoder_layer_norm", h);
    }
    if config.use_mlm_layer {
        b.linear("mlm_layer.mlm_dense", h, h);
        if config.use_mlm_layernorm {
            b.norm("mlm_layer.mlm_ln", h);
        }
        b.linear("mlm_layer.to_logits", config.vocab_size, h);
    } else {
        b.linear("to_logits", config.vocab_size, h);
    }
    b.weights
}

fn encoder_states(batch: usize, len: usize, width: usize, seed: u64) -> Array3<f32> {
    let mut rng = StdRng::seed_from_u64(seed);
    Array3::random_using((batch, len, width), Uniform::new(-1.0f32, 1.0), &mut rng)
}

#[test]
fn test_forward_shape_text_conditioned() {
    let config = text_config();
    let model = MaskGitTransformer::from_weights(config.clone(), &random_weights(&config, 1)).unwrap();
    assert_eq!(model.num_layers(), 2);

    let ids = Array2::from_elem((2, TOKENS), config.mask_token_id());
    let states = encoder_states(2, 3, ENCODER, 7);
    let logits = model.forward(&ids.view(), Some(&states.view()), None).unwrap();

    assert_eq!(logits.dim(), (2, TOKENS, CODEBOOK + 1));
    assert!(logits.iter().all(|v| v.is_finite()));
}

#[test]
fn test_forward_requires_encoder_states() {
    let config = text_config();
    let model = MaskGitTransformer::from_weights(config.clone(), &random_weights(&config, 1)).unwrap();
    let ids = Array2::<u32>::zeros((1, TOKENS));
    assert!(model.forward(&ids.view(), None, None).is_err());
}

#[test]
fn test_forward_rejects_states_without_cross_attention() {
    let config = class_config(3);
    let model = MaskGitTransformer::from_weights(config.clone(), &random_weights(&config, 2)).unwrap();
    let ids = Array2::<u32>::zeros((1, TOKENS + 1));
    let states = encoder_states(1, 2, ENCODER, 3);
    assert!(model.forward(&ids.view(), Some(&states.view()), None).is_err());
}

#[test]
fn test_forward_rejects_bad_ids_and_lengths() {
    let config = text_config();
    let model = MaskGitTransformer::from_weights(config.clone(), &random_weights(&config, 1)).unwrap();
    let states = encoder_states(1, 2, ENCODER, 3);

    let out_of_vocab = Array2::from_elem((1, TOKENS), (CODEBOOK + 1) as u32);
    assert!(model.forward(&out_of_vocab.view(), Some(&states.view()), None).is_err());

    let too_long = Array2::<u32>::zeros((1, TOKENS + 1));
    assert!(model.forward(&too_long.view(), Some(&states.view()), None).is_err());
}

#[test]
fn test_encoder_mask_changes_output() {
    let config = text_config();
    let model = MaskGitTransformer::from_weights(config.clone(), &random_weights(&config, 4)).unwrap();
    let ids = Array2::from_elem((1, TOKENS), config.mask_token_id());
    let states = encoder_states(1, 3, ENCODER, 5);
    let mask = Array2::from_shape_vec((1, 3), vec![1.0f32, 0.0, 0.0]).unwrap();

    let full = model.forward(&ids.view(), Some(&states.view()), None).unwrap();
    let masked = model
        .forward(&ids.view(), Some(&states.view()), Some(&mask.view()))
        .unwrap();
    let diff: f32 = (&full - &masked).iter().map(|v| v.abs()).sum();
    assert!(diff > 1e-6);
}

#[test]
fn test_projected_encoder_states() {
    let config = MaskGitConfig {
        project_encoder_hidden_states: true,
        use_bias: true,
        ..text_config()
    };
    let model = MaskGitTransformer::from_weights(config.clone(), &random_weights(&config, 8)).unwrap();
    let ids = Array2::from_elem((1, TOKENS), 3u32);
    let states = encoder_states(1, 2, ENCODER, 9);
    let logits = model.forward(&ids.view(), Some(&states.view()), None).unwrap();
    assert_eq!(logits.dim(), (1, TOKENS, CODEBOOK + 1));
}

#[test]
fn test_missing_tensor_is_reported() {
    let config = text_config();
    let mut tensors = random_weights(&config, 1);
    let mut stripped = ModelWeights::new();
    for name in tensors.tensor_names() {
        if !name.starts_with("transformer_layers.1.ffn.wo") {
            stripped.insert(name, tensors.get(name).unwrap().clone());
        }
    }
    tensors = stripped;
    let err = MaskGitTransformer::from_weights(config, &tensors).err().unwrap();
    assert!(err.to_string().contains("transformer_layers.1.ffn.wo.weight"));
}

#[test]
fn test_wrong_cross_attention_width() {
    let config = text_config();
    let weights = random_weights(&config, 1);
    let narrower = MaskGitConfig {
        encoder_hidden_size: ENCODER + 2,
        ..config
    };
    assert!(MaskGitTransformer::from_weights(narrower, &weights).is_err());
}

#[test]
fn test_layer_norm_type_follows_config() {
    let config = class_config(3);
    let model = MaskGitTransformer::from_weights(config.clone(), &random_weights(&config, 2)).unwrap();
    let any = (&model as &dyn MaskedTokenModel).as_any();
    let concrete = any.downcast_ref::<MaskGitTransformer>().unwrap();
    assert_eq!(concrete.config().norm_type, NormType::RmsNorm);
}

#[test]
fn test_end_to_end_text_decode() {
    let config = text_config();
    let model: Arc<dyn MaskedTokenModel> =
        Arc::new(MaskGitTransformer::from_weights(config.clone(), &random_weights(&config, 11)).unwrap());

    let states = encoder_states(2, 3, ENCODER, 12);
    let negative = Array3::<f32>::zeros((2, 3, ENCODER));
    let conditioning = ConditioningState::text(states.view()).with_negative(negative.view());

    for policy in [DecodePolicy::ScoreOrdered, DecodePolicy::Confidence] {
        let decoder = MaskedDecoder::new(model.clone()).with_config(MaskedGenerationConfig {
            timesteps: 4,
            guidance_scale: 3.0,
            policy,
            ..Default::default()
        });
        let mut rng = StdRng::seed_from_u64(5);
        let output = decoder.decode(&conditioning, None, &mut rng).unwrap();

        assert_eq!(output.tokens.dim(), (2, TOKENS));
        assert!(output.tokens.iter().all(|&id| (id as usize) < CODEBOOK));
        assert_eq!(output.rounds.len(), 4);
    }
}

#[test]
fn test_end_to_end_class_decode_is_deterministic() {
    let config = class_config(3);
    let model: Arc<dyn MaskedTokenModel> =
        Arc::new(MaskGitTransformer::from_weights(config.clone(), &random_weights(&config, 21)).unwrap());
    let class_ids = [0u32, 2];
    let decoder = MaskedDecoder::new(model).with_config(MaskedGenerationConfig {
        timesteps: 3,
        ..Default::default()
    });

    let run = |seed| {
        let mut rng = StdRng::seed_from_u64(seed);
        decoder
            .generate(&ConditioningState::classes(&class_ids), &mut rng)
            .unwrap()
    };
    let first = run(9);
    assert_eq!(first, run(9));
    assert_eq!(first.dim(), (2, TOKENS));
    assert!(first.iter().all(|&id| (id as usize) < CODEBOOK));
}

#[test]
fn test_weights_have_expected_rank() {
    let config = text_config();
    let weights = random_weights(&config, 1);
    let table = weights.get("embed.word_embeddings.weight").unwrap();
    assert_eq!(table.shape(), &[CODEBOOK + 1, HIDDEN]);
    let bad = Array::<f32, _>::zeros(IxDyn(&[HIDDEN, HIDDEN, 1]));
    let mut broken = weights.clone();
    broken.insert("encoder_layer_norm.weight", bad);
    assert!(MaskGitTransformer::from_weights(config, &broken).is_err());
}
