//! Iterative parallel decoding.
//!
//! A call starts from a fully masked grid (or a caller-supplied partial one)
//! and runs `timesteps` rounds. Every round runs the codebook logit model
//! once (twice with guidance), samples the masked positions and picks the
//! positions that go back to the mask token for the next round. The grid
//! returned after the terminal round never contains the mask token.

use std::sync::Arc;

use anyhow::{anyhow, Result};
use ndarray::{s, Array1, Array2, Array3, ArrayView2};
use rand::Rng;

use super::conditioning::ConditioningState;
use super::error::DecodeConfigError;
use super::logits::{CodebookLogitModel, GuidanceMode};
use super::remask::{confidence_mask_len, perturbed_confidence, select_highest, select_lowest};
use crate::activations::softmax_lane;
use crate::common::cancellation::CancellationToken;
use crate::common::sampling::{sample_from_probs, softmax_prob, GumbelNoise};
use crate::common::{DecodePolicy, MaskedGenerationConfig};
use crate::traits::{MaskedModelMetadata, MaskedTokenModel};

/// What happened in one round, for inspection and tests.
#[derive(Debug, Clone, PartialEq)]
pub struct RoundTrace {
    pub round: usize,
    /// Schedule input used for this round.
    pub progress: f32,
    /// Temperature used for sampling (score-ordered) or jitter (confidence).
    pub temperature: f32,
    /// Masked positions across the batch when the forward pass ran.
    pub masked_before: usize,
    /// Masked positions across the batch when the round finished.
    pub masked_after: usize,
}

#[derive(Debug, Clone)]
pub struct DecodeOutput {
    /// `[batch, num_vq_tokens]`, every entry in `0..codebook_size`.
    pub tokens: Array2<u32>,
    pub rounds: Vec<RoundTrace>,
}

pub struct MaskedDecoder {
    logits: CodebookLogitModel,
    config: MaskedGenerationConfig,
    cancellation: CancellationToken,
}

impl MaskedDecoder {
    pub fn new(model: Arc<dyn MaskedTokenModel>) -> Self {
        Self {
            logits: CodebookLogitModel::new(model),
            config: MaskedGenerationConfig::default(),
            cancellation: CancellationToken::never(),
        }
    }

    pub fn with_config(mut self, config: MaskedGenerationConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }

    pub fn config(&self) -> &MaskedGenerationConfig {
        &self.config
    }

    pub fn metadata(&self) -> &MaskedModelMetadata {
        self.logits.metadata()
    }

    /// Decodes a fresh, fully masked grid and returns the final tokens.
    pub fn generate<R: Rng + ?Sized>(
        &self,
        conditioning: &ConditioningState<'_>,
        rng: &mut R,
    ) -> Result<Array2<u32>> {
        Ok(self.decode(conditioning, None, rng)?.tokens)
    }

    /// Full decode with an optional starting grid.
    ///
    /// Positions of `initial_grid` that hold a codebook id are kept as they
    /// are; only positions holding the mask token are generated.
    pub fn decode<R: Rng + ?Sized>(
        &self,
        conditioning: &ConditioningState<'_>,
        initial_grid: Option<&ArrayView2<u32>>,
        rng: &mut R,
    ) -> Result<DecodeOutput> {
        let batch = self.validate(conditioning, initial_grid)?;
        let meta = self.metadata();
        let mask_id = meta.mask_token_id();

        let grid = match initial_grid {
            Some(grid) => grid.to_owned(),
            None => Array2::from_elem((batch, meta.num_vq_tokens), mask_id),
        };

        let mode = GuidanceMode::resolve(conditioning, self.config.guidance_scale);
        log::debug!(
            "Masked decode: batch={}, tokens={}, timesteps={}, policy={:?}, guidance={:?}",
            batch,
            meta.num_vq_tokens,
            self.config.timesteps,
            self.config.policy,
            mode
        );

        let noise = GumbelNoise::standard()?;
        match self.config.policy {
            DecodePolicy::ScoreOrdered => self.run_score_ordered(grid, conditioning, &noise, rng),
            DecodePolicy::Confidence => self.run_confidence(grid, conditioning, &noise, rng),
        }
    }

    /// All preconditions, checked before any forward pass. Returns the batch size.
    fn validate(
        &self,
        conditioning: &ConditioningState<'_>,
        initial_grid: Option<&ArrayView2<u32>>,
    ) -> Result<usize, DecodeConfigError> {
        self.config.validate()?;
        let meta = self.metadata();
        meta.validate()?;
        let batch = conditioning.validate(meta)?;

        if conditioning.is_class_conditioned() && self.config.guidance_scale > 0.0 {
            log::warn!(
                "guidance scale {} ignored for class-conditioned generation",
                self.config.guidance_scale
            );
        }

        if let Some(grid) = initial_grid {
            let (rows, cols) = grid.dim();
            if rows != batch {
                return Err(DecodeConfigError::BatchSizeMismatch {
                    what: "initial grid",
                    expected: batch,
                    actual: rows,
                });
            }
            if cols != meta.num_vq_tokens {
                return Err(DecodeConfigError::SequenceLengthMismatch {
                    what: "initial grid",
                    expected: meta.num_vq_tokens,
                    actual: cols,
                });
            }
            let mask_id = meta.mask_token_id();
            for (position, &id) in grid.iter().enumerate() {
                if id != mask_id && id as usize >= meta.codebook_size {
                    return Err(DecodeConfigError::InvalidTokenId { id, position });
                }
            }
        }
        Ok(batch)
    }

    fn forward(&self, grid: &Array2<u32>, conditioning: &ConditioningState<'_>) -> Result<Array3<f32>> {
        self.logits
            .compute_logits(&grid.view(), conditioning, self.config.guidance_scale)
    }

    /// Score-ordered remasking.
    ///
    /// Round `r` of `T` uses progress `r / (T - 1)` (0 for a single round),
    /// forces the `max(floor(ratio * N), 1)` highest-scoring positions to the
    /// mask token, fills every masked position by Gumbel-max over the
    /// filtered logits at temperature `t0 * (T - 1 - r) / T`, then rescores
    /// each position as `1 - p(prediction)`.
    fn run_score_ordered<R: Rng + ?Sized>(
        &self,
        mut grid: Array2<u32>,
        conditioning: &ConditioningState<'_>,
        noise: &GumbelNoise,
        rng: &mut R,
    ) -> Result<DecodeOutput> {
        let meta = self.metadata();
        let mask_id = meta.mask_token_id();
        let (batch, seq) = grid.dim();
        let timesteps = self.config.timesteps;

        // Positions handed in already decided are never touched.
        let free: Vec<Vec<bool>> = grid
            .rows()
            .into_iter()
            .map(|row| row.iter().map(|&id| id == mask_id).collect())
            .collect();
        let mut scores = Array2::<f32>::zeros((batch, seq));
        let mut rounds = Vec::with_capacity(timesteps);

        for round in 0..timesteps {
            self.cancellation.check(round)?;

            let progress = if timesteps > 1 {
                round as f32 / (timesteps - 1) as f32
            } else {
                0.0
            };
            let steps_until_done = timesteps - 1 - round;
            let temperature = self.config.temperature * steps_until_done as f32 / timesteps as f32;
            let target = self.config.schedule.num_tokens_to_mask(progress, seq);

            for b in 0..batch {
                let selected = select_highest(&scores.row(b), &free[b], target);
                for pos in selected {
                    grid[[b, pos]] = mask_id;
                }
            }
            let masked_before = count_masked(&grid, mask_id);

            let logits = self.forward(&grid, conditioning)?;

            for b in 0..batch {
                for pos in 0..seq {
                    if !free[b][pos] {
                        continue;
                    }
                    let row = logits.slice(s![b, pos, ..]);
                    let filtered = self.config.filter.apply(row.to_owned());
                    let pred = noise.argmax(&filtered.view(), temperature, rng);

                    if grid[[b, pos]] == mask_id {
                        grid[[b, pos]] = pred;
                    }
                    scores[[b, pos]] = 1.0 - softmax_prob(&row, pred as usize);
                }
            }

            let trace = RoundTrace {
                round,
                progress,
                temperature,
                masked_before,
                masked_after: count_masked(&grid, mask_id),
            };
            log::debug!(
                "round {}/{}: progress={:.3}, masked={}, temperature={:.4}",
                round + 1,
                timesteps,
                progress,
                trace.masked_before,
                temperature
            );
            rounds.push(trace);
        }

        finish(grid, rounds, meta)
    }

    /// Confidence-based remasking (canonical MaskGIT).
    ///
    /// Round `r` of `T` samples every masked position from
    /// `softmax(logits)`, keeps decided positions, and, unless it is the
    /// terminal round, masks the `clamp(floor(N * ratio), 1, unknown - 1)`
    /// least confident new samples, where `ratio = schedule((r + 1) / T)` and
    /// confidence is `ln(p) + t0 * (1 - (r + 1) / T) * gumbel`.
    fn run_confidence<R: Rng + ?Sized>(
        &self,
        mut grid: Array2<u32>,
        conditioning: &ConditioningState<'_>,
        noise: &GumbelNoise,
        rng: &mut R,
    ) -> Result<DecodeOutput> {
        let meta = self.metadata();
        let mask_id = meta.mask_token_id();
        let (batch, seq) = grid.dim();
        let timesteps = self.config.timesteps;
        let mut rounds = Vec::with_capacity(timesteps);

        for round in 0..timesteps {
            self.cancellation.check(round)?;

            let masked_before = count_masked(&grid, mask_id);
            let logits = self.forward(&grid, conditioning)?;

            let progress = (round + 1) as f32 / timesteps as f32;
            let temperature = self.config.temperature * (1.0 - progress);
            let is_terminal = round + 1 == timesteps;
            let floor_count = self.config.schedule.mask_count(progress, seq);

            let mut next = grid.clone();
            for b in 0..batch {
                let unknown: Vec<bool> = grid.row(b).iter().map(|&id| id == mask_id).collect();
                let unknown_count = unknown.iter().filter(|&&u| u).count();
                let mut selected_probs = Array1::<f32>::from_elem(seq, f32::INFINITY);

                for pos in 0..seq {
                    if !unknown[pos] {
                        continue;
                    }
                    let mut probs = logits.slice(s![b, pos, ..]).to_owned();
                    softmax_lane(probs.view_mut());
                    let sampled = sample_from_probs(&probs.view(), rng)?;
                    next[[b, pos]] = sampled;
                    selected_probs[pos] = probs[sampled as usize];
                }

                if is_terminal || unknown_count == 0 {
                    continue;
                }

                let mask_len = confidence_mask_len(floor_count, unknown_count);
                let confidence =
                    perturbed_confidence(&selected_probs.view(), &unknown, temperature, noise, rng);
                let remask = select_lowest(&Array1::from(confidence).view(), &unknown, mask_len);
                log::trace!(
                    "round {} row {}: unknown={}, re-masking {}",
                    round,
                    b,
                    unknown_count,
                    remask.len()
                );
                for pos in remask {
                    next[[b, pos]] = mask_id;
                }
            }
            grid = next;

            let trace = RoundTrace {
                round,
                progress,
                temperature,
                masked_before,
                masked_after: count_masked(&grid, mask_id),
            };
            log::debug!(
                "round {}/{}: progress={:.3}, masked {} -> {}, temperature={:.4}",
                round + 1,
                timesteps,
                progress,
                trace.masked_before,
                trace.masked_after,
                temperature
            );
            rounds.push(trace);
        }

        finish(grid, rounds, meta)
    }
}

fn count_masked(grid: &Array2<u32>, mask_id: u32) -> usize {
    grid.iter().filter(|&&id| id == mask_id).count()
}

fn finish(tokens: Array2<u32>, rounds: Vec<RoundTrace>, meta: &MaskedModelMetadata) -> Result<DecodeOutput> {
    if let Some(id) = tokens.iter().find(|&&id| id as usize >= meta.codebook_size) {
        return Err(anyhow!(
            "decode finished with non-codebook token {} (codebook size {})",
            id,
            meta.codebook_size
        ));
    }
    Ok(DecodeOutput { tokens, rounds })
}
