use anyhow::{anyhow, Result};
use ndarray::{Array1, ArrayView1};
use rand::Rng;
use rand_distr::{Distribution, Gumbel};

use crate::activations::softmax_lane;

/// Lower bound applied to temperatures before dividing logits.
pub const MIN_TEMPERATURE: f32 = 1e-10;

/// Index of the largest value; ties resolve to the lowest index.
pub fn argmax(values: &ArrayView1<f32>) -> usize {
    let mut best = 0;
    for (idx, v) in values.iter().enumerate() {
        if v.total_cmp(&values[best]).is_gt() {
            best = idx;
        }
    }
    best
}

/// Indices sorted by descending value, ties by ascending index.
fn indices_by_descending(logits: &Array1<f32>) -> Vec<usize> {
    let mut indices: Vec<usize> = (0..logits.len()).collect();
    indices.sort_by(|&a, &b| logits[b].total_cmp(&logits[a]).then(a.cmp(&b)));
    indices
}

/// Number of logits kept by [`top_k_fraction_filtering`] for a vocabulary of `vocab`.
pub fn top_k_fraction_count(vocab: usize, threshold: f32) -> usize {
    let k = ((1.0 - threshold) * vocab as f32).ceil();
    (k.max(1.0) as usize).min(vocab)
}

/// Keeps the `ceil((1 - threshold) * V)` highest logits and sets the rest to `-inf`.
///
/// A threshold of `0.9` over a 1024-entry codebook keeps 103 candidates.
pub fn top_k_fraction_filtering(mut logits: Array1<f32>, threshold: f32) -> Array1<f32> {
    if logits.is_empty() {
        return logits;
    }
    let k = top_k_fraction_count(logits.len(), threshold);
    let indices = indices_by_descending(&logits);
    for &idx in &indices[k..] {
        logits[idx] = f32::NEG_INFINITY;
    }
    logits
}

/// Nucleus filtering: keeps the smallest set of highest logits whose
/// probability mass exceeds `p`; everything else becomes `-inf`.
pub fn top_p_filtering(mut logits: Array1<f32>, p: f32) -> Array1<f32> {
    if logits.is_empty() || p >= 1.0 {
        return logits;
    }
    let indices = indices_by_descending(&logits);

    let mut probs = logits.clone();
    softmax_lane(probs.view_mut());

    let mut cumulative = 0.0;
    for (i, &idx) in indices.iter().enumerate() {
        cumulative += probs[idx];
        if cumulative > p {
            for &invalid_idx in &indices[i + 1..] {
                logits[invalid_idx] = f32::NEG_INFINITY;
            }
            break;
        }
    }
    logits
}

/// Probability of `token` under `softmax(logits)`.
#[inline]
pub fn softmax_prob(logits: &ArrayView1<f32>, token: usize) -> f32 {
    let max_logit = logits.iter().cloned().fold(f32::NEG_INFINITY, f32::max);
    let exp_sum: f32 = logits.iter().map(|&x| (x - max_logit).exp()).sum();
    (logits[token] - max_logit).exp() / exp_sum
}

/// Categorical draw from an (unnormalized) probability vector.
pub fn sample_from_probs<R: Rng + ?Sized>(probs: &ArrayView1<f32>, rng: &mut R) -> Result<u32> {
    let total: f32 = probs.iter().filter(|p| p.is_finite()).sum();
    if probs.is_empty() || !(total > 0.0) {
        return Err(anyhow!("cannot sample from a distribution with no mass"));
    }

    let target = rng.gen::<f32>() * total;
    let mut cumulative = 0.0;
    let mut last_nonzero = 0;
    for (idx, &prob) in probs.iter().enumerate() {
        if !(prob > 0.0) || !prob.is_finite() {
            continue;
        }
        last_nonzero = idx;
        cumulative += prob;
        if cumulative > target {
            return Ok(idx as u32);
        }
    }
    // Rounding left `cumulative` just below `target`.
    Ok(last_nonzero as u32)
}

/// Standard Gumbel(0, 1) noise source used for perturbed argmax and
/// confidence jitter.
#[derive(Debug, Clone, Copy)]
pub struct GumbelNoise {
    dist: Gumbel<f32>,
}

impl GumbelNoise {
    pub fn standard() -> Result<Self> {
        let dist = Gumbel::new(0.0, 1.0).map_err(|e| anyhow!("invalid Gumbel parameters: {:?}", e))?;
        Ok(Self { dist })
    }

    #[inline]
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> f32 {
        self.dist.sample(rng)
    }

    /// `argmax(logits / max(temperature, 1e-10) + g)` with fresh noise per entry.
    pub fn argmax<R: Rng + ?Sized>(&self, logits: &ArrayView1<f32>, temperature: f32, rng: &mut R) -> u32 {
        let t = temperature.max(MIN_TEMPERATURE);
        let mut best: Option<(usize, f32)> = None;
        for (idx, &logit) in logits.iter().enumerate() {
            // Filtered entries stay out even if the noise draw is +inf.
            if logit == f32::NEG_INFINITY {
                continue;
            }
            let score = logit / t + self.sample(rng);
            match best {
                Some((_, best_score)) if !score.total_cmp(&best_score).is_gt() => {}
                _ => best = Some((idx, score)),
            }
        }
        best.map(|(idx, _)| idx as u32).unwrap_or(0)
    }
}
