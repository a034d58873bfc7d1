//! Choosing which positions go back to the mask token.
//!
//! Both selectors work on a single grid row and break ties by position so a
//! seeded decode is reproducible.

use std::cmp::Ordering;

use ndarray::ArrayView1;
use rand::Rng;

use crate::common::sampling::GumbelNoise;

/// Positions holding the `count` highest scores among `eligible` ones.
///
/// Used by the score-ordered policy, where a high score means "least sure
/// about this token".
pub fn select_highest(scores: &ArrayView1<f32>, eligible: &[bool], count: usize) -> Vec<usize> {
    select_by(scores, eligible, count, |a, b| b.total_cmp(a))
}

/// Positions holding the `count` lowest scores among `eligible` ones.
pub fn select_lowest(scores: &ArrayView1<f32>, eligible: &[bool], count: usize) -> Vec<usize> {
    select_by(scores, eligible, count, |a, b| a.total_cmp(b))
}

fn select_by<F>(scores: &ArrayView1<f32>, eligible: &[bool], count: usize, order: F) -> Vec<usize>
where
    F: Fn(&f32, &f32) -> Ordering,
{
    let mut candidates: Vec<usize> = (0..scores.len()).filter(|&i| eligible[i]).collect();
    candidates.sort_by(|&a, &b| order(&scores[a], &scores[b]).then(a.cmp(&b)));
    candidates.truncate(count);
    candidates.sort_unstable();
    candidates
}

/// Number of positions to re-mask after a confidence round:
/// `clamp(floor_count, 1, unknown - 1)`, with the floor of 1 winning when
/// fewer than two positions were unknown.
pub fn confidence_mask_len(floor_count: usize, unknown: usize) -> usize {
    floor_count.min(unknown.saturating_sub(1)).max(1)
}

/// Noisy confidence used to rank candidates for re-masking.
///
/// Unknown positions score `ln(p) + temperature * g` with `g ~ Gumbel(0, 1)`;
/// decided positions are pinned to `+inf`. No noise is drawn when the
/// temperature is zero.
pub fn perturbed_confidence<R: Rng + ?Sized>(
    selected_probs: &ArrayView1<f32>,
    unknown: &[bool],
    temperature: f32,
    noise: &GumbelNoise,
    rng: &mut R,
) -> Vec<f32> {
    selected_probs
        .iter()
        .zip(unknown)
        .map(|(&p, &is_unknown)| {
            if !is_unknown {
                return f32::INFINITY;
            }
            let log_p = p.ln();
            if temperature > 0.0 {
                log_p + temperature * noise.sample(rng)
            } else {
                log_p
            }
        })
        .collect()
}
