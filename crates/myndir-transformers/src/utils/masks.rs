use anyhow::{anyhow, Result};
use ndarray::{Array4, ArrayView2, Axis};

/// Score written over keys that must not be attended to.
pub const MASK_VALUE: f32 = -1e9;

/// Masks attention scores of keys whose `mask[batch, key]` is zero.
///
/// `scores` is `[batch, heads, queries, keys]`.
pub fn apply_padding_mask(mut scores: Array4<f32>, mask: &ArrayView2<f32>) -> Result<Array4<f32>> {
    let (batch, _, _, keys) = scores.dim();
    if mask.dim() != (batch, keys) {
        return Err(anyhow!(
            "key mask {:?} does not cover {} sequences of {} keys",
            mask.shape(),
            batch,
            keys
        ));
    }

    for (mut per_batch, keep) in scores.axis_iter_mut(Axis(0)).zip(mask.outer_iter()) {
        for (key, _) in keep.iter().enumerate().filter(|(_, m)| **m == 0.0) {
            per_batch.index_axis_mut(Axis(2), key).fill(MASK_VALUE);
        }
    }
    Ok(scores)
}
