//! Classifier-free guidance.

use anyhow::{anyhow, Result};
use ndarray::{Array3, Zip};

/// `uncond + scale * (cond - uncond)`, element-wise.
///
/// The algebra is arranged so that `scale == 0` returns `uncond` and
/// `scale == 1` returns `cond` bit for bit.
pub fn mix(cond: &Array3<f32>, uncond: &Array3<f32>, scale: f32) -> Result<Array3<f32>> {
    if cond.shape() != uncond.shape() {
        return Err(anyhow!(
            "conditional logits {:?} and unconditional logits {:?} differ in shape",
            cond.shape(),
            uncond.shape()
        ));
    }
    let mut out = uncond.clone();
    Zip::from(&mut out).and(cond).for_each(|u, &c| {
        *u = mix_scalar(c, *u, scale);
    });
    Ok(out)
}

#[inline]
fn mix_scalar(cond: f32, uncond: f32, scale: f32) -> f32 {
    if scale == 0.0 {
        uncond
    } else if scale == 1.0 {
        cond
    } else {
        uncond + scale * (cond - uncond)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray_rand::rand_distr::Uniform;
    use ndarray_rand::RandomExt;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn random_pair() -> (Array3<f32>, Array3<f32>) {
        let mut rng = StdRng::seed_from_u64(17);
        let cond = Array3::random_using((2, 5, 7), Uniform::new(-8.0, 8.0), &mut rng);
        let uncond = Array3::random_using((2, 5, 7), Uniform::new(-8.0, 8.0), &mut rng);
        (cond, uncond)
    }

    #[test]
    fn test_scale_zero_is_uncond() {
        let (cond, uncond) = random_pair();
        assert_eq!(mix(&cond, &uncond, 0.0).unwrap(), uncond);
    }

    #[test]
    fn test_scale_one_is_cond() {
        let (cond, uncond) = random_pair();
        assert_eq!(mix(&cond, &uncond, 1.0).unwrap(), cond);
    }

    #[test]
    fn test_extrapolates() {
        let cond = Array3::from_elem((1, 1, 2), 2.0);
        let uncond = Array3::from_elem((1, 1, 2), 1.0);
        let mixed = mix(&cond, &uncond, 3.0).unwrap();
        assert_relative_eq!(mixed[[0, 0, 0]], 4.0);
    }

    #[test]
    fn test_shape_mismatch() {
        let cond = Array3::zeros((1, 2, 3));
        let uncond = Array3::zeros((1, 3, 3));
        assert!(mix(&cond, &uncond, 2.0).is_err());
    }
}
