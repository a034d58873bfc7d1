//! GELU and softmax kernels used by the attention and feed-forward blocks.

use libm::{erff, tanhf};
use ndarray::{parallel::prelude::*, ArrayBase, ArrayViewMut1, Axis, DataMut, Dimension};
use serde::{Deserialize, Serialize};

/// Element count above which activations run on the rayon pool.
pub const PAR_MIN_ELEMENTS: usize = 1 << 14;

const FRAC_1_SQRT_2: f32 = std::f32::consts::FRAC_1_SQRT_2;
// sqrt(2 / pi)
const TANH_SCALE: f32 = 0.797_884_6;

/// Feed-forward nonlinearity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Activation {
    /// Erf form, as `torch.nn.GELU()`.
    #[default]
    Gelu,
    /// Tanh approximation, as `GELU(approximate="tanh")`.
    #[serde(alias = "gelu_new")]
    GeluTanh,
}

impl Activation {
    #[inline(always)]
    pub fn eval(self, x: f32) -> f32 {
        match self {
            Activation::Gelu => gelu_scalar(x),
            Activation::GeluTanh => {
                let u = TANH_SCALE * (x + 0.044_715 * x * x * x);
                0.5 * x * (1.0 + tanhf(u))
            }
        }
    }
}

#[inline(always)]
pub fn gelu_scalar(x: f32) -> f32 {
    0.5 * x * (1.0 + erff(x * FRAC_1_SQRT_2))
}

/// Applies `activation` elementwise, in place, to an array of any rank.
pub fn apply_activation<S, D>(values: &mut ArrayBase<S, D>, activation: Activation)
where
    S: DataMut<Elem = f32>,
    D: Dimension,
{
    let f = move |x: f32| activation.eval(x);
    if values.len() < PAR_MIN_ELEMENTS {
        values.mapv_inplace(f);
    } else {
        values.par_mapv_inplace(f);
    }
}

/// Normalizes one lane into a probability distribution.
///
/// Entries at `-inf` come out as exactly zero. A lane that is entirely
/// `-inf` turns into NaN.
pub fn softmax_lane(mut lane: ArrayViewMut1<f32>) {
    if lane.is_empty() {
        return;
    }
    let peak = lane.fold(f32::NEG_INFINITY, |m, &v| m.max(v));
    let mut total = 0.0f32;
    lane.map_inplace(|v| {
        *v = (*v - peak).exp();
        total += *v;
    });
    if total > 0.0 {
        let inv = total.recip();
        lane.map_inplace(|v| *v *= inv);
    }
}

/// Softmax over the last axis of an array of any rank.
pub fn softmax_last_axis<S, D>(values: &mut ArrayBase<S, D>)
where
    S: DataMut<Elem = f32>,
    D: Dimension,
{
    let last = Axis(values.ndim() - 1);
    values.lanes_mut(last).into_iter().for_each(softmax_lane);
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::{array, s, Array2, Array3, Array4};

    #[test]
    fn test_gelu_reference_points() {
        assert_relative_eq!(gelu_scalar(0.0), 0.0);
        assert_relative_eq!(gelu_scalar(1.0), 0.841_344_7, epsilon = 1e-5);
        assert_relative_eq!(gelu_scalar(-1.0), -0.158_655_3, epsilon = 1e-5);
        assert_relative_eq!(Activation::GeluTanh.eval(1.0), 0.841_192, epsilon = 1e-5);
    }

    #[test]
    fn test_activation_deserializes_aliases() {
        let a: Activation = serde_json::from_str("\"gelu\"").unwrap();
        let b: Activation = serde_json::from_str("\"gelu_new\"").unwrap();
        assert_eq!(a, Activation::Gelu);
        assert_eq!(b, Activation::GeluTanh);
    }

    #[test]
    fn test_apply_activation_small_and_large() {
        let mut small = Array3::from_elem((1, 2, 3), 1.0f32);
        apply_activation(&mut small, Activation::Gelu);
        assert!(small.iter().all(|&v| (v - 0.841_344_7).abs() < 1e-5));

        let cols = PAR_MIN_ELEMENTS + 7;
        let mut large = Array2::from_elem((1, cols), -1.0f32);
        apply_activation(&mut large, Activation::Gelu);
        assert_relative_eq!(large[[0, cols - 1]], -0.158_655_3, epsilon = 1e-5);
    }

    #[test]
    fn test_softmax_orders_and_normalizes() {
        let mut p = array![1.0f32, 2.0, 3.0];
        softmax_lane(p.view_mut());
        assert_relative_eq!(p.sum(), 1.0, epsilon = 1e-6);
        assert!(p[0] < p[1] && p[1] < p[2]);
    }

    #[test]
    fn test_softmax_large_logits_stay_finite() {
        let mut p = array![1000.0f32, 1001.0, 1002.0];
        softmax_lane(p.view_mut());
        assert!(p.iter().all(|v| v.is_finite()));
        assert_relative_eq!(p.sum(), 1.0, epsilon = 1e-6);
    }

    #[test]
    fn test_softmax_masked_entry_is_zero() {
        let mut p = array![0.0f32, f32::NEG_INFINITY, 0.0];
        softmax_lane(p.view_mut());
        assert_eq!(p[1], 0.0);
        assert_relative_eq!(p[2], 0.5, epsilon = 1e-6);
    }

    #[test]
    fn test_softmax_last_axis_rank4() {
        let mut scores = Array4::from_shape_fn((2, 3, 2, 5), |(b, h, q, k)| (b * h + q * k) as f32 * 0.3);
        softmax_last_axis(&mut scores);
        for row in scores.lanes(Axis(3)) {
            assert_relative_eq!(row.sum(), 1.0, epsilon = 1e-5);
        }
        // Non-contiguous views go through the same path.
        let mut wide = Array2::from_shape_fn((3, 4), |(i, j)| (i + j) as f32);
        let mut cols = wide.slice_mut(s![.., ..2]);
        softmax_last_axis(&mut cols);
        assert_relative_eq!(wide[[1, 0]] + wide[[1, 1]], 1.0, epsilon = 1e-6);
    }
}
