//! Scale-only normalization: `y = x / sqrt(mean(x^2) + eps) * weight`.
//!
//! No mean subtraction and no bias.

use ndarray::{Array1, Array3, Axis, Zip};

#[derive(Debug, Clone)]
pub struct RMSNorm {
    pub weight: Array1<f32>,
    pub eps: f32,
}

impl RMSNorm {
    pub fn new(weight: Array1<f32>, eps: f32) -> Self {
        Self { weight, eps }
    }

    pub fn forward_3d(&self, hidden: &Array3<f32>) -> Array3<f32> {
        let mut out = hidden.to_owned();
        let width = hidden.len_of(Axis(2)) as f32;
        for mut row in out.lanes_mut(Axis(2)) {
            let ms = row.fold(0.0f32, |acc, &x| acc + x * x) / width;
            let inv_rms = (ms + self.eps).sqrt().recip();
            Zip::from(&mut row)
                .and(&self.weight)
                .for_each(|x, &g| *x *= inv_rms * g);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_divides_by_root_mean_square() {
        let norm = RMSNorm::new(Array1::ones(2), 0.0);
        let x = Array3::from_shape_vec((1, 1, 2), vec![3.0, 4.0]).unwrap();
        let y = norm.forward_3d(&x);

        let rms = 12.5f32.sqrt();
        assert_abs_diff_eq!(y[[0, 0, 0]], 3.0 / rms, epsilon = 1e-6);
        assert_abs_diff_eq!(y[[0, 0, 1]], 4.0 / rms, epsilon = 1e-6);
    }

    #[test]
    fn test_weight_scales_each_channel() {
        let norm = RMSNorm::new(Array1::from(vec![2.0, 0.5]), 1e-6);
        let x = Array3::from_shape_vec((1, 1, 2), vec![1.0, 1.0]).unwrap();
        let y = norm.forward_3d(&x);
        assert_abs_diff_eq!(y[[0, 0, 0]], 2.0, epsilon = 1e-4);
        assert_abs_diff_eq!(y[[0, 0, 1]], 0.5, epsilon = 1e-4);
    }
}
