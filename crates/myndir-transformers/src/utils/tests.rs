use super::linear_algebra::{batched_matmul, matmul_3d_nt, matmul_nt};
use super::masks::{apply_padding_mask, MASK_VALUE};
use approx::assert_abs_diff_eq;
use ndarray::{array, s, Array1, Array2, Array3, Array4, ArrayView2};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

fn uniform_matrix(rows: usize, cols: usize, seed: u64) -> Array2<f32> {
    let mut rng = StdRng::seed_from_u64(seed);
    Array2::from_shape_fn((rows, cols), |_| rng.gen_range(-1.0..1.0))
}

#[test]
fn test_matmul_nt_agrees_with_dot() {
    let x = uniform_matrix(4, 6, 3);
    let w = uniform_matrix(9, 6, 4);
    let got = matmul_nt(&x.view(), &w.view()).unwrap();
    assert_eq!(got.dim(), (4, 9));
    for (g, e) in got.iter().zip(x.dot(&w.t()).iter()) {
        assert_abs_diff_eq!(g, e, epsilon = 1e-5);
    }
}

#[test]
fn test_matmul_nt_accepts_strided_input() {
    let x = uniform_matrix(6, 4, 8);
    let w = uniform_matrix(3, 2, 9);
    let cols = x.slice(s![.., 1..3]);
    let got = matmul_nt(&cols, &w.view()).unwrap();
    for (g, e) in got.iter().zip(cols.dot(&w.t()).iter()) {
        assert_abs_diff_eq!(g, e, epsilon = 1e-5);
    }
}

#[test]
fn test_matmul_nt_rejects_inner_mismatch() {
    let x = Array2::<f32>::zeros((2, 3));
    let w = Array2::<f32>::zeros((2, 4));
    assert!(matmul_nt(&x.view(), &w.view()).is_err());
}

#[test]
fn test_matmul_3d_nt_projects_each_position() {
    let x = Array3::from_shape_fn((2, 3, 4), |(b, t, d)| (b * 12 + t * 4 + d) as f32 * 0.01);
    let w = uniform_matrix(5, 4, 5);
    let out = matmul_3d_nt(&x, &w).unwrap();
    assert_eq!(out.dim(), (2, 3, 5));

    let expected: Array1<f32> = w.dot(&x.slice(s![1, 2, ..]));
    for j in 0..5 {
        assert_abs_diff_eq!(out[[1, 2, j]], expected[j], epsilon = 1e-5);
    }
}

#[test]
fn test_batched_matmul_matches_each_head() {
    let a = Array4::from_shape_fn((2, 2, 2, 3), |(n, h, i, k)| (n + h + i + k) as f32);
    let b = Array4::from_shape_fn((2, 2, 3, 4), |(n, h, k, j)| (n * h * k + j) as f32 * 0.5);
    let out = batched_matmul(&a, &b).unwrap();
    assert_eq!(out.dim(), (2, 2, 2, 4));

    for n in 0..2 {
        for h in 0..2 {
            let a_nh: ArrayView2<f32> = a.slice(s![n, h, .., ..]);
            let expected: Array2<f32> = a_nh.dot(&b.slice(s![n, h, .., ..]));
            for ((i, j), e) in expected.indexed_iter() {
                assert_abs_diff_eq!(out[[n, h, i, j]], *e, epsilon = 1e-5);
            }
        }
    }
    assert!(batched_matmul(&a, &a).is_err());
}

#[test]
fn test_padding_mask_masks_zero_keys() {
    let scores = Array4::<f32>::zeros((1, 2, 2, 3));
    let mask = array![[1.0f32, 0.0, 1.0]];
    let masked = apply_padding_mask(scores, &mask.view()).unwrap();
    for h in 0..2 {
        for q in 0..2 {
            assert_eq!(masked[[0, h, q, 1]], MASK_VALUE);
            assert_eq!(masked[[0, h, q, 0]], 0.0);
        }
    }
}

#[test]
fn test_padding_mask_shape_errors() {
    let scores = Array4::<f32>::zeros((2, 1, 2, 3));
    let wrong_batch = array![[1.0f32, 1.0, 1.0]];
    assert!(apply_padding_mask(scores.clone(), &wrong_batch.view()).is_err());

    let wrong_len = Array2::<f32>::ones((2, 4));
    assert!(apply_padding_mask(scores, &wrong_len.view()).is_err());
}
