//! faer-backed products over ndarray storage.
//!
//! Weight matrices keep the checkpoint `[out, in]` layout, so the projection
//! kernels multiply by the transpose without materializing it.

use anyhow::{anyhow, Result};
use faer::{MatRef, Parallelism};
use ndarray::{Array2, Array3, Array4, ArrayView2, Zip};

/// Borrows `x` as a row-major faer matrix, copying only when `x` is strided.
fn with_row_major<R>(x: &ArrayView2<f32>, f: impl FnOnce(MatRef<'_, f32>) -> R) -> R {
    let (rows, cols) = x.dim();
    let packed: Vec<f32>;
    let data = match x.as_slice() {
        Some(data) => data,
        None => {
            packed = x.iter().copied().collect();
            &packed
        }
    };
    f(faer::mat::from_row_major_slice(data, rows, cols))
}

/// `dst = lhs @ rhs`, with `dst` a row-major `[lhs.nrows(), rhs.ncols()]` buffer.
fn gemm_into(dst: &mut [f32], lhs: MatRef<'_, f32>, rhs: MatRef<'_, f32>, par: Parallelism) {
    let dst = faer::mat::from_row_major_slice_mut(dst, lhs.nrows(), rhs.ncols());
    faer::linalg::matmul::matmul(dst, lhs, rhs, None, 1.0, par);
}

/// `x @ w^T` for `x: [m, k]` and `w: [n, k]`.
pub fn matmul_nt(x: &ArrayView2<f32>, w: &ArrayView2<f32>) -> Result<Array2<f32>> {
    let (m, k) = x.dim();
    let (n, wk) = w.dim();
    if k != wk {
        return Err(anyhow!("cannot multiply [{}, {}] by the transpose of [{}, {}]", m, k, n, wk));
    }
    let mut buf = vec![0.0f32; m * n];
    with_row_major(x, |lhs| {
        with_row_major(w, |rhs| gemm_into(&mut buf, lhs, rhs.transpose(), Parallelism::Rayon(0)))
    });
    Ok(Array2::from_shape_vec((m, n), buf)?)
}

/// [`matmul_nt`] applied to every row of a `[batch, seq, k]` tensor.
pub fn matmul_3d_nt(x: &Array3<f32>, w: &Array2<f32>) -> Result<Array3<f32>> {
    let (batch, seq, k) = x.dim();
    let contiguous = x.as_standard_layout();
    let rows = contiguous.view().into_shape_with_order((batch * seq, k))?;
    let out = matmul_nt(&rows, &w.view())?;
    let n = out.ncols();
    Ok(out.into_shape_with_order((batch, seq, n))?)
}

/// Per-head products `[b, h, m, k] @ [b, h, k, n] -> [b, h, m, n]`.
///
/// Batches run on the rayon pool; each head's product is single-threaded.
pub fn batched_matmul(a: &Array4<f32>, b: &Array4<f32>) -> Result<Array4<f32>> {
    let (batch, heads, m, k) = a.dim();
    let (b_batch, b_heads, b_k, n) = b.dim();
    if (batch, heads, k) != (b_batch, b_heads, b_k) {
        return Err(anyhow!(
            "batched matmul shapes {:?} and {:?} are incompatible",
            a.shape(),
            b.shape()
        ));
    }

    let mut out = Array4::<f32>::zeros((batch, heads, m, n));
    Zip::from(out.outer_iter_mut())
        .and(a.outer_iter())
        .and(b.outer_iter())
        .par_for_each(|mut out_b, a_b, b_b| {
            for ((mut out_h, a_h), b_h) in out_b.outer_iter_mut().zip(a_b.outer_iter()).zip(b_b.outer_iter()) {
                let mut buf = vec![0.0f32; m * n];
                with_row_major(&a_h, |lhs| {
                    with_row_major(&b_h, |rhs| gemm_into(&mut buf, lhs, rhs, Parallelism::None))
                });
                out_h.iter_mut().zip(buf).for_each(|(o, v)| *o = v);
            }
        });
    Ok(out)
}
