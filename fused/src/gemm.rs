//! Dense algebra adapter: a small strided GEMM used for the recurrent
//! matmul and the gradient reductions.
//!
//! Operands are flat views into larger buffers, addressed by an element base
//! offset, so per-timestep slices of `[T, N, D]` tensors can be multiplied
//! without materializing copies. Computes `C = alpha * op(A) @ op(B) + beta * C`
//! with row-major operands.

use burn_cubecl::CubeRuntime;
use cubecl::prelude::*;

const GEMM_TILE: u32 = 16;

#[cube(launch, launch_unchecked)]
fn gemm_kernel<F: Float>(
    a: &Tensor<F>,
    b: &Tensor<F>,
    c: &mut Tensor<F>,
    m: u32,
    n: u32,
    k: u32,
    a_base: u32,
    b_base: u32,
    c_base: u32,
    alpha: f32,
    beta: f32,
    #[comptime] trans_a: bool,
    #[comptime] trans_b: bool,
) {
    let row = ABSOLUTE_POS_Y as usize;
    let col = ABSOLUTE_POS_X as usize;
    let m = m as usize;
    let n = n as usize;
    let k = k as usize;

    if row < m && col < n {
        let a_base = a_base as usize;
        let b_base = b_base as usize;
        let c_base = c_base as usize;

        let mut acc = F::new(0.0);
        for kk in 0..k {
            // op(A)[row, kk]: A is [m, k] row-major, or [k, m] when transposed.
            let a_idx = if comptime!(trans_a) {
                kk * m + row
            } else {
                row * k + kk
            };
            // op(B)[kk, col]: B is [k, n] row-major, or [n, k] when transposed.
            let b_idx = if comptime!(trans_b) {
                col * k + kk
            } else {
                kk * n + col
            };
            acc += a[a_base + a_idx] * b[b_base + b_idx];
        }

        let c_idx = c_base + row * n + col;
        let mut out = acc * F::cast_from(alpha);
        if beta != 0.0 {
            out += F::cast_from(beta) * c[c_idx];
        }
        c[c_idx] = out;
    }
}

/// Queue `C = alpha * op(A) @ op(B) + beta * C` on the given stream.
///
/// Bases are element offsets into the flat storage of each tensor; shapes
/// `m`, `n`, `k` describe the logical operands after transposition.
pub fn gemm<R: CubeRuntime, F: Float + CubeElement>(
    client: &ComputeClient<R>,
    a: TensorHandleRef<R>,
    b: TensorHandleRef<R>,
    c: TensorHandleRef<R>,
    (m, n, k): (usize, usize, usize),
    (a_base, b_base, c_base): (usize, usize, usize),
    (alpha, beta): (f32, f32),
    trans_a: bool,
    trans_b: bool,
) {
    let cube_dim = CubeDim::new_2d(GEMM_TILE, GEMM_TILE);
    let cube_count = CubeCount::Static(
        (n as u32).div_ceil(GEMM_TILE),
        (m as u32).div_ceil(GEMM_TILE),
        1,
    );

    unsafe {
        cube_launch!(gemm_kernel::<F, R>(
            client,
            cube_count,
            cube_dim,
            TensorArg::from_raw_parts::<F>(a.handle, a.strides, a.shape, 1),
            TensorArg::from_raw_parts::<F>(b.handle, b.strides, b.shape, 1),
            TensorArg::from_raw_parts::<F>(c.handle, c.strides, c.shape, 1),
            ScalarArg::new(m as u32),
            ScalarArg::new(n as u32),
            ScalarArg::new(k as u32),
            ScalarArg::new(a_base as u32),
            ScalarArg::new(b_base as u32),
            ScalarArg::new(c_base as u32),
            ScalarArg::new(alpha),
            ScalarArg::new(beta),
            trans_a,
            trans_b,
        ));
    }
}
