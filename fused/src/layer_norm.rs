//! Layer-norm sub-step used by the normalized cell variant.
//!
//! Normalizes each row of a `[rows, cols]` view over its feature axis with no
//! affine parameters. The backward kernel recomputes the row statistics from
//! the cached pre-norm input instead of saving them.

use burn_cubecl::CubeRuntime;
use cubecl::prelude::*;

const LN_CUBE_DIM: usize = 64;

#[cube(launch, launch_unchecked)]
fn layer_norm_kernel<F: Float>(
    x: &Tensor<F>,
    y: &mut Tensor<F>,
    rows: u32,
    x_base: u32,
    y_base: u32,
    #[comptime] cols: u32,
    #[comptime] epsilon: f32,
) {
    let row = ABSOLUTE_POS as usize;
    let cols = cols as usize;

    if row < rows as usize {
        let x_row = x_base as usize + row * cols;
        let y_row = y_base as usize + row * cols;

        let mut sum = F::new(0.0);
        for j in 0..cols {
            sum += x[x_row + j];
        }
        let mean = sum / F::cast_from(cols as u32);

        let mut var_sum = F::new(0.0);
        for j in 0..cols {
            let diff = x[x_row + j] - mean;
            var_sum += diff * diff;
        }
        let variance = var_sum / F::cast_from(cols as u32);
        let rstd = F::new(1.0) / F::sqrt(variance + F::new(epsilon));

        for j in 0..cols {
            y[y_row + j] = (x[x_row + j] - mean) * rstd;
        }
    }
}

#[cube(launch, launch_unchecked)]
fn layer_norm_backward_kernel<F: Float>(
    x: &Tensor<F>,
    dy: &Tensor<F>,
    dx: &mut Tensor<F>,
    rows: u32,
    x_base: u32,
    dy_base: u32,
    dx_base: u32,
    #[comptime] cols: u32,
    #[comptime] epsilon: f32,
) {
    let row = ABSOLUTE_POS as usize;
    let cols = cols as usize;

    if row < rows as usize {
        let x_row = x_base as usize + row * cols;
        let dy_row = dy_base as usize + row * cols;
        let dx_row = dx_base as usize + row * cols;
        let count = F::cast_from(cols as u32);

        // Recompute mean / std from the cached pre-norm input.
        let mut sum = F::new(0.0);
        for j in 0..cols {
            sum += x[x_row + j];
        }
        let mean = sum / count;

        let mut var_sum = F::new(0.0);
        for j in 0..cols {
            let diff = x[x_row + j] - mean;
            var_sum += diff * diff;
        }
        let variance = var_sum / count;
        let std = F::sqrt(variance + F::new(epsilon));

        // dx = (dy * C - sum(dy) - x_hat * sum(dy * x_hat)) / (std * C)
        let mut dy_sum = F::new(0.0);
        let mut dy_xhat_sum = F::new(0.0);
        for j in 0..cols {
            let x_hat = (x[x_row + j] - mean) / std;
            dy_sum += dy[dy_row + j];
            dy_xhat_sum += dy[dy_row + j] * x_hat;
        }

        for j in 0..cols {
            let x_hat = (x[x_row + j] - mean) / std;
            dx[dx_row + j] =
                (dy[dy_row + j] * count - dy_sum - x_hat * dy_xhat_sum) / (std * count);
        }
    }
}

/// Queue row-wise layer normalization of a flat `[rows, cols]` view.
pub fn launch_layer_norm<R: CubeRuntime, F: Float + CubeElement>(
    client: &ComputeClient<R>,
    x: TensorHandleRef<R>,
    y: TensorHandleRef<R>,
    rows: usize,
    cols: usize,
    x_base: usize,
    y_base: usize,
    epsilon: f32,
) {
    let cube_dim = CubeDim::new(client, rows.min(LN_CUBE_DIM));
    let cube_count = CubeCount::Static((rows as u32).div_ceil(cube_dim.num_elems()), 1, 1);

    unsafe {
        cube_launch!(layer_norm_kernel::<F, R>(
            client,
            cube_count,
            cube_dim,
            TensorArg::from_raw_parts::<F>(x.handle, x.strides, x.shape, 1),
            TensorArg::from_raw_parts::<F>(y.handle, y.strides, y.shape, 1),
            ScalarArg::new(rows as u32),
            ScalarArg::new(x_base as u32),
            ScalarArg::new(y_base as u32),
            cols as u32,
            epsilon,
        ));
    }
}

/// Queue the layer-norm backward map `dy -> dx` for a flat `[rows, cols]`
/// view, given the cached pre-norm input `x`.
pub fn launch_layer_norm_backward<R: CubeRuntime, F: Float + CubeElement>(
    client: &ComputeClient<R>,
    x: TensorHandleRef<R>,
    dy: TensorHandleRef<R>,
    dx: TensorHandleRef<R>,
    rows: usize,
    cols: usize,
    x_base: usize,
    dy_base: usize,
    dx_base: usize,
    epsilon: f32,
) {
    let cube_dim = CubeDim::new(client, rows.min(LN_CUBE_DIM));
    let cube_count = CubeCount::Static((rows as u32).div_ceil(cube_dim.num_elems()), 1, 1);

    unsafe {
        cube_launch!(layer_norm_backward_kernel::<F, R>(
            client,
            cube_count,
            cube_dim,
            TensorArg::from_raw_parts::<F>(x.handle, x.strides, x.shape, 1),
            TensorArg::from_raw_parts::<F>(dy.handle, dy.strides, dy.shape, 1),
            TensorArg::from_raw_parts::<F>(dx.handle, dx.strides, dx.shape, 1),
            ScalarArg::new(rows as u32),
            ScalarArg::new(x_base as u32),
            ScalarArg::new(dy_base as u32),
            ScalarArg::new(dx_base as u32),
            cols as u32,
            epsilon,
        ));
    }
}
