use std::marker::PhantomData;

use burn_cubecl::{CubeRuntime, FloatElement, tensor::CubeTensor};
use cubecl::prelude::*;
use ligru_core::{LigruConfig, LigruError};
use tracing::debug;

use super::kernel::{accumulate_initial_grad_kernel, ligru_grad_kernel};
use crate::{
    LigruKernelConfig, cell::forward::launch::STEP_TILE,
    layer_norm::launch_layer_norm_backward, stream::CellStreams,
};

/// Queue one pointwise Li-GRU gradient step on the given stream.
pub fn launch_ligru_grad<R: Runtime, F: Float + CubeElement>(
    client: &ComputeClient<R>,
    h: TensorHandleRef<R>,
    v: TensorHandleRef<R>,
    grad_h: TensorHandleRef<R>,
    dh: TensorHandleRef<R>,
    dwx: TensorHandleRef<R>,
    step: usize,
    config: LigruKernelConfig,
) {
    let cube_dim = CubeDim::new_2d(STEP_TILE, STEP_TILE);
    let cube_count = CubeCount::Static(
        (config.hidden as u32).div_ceil(STEP_TILE),
        (config.batch as u32).div_ceil(STEP_TILE),
        1,
    );

    unsafe {
        cube_launch!(ligru_grad_kernel::<F, R>(
            client,
            cube_count,
            cube_dim,
            TensorArg::from_raw_parts::<F>(h.handle, h.strides, h.shape, 1),
            TensorArg::from_raw_parts::<F>(v.handle, v.strides, v.shape, 1),
            TensorArg::from_raw_parts::<F>(grad_h.handle, grad_h.strides, grad_h.shape, 1),
            TensorArg::from_raw_parts::<F>(dh.handle, dh.strides, dh.shape, 1),
            TensorArg::from_raw_parts::<F>(dwx.handle, dwx.strides, dwx.shape, 1),
            ScalarArg::new(step as u32),
            config,
        ));
    }
}

fn launch_accumulate_initial_grad<R: Runtime, F: Float + CubeElement>(
    client: &ComputeClient<R>,
    grad_h: TensorHandleRef<R>,
    dh: TensorHandleRef<R>,
) {
    let num_elements: usize = dh.shape.iter().product();
    let cube_dim = CubeDim::new(client, num_elements);
    let cube_count = (num_elements as u32).div_ceil(cube_dim.num_elems());

    unsafe {
        cube_launch!(accumulate_initial_grad_kernel::<F, R>(
            client,
            CubeCount::Static(cube_count, 1, 1),
            cube_dim,
            TensorArg::from_raw_parts::<F>(grad_h.handle, grad_h.strides, grad_h.shape, 1),
            TensorArg::from_raw_parts::<F>(dh.handle, dh.strides, dh.shape, 1),
        ));
    }
}

/// Sequential backward driver for the fused Li-GRU cell.
///
/// Walks the trajectory in reverse on the step stream: pointwise gradient
/// kernel, optional layer-norm backward, then the `dh` carry GEMM. The final
/// weight-gradient reduction over all timesteps runs on the reduce stream
/// after a barrier on the step stream.
pub struct BackwardPass<R: CubeRuntime, F: FloatElement> {
    config: LigruConfig,
    kernel_config: LigruKernelConfig,
    pub streams: CellStreams<R>,
    _marker: PhantomData<F>,
}

impl<R: CubeRuntime, F: FloatElement> BackwardPass<R, F> {
    pub fn new(
        client: &ComputeClient<R>,
        sync: Option<ComputeClient<R>>,
        config: LigruConfig,
    ) -> Result<Self, LigruError> {
        config.validate()?;
        config.validate_backward_dtype(F::dtype())?;
        debug!(
            seq_len = config.seq_len,
            batch = config.batch,
            hidden = config.hidden,
            variant = ?config.variant,
            activation = ?config.activation,
            "backward pass constructed"
        );
        Ok(Self {
            kernel_config: LigruKernelConfig::from_cell(&config),
            config,
            streams: CellStreams::new(client, sync),
            _marker: PhantomData,
        })
    }

    /// Queue the full reverse sweep.
    ///
    /// - `grad_h` is the upstream gradient for the trajectory `[T + 1, N, H]`
    /// - `dh` must be zero-filled `[N, H]` and receives the gradient for the
    ///   initial state
    /// - `dwx` receives the gradient for the input projections `[T, N, 2H]`
    /// - `du` receives the gradient for the recurrent weights `[H, 2H]`
    /// - `norm` carries, for the normalized variant, the cached pre-norm
    ///   projections and a `[T, N, 2H]` scratch for the mapped gradients
    pub fn run(
        &self,
        u: &CubeTensor<R>,
        h: &CubeTensor<R>,
        v: &CubeTensor<R>,
        grad_h: &CubeTensor<R>,
        dh: &CubeTensor<R>,
        dwx: &CubeTensor<R>,
        du: &CubeTensor<R>,
        norm: Option<(&CubeTensor<R>, &CubeTensor<R>)>,
    ) -> Result<(), cubecl::server::ExecutionError> {
        let LigruConfig {
            seq_len,
            batch,
            hidden,
            ..
        } = self.config;
        let client = &self.streams.step;

        for t in (0..seq_len).rev() {
            launch_ligru_grad::<R, F>(
                client,
                h.as_handle_ref(),
                v.as_handle_ref(),
                grad_h.as_handle_ref(),
                dh.as_handle_ref(),
                dwx.as_handle_ref(),
                t,
                self.kernel_config,
            );

            let step_base = t * batch * 2 * hidden;
            let g = match norm {
                Some((uh_cache, g)) => {
                    launch_layer_norm_backward::<R, F>(
                        client,
                        uh_cache.as_handle_ref(),
                        dwx.as_handle_ref(),
                        g.as_handle_ref(),
                        batch,
                        2 * hidden,
                        step_base,
                        step_base,
                        step_base,
                        self.kernel_config.epsilon(),
                    );
                    g
                }
                None => dwx,
            };

            // Carry the pre-activation gradients back through the recurrent
            // weights: dh += g[t] @ u^T, shapes [N, 2H] @ [2H, H].
            crate::gemm::gemm::<R, F>(
                client,
                g.as_handle_ref(),
                u.as_handle_ref(),
                dh.as_handle_ref(),
                (batch, hidden, 2 * hidden),
                (step_base, 0, 0),
                (1.0, 1.0),
                false,
                true,
            );
        }

        launch_accumulate_initial_grad::<R, F>(client, grad_h.as_handle_ref(), dh.as_handle_ref());

        // The reduce stream reads the pre-activation gradients of every step,
        // so it must wait for the reverse sweep to finish.
        self.streams.barrier()?;

        // du = h[0..T]^T @ g over all steps at once, shapes [H, T*N] @ [T*N, 2H].
        let g = match norm {
            Some((_, g)) => g,
            None => dwx,
        };
        crate::gemm::gemm::<R, F>(
            &self.streams.reduce,
            h.as_handle_ref(),
            g.as_handle_ref(),
            du.as_handle_ref(),
            (hidden, 2 * hidden, seq_len * batch),
            (0, 0, 0),
            (1.0, 0.0),
            true,
            false,
        );

        Ok(())
    }
}
