use std::marker::PhantomData;

use burn_cubecl::{CubeRuntime, FloatElement, tensor::CubeTensor};
use cubecl::prelude::*;
use ligru_core::{LigruConfig, LigruError};
use tracing::debug;

use super::kernel::{ligru_step_kernel, write_initial_state_kernel};
use crate::{LigruKernelConfig, layer_norm::launch_layer_norm, stream::CellStreams};

pub(crate) const STEP_TILE: u32 = 16;

/// Queue one pointwise Li-GRU step on the given stream.
pub fn launch_ligru_step<R: Runtime, F: Float + CubeElement>(
    client: &ComputeClient<R>,
    wx: TensorHandleRef<R>,
    uh: TensorHandleRef<R>,
    h: TensorHandleRef<R>,
    v: TensorHandleRef<R>,
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
        cube_launch!(ligru_step_kernel::<F, R>(
            client,
            cube_count,
            cube_dim,
            TensorArg::from_raw_parts::<F>(wx.handle, wx.strides, wx.shape, 1),
            TensorArg::from_raw_parts::<F>(uh.handle, uh.strides, uh.shape, 1),
            TensorArg::from_raw_parts::<F>(h.handle, h.strides, h.shape, 1),
            TensorArg::from_raw_parts::<F>(v.handle, v.strides, v.shape, 1),
            ScalarArg::new(step as u32),
            config,
        ));
    }
}

fn launch_write_initial_state<R: Runtime, F: Float + CubeElement>(
    client: &ComputeClient<R>,
    h_init: TensorHandleRef<R>,
    h: TensorHandleRef<R>,
) {
    let num_elements: usize = h_init.shape.iter().product();
    let cube_dim = CubeDim::new(client, num_elements);
    let cube_count = (num_elements as u32).div_ceil(cube_dim.num_elems());

    unsafe {
        cube_launch!(write_initial_state_kernel::<F, R>(
            client,
            CubeCount::Static(cube_count, 1, 1),
            cube_dim,
            TensorArg::from_raw_parts::<F>(h_init.handle, h_init.strides, h_init.shape, 1),
            TensorArg::from_raw_parts::<F>(h.handle, h.strides, h.shape, 1),
        ));
    }
}

/// Sequential forward driver for the fused Li-GRU cell.
///
/// Owns the stream pair and steps the recurrence one timestep at a time:
/// recurrent GEMM, optional layer-norm sub-step, then the fused pointwise
/// kernel, all in order on the step stream.
pub struct ForwardPass<R: CubeRuntime, F: FloatElement> {
    config: LigruConfig,
    kernel_config: LigruKernelConfig,
    pub streams: CellStreams<R>,
    _marker: PhantomData<F>,
}

impl<R: CubeRuntime, F: FloatElement> ForwardPass<R, F> {
    pub fn new(
        client: &ComputeClient<R>,
        sync: Option<ComputeClient<R>>,
        config: LigruConfig,
    ) -> Result<Self, LigruError> {
        config.validate()?;
        debug!(
            seq_len = config.seq_len,
            batch = config.batch,
            hidden = config.hidden,
            variant = ?config.variant,
            activation = ?config.activation,
            training = config.training,
            "forward pass constructed"
        );
        Ok(Self {
            kernel_config: LigruKernelConfig::from_cell(&config),
            config,
            streams: CellStreams::new(client, sync),
            _marker: PhantomData,
        })
    }

    /// Queue the full trajectory.
    ///
    /// - `h` is the output trajectory `[T + 1, N, H]`
    /// - `v` is the save buffer `[T, N, 3H]` in training mode, or a 1-element
    ///   placeholder in inference mode
    /// - `uh` is a `[N, 2H]` scratch for the recurrent projection of the
    ///   current step
    /// - `uh_cache` must be `[T, N, 2H]` for the normalized variant and
    ///   caches the pre-norm projections for backward
    pub fn run(
        &self,
        wx: &CubeTensor<R>,
        u: &CubeTensor<R>,
        h_init: &CubeTensor<R>,
        h: &CubeTensor<R>,
        v: &CubeTensor<R>,
        uh: &CubeTensor<R>,
        uh_cache: Option<&CubeTensor<R>>,
    ) {
        let LigruConfig {
            seq_len,
            batch,
            hidden,
            ..
        } = self.config;
        let client = &self.streams.step;

        launch_write_initial_state::<R, F>(client, h_init.as_handle_ref(), h.as_handle_ref());

        for t in 0..seq_len {
            // uh = h[t] @ u, shapes [N, H] @ [H, 2H].
            let (gemm_out, gemm_base) = match uh_cache {
                Some(cache) => (cache, t * batch * 2 * hidden),
                None => (uh, 0),
            };
            crate::gemm::gemm::<R, F>(
                client,
                h.as_handle_ref(),
                u.as_handle_ref(),
                gemm_out.as_handle_ref(),
                (batch, 2 * hidden, hidden),
                (t * batch * hidden, 0, gemm_base),
                (1.0, 0.0),
                false,
                false,
            );

            if let Some(cache) = uh_cache {
                launch_layer_norm::<R, F>(
                    client,
                    cache.as_handle_ref(),
                    uh.as_handle_ref(),
                    batch,
                    2 * hidden,
                    t * batch * 2 * hidden,
                    0,
                    self.kernel_config.epsilon(),
                );
            }

            launch_ligru_step::<R, F>(
                client,
                wx.as_handle_ref(),
                uh.as_handle_ref(),
                h.as_handle_ref(),
                v.as_handle_ref(),
                t,
                self.kernel_config,
            );
        }
    }
}
